use crate::actor::{MatchActor, MatchHandle, Outbound};
use crate::config::ServiceConfig;
use crate::model::{Action, MatchId, PlayerId};
use crate::turn::Match;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

type Handles = Arc<Mutex<HashMap<MatchId, MatchHandle>>>;

/// Live matches by id. A match leaves the registry when its actor stops.
#[derive(Clone, Default)]
pub struct Registry {
    matches: Handles,
    config: ServiceConfig,
}

impl Registry {
    pub fn new(config: ServiceConfig) -> Self { Self { matches: Handles::default(), config } }

    pub fn spawn_match(&self, game: Match) -> mpsc::UnboundedReceiver<Outbound> {
        let (actor, handle, events) = MatchActor::new(game, self.config.clone());
        let id = handle.id();
        if lock(&self.matches).insert(id, handle).is_some() {
            warn!(match_id = id, "replaced a running match");
        }
        let matches = self.matches.clone();
        tokio::spawn(async move {
            actor.run().await;
            let mut live = lock(&matches);
            if live.get(&id).is_some_and(MatchHandle::is_closed) {
                live.remove(&id);
            }
            debug!(match_id = id, live = live.len(), "match released");
        });
        events
    }

    /// Routes a player command to its match. Unknown matches are ignored.
    pub async fn submit_action(&self, match_id: MatchId, player: impl Into<PlayerId>, action: Action) {
        let handle = lock(&self.matches).get(&match_id).cloned();
        let Some(handle) = handle else {
            warn!(match_id, "action for unknown match dropped");
            return;
        };
        if let Err(error) = handle.submit(player, action).await {
            debug!(match_id, %error, "pruning stopped match");
            self.release(match_id);
        }
    }

    pub fn handle(&self, match_id: MatchId) -> Option<MatchHandle> { lock(&self.matches).get(&match_id).cloned() }

    pub fn contains(&self, match_id: MatchId) -> bool { lock(&self.matches).contains_key(&match_id) }

    pub fn len(&self) -> usize { lock(&self.matches).len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn release(&self, match_id: MatchId) {
        lock(&self.matches).remove(&match_id);
    }
}

fn lock(matches: &Handles) -> std::sync::MutexGuard<'_, HashMap<MatchId, MatchHandle>> {
    matches.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchConfig;
    use crate::model::Player;
    use crate::rng::ScriptedDice;
    use std::time::Duration;

    fn quick() -> ServiceConfig {
        ServiceConfig { min_action_interval: Duration::ZERO, ..ServiceConfig::default() }
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_match_is_a_no_op() {
        let registry = Registry::new(quick());
        registry.submit_action(404, "a", Action::Ready).await;
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_match_is_released() {
        let registry = Registry::new(quick());
        let players = vec![Player::human("a", "A"), Player::human("b", "B")];
        let config = MatchConfig { points_goal: 1000, ..MatchConfig::default() };
        let dice = ScriptedDice::new([vec![6, 1], vec![1; 6]]);
        let mut rx = registry.spawn_match(Match::new(5, config, players, Box::new(dice)));
        assert!(registry.contains(5));

        registry.submit_action(5, "a", Action::Ready).await;
        registry.submit_action(5, "b", Action::Ready).await;
        registry.submit_action(5, "a", Action::Finish(vec![1; 6])).await;
        loop {
            if let Some(Outbound::Finished(history)) = rx.recv().await {
                assert_eq!(history.id, 5);
                break;
            }
        }
        let handle = registry.handle(5);
        if let Some(handle) = handle {
            handle.closed().await;
        }
        while registry.contains(5) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        registry.submit_action(5, "b", Action::Concede).await;
        assert!(registry.is_empty());
    }
}
