//! One task per match. Every command (human, planner, timer) goes through the
//! match mailbox, so transitions on a match never interleave.

use crate::config::ServiceConfig;
use crate::error::{ActorError, MoveError};
use crate::model::{Action, Event, MatchHistory, MatchId, Phase, PlayerId};
use crate::rng::SeededDice;
use crate::turn::Match;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Who produced a command. Only human input is rate limited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Human,
    Planner,
    Timer,
}

#[derive(Debug)]
pub enum Message {
    Command { player: PlayerId, action: Action, origin: Origin },
    HurryElapsed { generation: u64 },
    BotTurn { generation: u64 },
}

/// What the presentation layer hears from a match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Events(Vec<Event>),
    /// Addressed to `player` only.
    Rejected { player: PlayerId, error: MoveError },
    Finished(MatchHistory),
}

#[derive(Clone, Debug)]
pub struct MatchHandle {
    id: MatchId,
    sender: mpsc::Sender<Message>,
}

impl MatchHandle {
    pub fn id(&self) -> MatchId { self.id }

    pub async fn submit(&self, player: impl Into<PlayerId>, action: Action) -> Result<(), ActorError> {
        let message = Message::Command { player: player.into(), action, origin: Origin::Human };
        self.sender.send(message).await.map_err(|_| ActorError::Closed(self.id))
    }

    pub fn is_closed(&self) -> bool { self.sender.is_closed() }

    /// Resolves once the actor has stopped.
    pub async fn closed(&self) { self.sender.closed().await }
}

/// A pending forced skip: `by` asked, `target` was rolling at the time.
struct Armed {
    by: PlayerId,
    target: PlayerId,
    task: JoinHandle<()>,
}

pub struct MatchActor {
    game: Match,
    config: ServiceConfig,
    inbox: mpsc::Receiver<Message>,
    mailbox: mpsc::WeakSender<Message>,
    outbound: mpsc::UnboundedSender<Outbound>,
    limiter: Option<DefaultKeyedRateLimiter<PlayerId>>,
    hurry: Option<Armed>,
    hurry_generation: u64,
    bot_generation: u64,
}

impl MatchActor {
    pub fn new(game: Match, config: ServiceConfig) -> (Self, MatchHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (sender, inbox) = mpsc::channel(config.mailbox.max(1));
        let (outbound, events) = mpsc::unbounded_channel();
        let limiter = Quota::with_period(config.min_action_interval).map(RateLimiter::keyed);
        let handle = MatchHandle { id: game.id(), sender: sender.clone() };
        let actor = Self {
            game,
            config,
            inbox,
            mailbox: sender.downgrade(),
            outbound,
            limiter,
            hurry: None,
            hurry_generation: 0,
            bot_generation: 0,
        };
        (actor, handle, events)
    }

    pub async fn run(mut self) {
        let id = self.game.id();
        info!(match_id = id, "match actor started");
        self.boot();
        while !self.game.is_over() {
            let Some(message) = self.inbox.recv().await else {
                debug!(match_id = id, "mailbox closed");
                break;
            };
            match message {
                Message::Command { player, action, origin } => self.command(player, action, origin),
                Message::HurryElapsed { generation } => self.hurry_elapsed(generation),
                Message::BotTurn { generation } => self.bot_turn(generation),
            }
        }
        self.cancel_hurry();
        info!(match_id = id, over = self.game.is_over(), "match actor stopped");
    }

    /// Bots sit down ready, but the roll-off only starts on a ready action.
    /// One bot re-announcing is enough to run the start check.
    fn boot(&mut self) {
        if self.game.phase() == &Phase::Forming {
            let bot = self.game.state().players.iter().find(|p| p.is_bot).map(|p| p.id.clone());
            if let Some(bot) = bot {
                self.command(bot, Action::Ready, Origin::Planner);
            }
        }
        self.schedule_bot();
    }

    fn admit(&self, player: &PlayerId) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check_key(player).is_ok(),
            None => true,
        }
    }

    fn command(&mut self, player: PlayerId, action: Action, origin: Origin) {
        if origin == Origin::Human && !self.admit(&player) {
            debug!(match_id = self.game.id(), player = %player, ?action, "rate limited; dropped");
            return;
        }
        if action == Action::Hurry && origin == Origin::Human {
            return self.request_hurry(player);
        }
        let before = self.game.current_player().cloned();
        match self.game.apply(&player, action) {
            Ok(events) => self.accepted(&player, before, events),
            Err(error) if error.is_silent() => {
                debug!(match_id = self.game.id(), player = %player, %error, "ignored")
            }
            Err(error @ MoveError::Invariant(_)) => {
                warn!(match_id = self.game.id(), player = %player, %error, "transition aborted");
                self.reject(player, error);
            }
            Err(error) => {
                debug!(match_id = self.game.id(), player = %player, %error, "rejected");
                self.reject(player, error);
            }
        }
    }

    fn accepted(&mut self, player: &PlayerId, before: Option<PlayerId>, events: Vec<Event>) {
        let target_moved = match &self.hurry {
            Some(armed) => self.game.current_player() != Some(&armed.target) || before.as_ref() == Some(player),
            None => false,
        };
        if target_moved {
            self.cancel_hurry();
        }
        if !events.is_empty() {
            self.publish(Outbound::Events(events));
        }
        match self.game.history() {
            Some(history) => self.publish(Outbound::Finished(history)),
            None => self.schedule_bot(),
        }
    }

    fn reject(&self, player: PlayerId, error: MoveError) {
        self.publish(Outbound::Rejected { player, error });
    }

    fn publish(&self, message: Outbound) {
        if self.outbound.send(message).is_err() {
            debug!(match_id = self.game.id(), "no listener for match output");
        }
    }

    /// Queues `message` on our own mailbox after `delay`.
    fn defer(&self, delay: Duration, message: Message) -> JoinHandle<()> {
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(sender) = mailbox.upgrade() {
                let _ = sender.send(message).await;
            }
        })
    }

    fn request_hurry(&mut self, by: PlayerId) {
        let state = self.game.state();
        let target = match state.current() {
            _ if state.seat(&by).is_none() => return,
            None => Err(MoveError::WrongPhase),
            Some(current) if current == &by => Err(MoveError::OwnTurn),
            Some(current) => Ok(current.clone()),
        };
        let target = match target {
            Ok(target) => target,
            Err(error) => return self.reject(by, error),
        };
        if self.hurry.is_some() {
            debug!(match_id = self.game.id(), by = %by, "hurry already armed");
            return;
        }
        self.hurry_generation += 1;
        let generation = self.hurry_generation;
        let task = self.defer(self.config.hurry_after, Message::HurryElapsed { generation });
        debug!(match_id = self.game.id(), by = %by, target = %target, generation, "hurry armed");
        self.hurry = Some(Armed { by, target, task });
    }

    fn cancel_hurry(&mut self) {
        if let Some(armed) = self.hurry.take() {
            armed.task.abort();
            self.hurry_generation += 1;
            debug!(match_id = self.game.id(), target = %armed.target, "hurry cancelled");
        }
    }

    fn hurry_elapsed(&mut self, generation: u64) {
        if generation != self.hurry_generation {
            debug!(match_id = self.game.id(), generation, "stale hurry");
            return;
        }
        if let Some(armed) = self.hurry.take() {
            self.command(armed.by, Action::Hurry, Origin::Timer);
        }
    }

    /// Queues the planner if a bot is up. Any earlier queued turn goes stale.
    fn schedule_bot(&mut self) {
        self.bot_generation += 1;
        let bot_up = self
            .game
            .current_player()
            .and_then(|id| self.game.state().player(id))
            .is_some_and(|p| p.is_bot);
        if bot_up {
            let generation = self.bot_generation;
            self.defer(self.config.bot_delay, Message::BotTurn { generation });
        }
    }

    fn bot_turn(&mut self, generation: u64) {
        if generation != self.bot_generation {
            return;
        }
        let mut preview = SeededDice::new(self.game.id().rotate_left(32) ^ generation);
        if let Some((player, action)) = self.game.bot_action(&mut preview) {
            self.command(player, action, Origin::Planner);
        }
    }
}

/// Starts an actor on the current runtime.
pub fn spawn(game: Match, config: ServiceConfig) -> (MatchHandle, mpsc::UnboundedReceiver<Outbound>) {
    let (actor, handle, events) = MatchActor::new(game, config);
    tokio::spawn(actor.run());
    (handle, events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchConfig;
    use crate::model::{Player, TurnKind};
    use crate::rng::ScriptedDice;
    use tokio::time::Instant;

    fn quick() -> ServiceConfig {
        ServiceConfig { min_action_interval: Duration::ZERO, ..ServiceConfig::default() }
    }

    fn game(players: Vec<Player>, goal: u32, script: Vec<Vec<u8>>) -> Match {
        let config = MatchConfig { points_goal: goal, ..MatchConfig::default() };
        Match::new(9, config, players, Box::new(ScriptedDice::new(script)))
    }

    fn humans() -> Vec<Player> { vec![Player::human("a", "A"), Player::human("b", "B")] }

    async fn next_events(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Event> {
        match rx.recv().await {
            Some(Outbound::Events(events)) => events,
            other => panic!("expected events, got {other:?}"),
        }
    }

    fn skipped(events: &[Event]) -> bool {
        events.iter().any(|e| matches!(e, Event::TurnResolved { kind: TurnKind::Skip, .. }))
    }

    #[tokio::test(start_paused = true)]
    async fn plays_to_the_end_and_stops() {
        let (handle, mut rx) = spawn(game(humans(), 1000, vec![vec![6, 1], vec![1; 6]]), quick());
        handle.submit("a", Action::Ready).await.unwrap();
        handle.submit("b", Action::Ready).await.unwrap();
        handle.submit("a", Action::Finish(vec![1; 6])).await.unwrap();

        let started = next_events(&mut rx).await;
        assert!(matches!(started[0], Event::TurnOrderDecided { .. }));
        let ended = next_events(&mut rx).await;
        assert!(matches!(ended.last(), Some(Event::MatchEnded { winner, .. }) if winner == "a"));
        match rx.recv().await {
            Some(Outbound::Finished(history)) => assert_eq!(history.winner, "a"),
            other => panic!("expected history, got {other:?}"),
        }
        handle.closed().await;
        assert_eq!(handle.submit("b", Action::Concede).await, Err(ActorError::Closed(9)));
    }

    #[tokio::test(start_paused = true)]
    async fn rejections_go_to_the_mover() {
        let (handle, mut rx) = spawn(game(humans(), 1000, vec![vec![6, 1], vec![1, 2, 3, 4, 6, 6]]), quick());
        handle.submit("a", Action::Ready).await.unwrap();
        handle.submit("b", Action::Ready).await.unwrap();
        handle.submit("b", Action::Keep(vec![1])).await.unwrap();
        handle.submit("ghost", Action::Keep(vec![1])).await.unwrap();
        handle.submit("a", Action::Hurry).await.unwrap();
        next_events(&mut rx).await;
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Rejected { player: "b".into(), error: MoveError::NotYourTurn { current: "a".into() } })
        );
        assert_eq!(rx.recv().await, Some(Outbound::Rejected { player: "a".into(), error: MoveError::OwnTurn }));
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_human_input_is_dropped() {
        let config = ServiceConfig { min_action_interval: Duration::from_millis(500), ..ServiceConfig::default() };
        let (handle, mut rx) = spawn(game(humans(), 1000, vec![]), config);
        handle.submit("a", Action::Keep(vec![1])).await.unwrap();
        handle.submit("a", Action::Keep(vec![1])).await.unwrap();
        handle.submit("b", Action::Keep(vec![1])).await.unwrap();
        assert_eq!(rx.recv().await, Some(Outbound::Rejected { player: "a".into(), error: MoveError::WrongPhase }));
        assert_eq!(rx.recv().await, Some(Outbound::Rejected { player: "b".into(), error: MoveError::WrongPhase }));
    }

    #[tokio::test(start_paused = true)]
    async fn hurry_fires_after_the_delay() {
        let script = vec![vec![6, 1], vec![1, 2, 3, 4, 6, 6], vec![1, 2, 3, 4, 6, 6]];
        let (handle, mut rx) = spawn(game(humans(), 1000, script), quick());
        handle.submit("a", Action::Ready).await.unwrap();
        handle.submit("b", Action::Ready).await.unwrap();
        next_events(&mut rx).await;

        let armed_at = Instant::now();
        handle.submit("b", Action::Hurry).await.unwrap();
        handle.submit("b", Action::Hurry).await.unwrap();
        let events = next_events(&mut rx).await;
        assert!(skipped(&events));
        assert!(events.contains(&Event::TurnAdvanced { player: "b".into() }));
        assert!(armed_at.elapsed() >= Duration::from_secs(90));
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn acting_player_cancels_hurry() {
        let script = vec![vec![6, 1], vec![1, 2, 3, 4, 6, 6], vec![1, 3, 4, 6, 6], vec![1, 2, 3, 4, 6, 6]];
        let (handle, mut rx) = spawn(game(humans(), 1000, script), quick());
        handle.submit("a", Action::Ready).await.unwrap();
        handle.submit("b", Action::Ready).await.unwrap();
        next_events(&mut rx).await;

        handle.submit("b", Action::Hurry).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        handle.submit("a", Action::Keep(vec![1])).await.unwrap();
        assert!(!skipped(&next_events(&mut rx).await));
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());

        handle.submit("a", Action::Finish(vec![1])).await.unwrap();
        let events = next_events(&mut rx).await;
        assert!(events.iter().any(|e| matches!(e, Event::TurnResolved { kind: TurnKind::Finish, points: 200, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn bot_moves_after_its_delay() {
        let players = vec![Player::human("a", "A"), Player::bot("b", "Bot")];
        let (handle, mut rx) = spawn(game(players, 1000, vec![vec![1, 6], vec![1, 1, 1, 2, 3, 4]]), quick());
        handle.submit("a", Action::Ready).await.unwrap();
        let started = next_events(&mut rx).await;
        assert!(started.contains(&Event::TurnAdvanced { player: "b".into() }));

        let at = Instant::now();
        let ended = next_events(&mut rx).await;
        assert!(at.elapsed() >= Duration::from_secs(1));
        assert!(matches!(ended.last(), Some(Event::MatchEnded { winner, .. }) if winner == "b"));
        assert!(matches!(rx.recv().await, Some(Outbound::Finished(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn bot_table_starts_without_rejections() {
        let players = vec![Player::bot("x", "X"), Player::bot("y", "Y"), Player::bot("z", "Z")];
        let (handle, mut rx) = spawn(Match::seeded(4, MatchConfig::default(), players, 5), quick());
        assert_eq!(handle.id(), 4);
        let started = next_events(&mut rx).await;
        assert!(matches!(started[0], Event::TurnOrderDecided { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn bots_play_each_other_out() {
        let players = vec![Player::bot("x", "X"), Player::bot("y", "Y")];
        let config = MatchConfig { points_goal: 2000, ..MatchConfig::default() };
        let (_handle, mut rx) = spawn(Match::seeded(3, config, players, 77), quick());
        loop {
            match rx.recv().await {
                Some(Outbound::Finished(history)) => {
                    assert!(history.players.iter().any(|p| p.won && p.score >= 2000));
                    break;
                }
                Some(Outbound::Rejected { player, error }) => panic!("{player} rejected: {error}"),
                Some(Outbound::Events(_)) => {}
                None => panic!("actor stopped without a result"),
            }
        }
    }
}
