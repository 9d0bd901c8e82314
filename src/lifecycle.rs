//! Match setup and teardown: roll-off for seating, standings, history.

use crate::config::MatchConfig;
use crate::model::{MatchHistory, MatchId, Player, PlayerId, PlayerRecord, Standing};
use crate::rng::DiceSource;
use tracing::debug;

/// Seats players by repeated high-roll-offs.
///
/// Everyone still unseated throws one die. A throw where every die shows the
/// same face is repeated; if several players share the high face they roll
/// off among themselves. The single high roller takes the next seat and the
/// last player left takes the final one. Returns the seating and every throw
/// made, in order.
pub fn decide_turn_order(
    ids: &[PlayerId],
    dice: &mut dyn DiceSource,
) -> (Vec<PlayerId>, Vec<Vec<(PlayerId, u8)>>) {
    let mut undecided = ids.to_vec();
    let mut order = Vec::with_capacity(ids.len());
    let mut throws = Vec::new();
    while undecided.len() > 1 {
        let mut contenders = undecided.clone();
        let seated = loop {
            let faces = dice.roll(contenders.len());
            if faces.len() != contenders.len() {
                continue;
            }
            throws.push(contenders.iter().cloned().zip(faces.iter().copied()).collect());
            if faces.iter().all(|&f| f == faces[0]) {
                continue;
            }
            let high = faces.iter().copied().max().unwrap_or(0);
            let leaders: Vec<PlayerId> = contenders
                .iter()
                .zip(&faces)
                .filter(|(_, &f)| f == high)
                .map(|(id, _)| id.clone())
                .collect();
            if let [only] = leaders.as_slice() {
                break only.clone();
            }
            contenders = leaders;
        };
        debug!(player = %seated, seat = order.len() + 1, "seat decided");
        undecided.retain(|id| id != &seated);
        order.push(seated);
    }
    order.extend(undecided);
    (order, throws)
}

/// Banks high to low; equal banks keep turn order.
pub fn standings(players: &[Player]) -> Vec<Standing> {
    let mut rows: Vec<Standing> = players
        .iter()
        .map(|p| Standing { player: p.id.clone(), display: p.display.clone(), score: p.score, turn_order: p.turn_order })
        .collect();
    rows.sort_by(|a, b| b.score.cmp(&a.score).then(a.turn_order.cmp(&b.turn_order)));
    rows
}

pub fn history(
    id: MatchId,
    config: &MatchConfig,
    players: &[Player],
    conceded: &[PlayerRecord],
    winner: &PlayerId,
) -> MatchHistory {
    let mut records: Vec<PlayerRecord> =
        players.iter().map(|p| PlayerRecord::from_player(p, false, &p.id == winner)).collect();
    records.extend(conceded.iter().cloned());
    let rolls_thrown = records.iter().map(|r| r.stats.rolls).sum();
    MatchHistory { id, config: config.clone(), winner: winner.clone(), players: records, rolls_thrown }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::ScriptedDice;

    fn ids(names: &[&str]) -> Vec<PlayerId> { names.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn high_roller_goes_first() {
        let mut dice = ScriptedDice::new([vec![2, 6, 4], vec![3, 5]]);
        let (order, throws) = decide_turn_order(&ids(&["a", "b", "c"]), &mut dice);
        assert_eq!(order, ids(&["b", "c", "a"]));
        assert_eq!(throws.len(), 2);
    }

    #[test]
    fn identical_field_rerolls() {
        let mut dice = ScriptedDice::new([vec![4, 4], vec![1, 3]]);
        let (order, throws) = decide_turn_order(&ids(&["a", "b"]), &mut dice);
        assert_eq!(order, ids(&["b", "a"]));
        assert_eq!(throws.len(), 2);
    }

    #[test]
    fn tied_leaders_roll_off_alone() {
        // a and c tie on 6; only they re-throw.
        let mut dice = ScriptedDice::new([vec![6, 2, 6], vec![1, 5], vec![4, 3]]);
        let (order, throws) = decide_turn_order(&ids(&["a", "b", "c"]), &mut dice);
        assert_eq!(order, ids(&["c", "a", "b"]));
        assert_eq!(throws[1], vec![("a".to_string(), 1), ("c".to_string(), 5)]);
    }

    #[test]
    fn standings_sort_by_bank_then_seat() {
        let mut a = Player::human("a", "A");
        let mut b = Player::human("b", "B");
        let mut c = Player::human("c", "C");
        (a.turn_order, b.turn_order, c.turn_order) = (1, 2, 3);
        (a.score, b.score, c.score) = (300, 900, 300);
        let rows = standings(&[a, b, c]);
        let order: Vec<&str> = rows.iter().map(|s| s.player.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }
}
