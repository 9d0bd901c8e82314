//! Heuristic bot: which dice to keep and whether to bank.
//!
//! Planning is two-phase. [`evaluate`] reads the roll and context and returns
//! a [`Plan`] without side effects; [`decide`] commits it, throwing a preview
//! roll on a copy of the table only when the plan leaves the bank-or-roll call
//! open.

use crate::model::Action;
use crate::rng::DiceSource;
use crate::rules::{best_selection, is_farkle, scoring_subsets, select, single, Selection, DICE, THREE_TWOS};
use std::fmt;

pub const FINISH_LEAD: u32 = 500;
pub const SIX_DICE_MIN_BEST: u32 = 300;
pub const CLOSE_MARGIN: u32 = 500;
pub const GRANULAR_MIN_GAP: u32 = 100;
pub const BIG_ROUND: u32 = 2000;
pub const FIVE_DICE_BANK: u32 = 350;
pub const SMALL_ROUND: u32 = 250;
pub const LAST_TURN_SINGLES_BELOW: u32 = 500;
pub const HIGH_STAKES_MIN_POINTS: u32 = 300;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlanContext {
    pub goal: u32,
    pub banked: u32,
    /// Round points so far, piggyback included.
    pub round_points: u32,
    pub best_opponent: u32,
    /// Bank to beat when the bot is playing its final turn.
    pub to_beat: Option<u32>,
    pub opening_threshold: u32,
    pub welfare: bool,
    /// Reaching the goal opens a final round instead of winning outright.
    pub final_round: bool,
    /// First throw of a fresh six this turn.
    pub fresh_throw: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub keep: Vec<u8>,
    pub finish: bool,
}

impl Decision {
    pub fn into_action(self) -> Action {
        if self.finish { Action::Finish(self.keep) } else { Action::Keep(self.keep) }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.finish { "finish" } else { "keep" })?;
        for d in &self.keep {
            write!(f, " {d}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    Finish,
    Continue,
    Undecided,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plan {
    pub directive: Directive,
    pub selection: Selection,
}

impl Plan {
    fn new(directive: Directive, selection: Selection) -> Self { Self { directive, selection } }
}

pub fn decide(rolls: &[u8], ctx: &PlanContext, dice: &mut dyn DiceSource) -> Decision {
    let plan = evaluate(rolls, ctx);
    let mut selection = plan.selection;
    let mut finish = match plan.directive {
        Directive::Finish => true,
        Directive::Continue => false,
        Directive::Undecided => {
            let kept = selection.kept.len();
            let left = dice_after(rolls.len(), kept);
            let bank = if left > 3 {
                false
            } else if kept < 2 {
                is_farkle(&dice.roll(left))
            } else {
                true
            };
            if bank {
                selection = ending(rolls, best_selection(rolls), 0);
            }
            bank
        }
    };
    if finish && ctx.banked == 0 && ctx.round_points + selection.points < ctx.opening_threshold {
        let best = best_selection(rolls);
        if ctx.round_points + best.points >= ctx.opening_threshold {
            selection = best;
        } else {
            finish = false;
        }
    }
    let mut keep = selection.kept;
    keep.sort_unstable();
    Decision { keep, finish }
}

/// High-stakes call: take over the previous player's dice or start fresh.
pub fn choose_continue(dice_on_table: usize, pending_points: u32) -> bool {
    dice_on_table == 0 || dice_on_table == DICE || (dice_on_table >= 3 && pending_points >= HIGH_STAKES_MIN_POINTS)
}

#[inline]
fn dice_after(thrown: usize, kept: usize) -> usize {
    match thrown.saturating_sub(kept) { 0 => DICE, n => n }
}

pub fn evaluate(rolls: &[u8], ctx: &PlanContext) -> Plan {
    let best = best_selection(rolls);
    if best.is_empty() {
        return Plan::new(Directive::Continue, best);
    }
    if let Some(target) = ctx.to_beat {
        return last_turn(rolls, ctx, target, best);
    }

    let dice = rolls.len();
    let hot = best.left.is_empty();
    let standing = ctx.banked + ctx.round_points;
    let projected = ctx.round_points + best.points;
    let total_after = standing + best.points;
    let lead = total_after as i64 - ctx.best_opponent as i64;
    let reaches = total_after >= ctx.goal;
    let gap = ctx.goal.saturating_sub(standing);

    if ctx.welfare && total_after > ctx.goal {
        return granular(rolls, gap, ctx);
    }
    if reaches && !ctx.final_round {
        return Plan::new(Directive::Finish, ending(rolls, best, gap));
    }
    if reaches && lead >= FINISH_LEAD as i64 && (dice < DICE || best.points >= SIX_DICE_MIN_BEST) {
        return Plan::new(Directive::Finish, ending(rolls, best, gap));
    }
    if lead < FINISH_LEAD as i64 && gap <= CLOSE_MARGIN && gap > GRANULAR_MIN_GAP {
        return granular(rolls, gap, ctx);
    }
    if reaches {
        return Plan::new(Directive::Continue, continuing(rolls, best, ctx));
    }
    if projected >= BIG_ROUND && !hot {
        let need = BIG_ROUND.saturating_sub(ctx.round_points);
        return Plan::new(Directive::Finish, ending(rolls, best, need));
    }
    if dice == 5 && projected >= FIVE_DICE_BANK && !hot {
        let need = FIVE_DICE_BANK.saturating_sub(ctx.round_points);
        return Plan::new(Directive::Finish, ending(rolls, best, need));
    }
    if projected <= SMALL_ROUND {
        return Plan::new(Directive::Continue, continuing(rolls, best, ctx));
    }
    Plan::new(Directive::Undecided, continuing(rolls, best, ctx))
}

/// Keep for a roll the bot means to bank: the combinations plus at most one
/// single, or the whole best keep if that falls short of `need`.
fn ending(rolls: &[u8], best: Selection, need: u32) -> Selection {
    let mut sel = select(rolls, |c| !c.is_single());
    let extra = [1u8, 5].into_iter().find(|f| sel.left.contains(f)).and_then(single);
    if let Some(s) = extra {
        sel.take(s);
    }
    if sel.is_empty() || sel.points < need { best } else { sel }
}

/// Keep for a roll the bot means to throw again: everything on hot dice,
/// otherwise the combinations plus up to two 1s and up to two 5s.
fn continuing(rolls: &[u8], best: Selection, ctx: &PlanContext) -> Selection {
    if best.left.is_empty() {
        return best;
    }
    let decline_twos = declines_three_twos(rolls, &best, ctx);
    let mut sel = select(rolls, |c| !c.is_single() && !(decline_twos && c.name == THREE_TWOS));
    for face in [1u8, 5] {
        for _ in 0..2 {
            match single(face) {
                Some(s) if sel.left.contains(&face) => sel.take(s),
                _ => break,
            }
        }
    }
    if sel.is_empty() { best } else { sel }
}

/// A fresh six holding exactly three 2s, where keeping them would leave one or
/// two dice: better odds rolling five dice than chasing hot dice with two.
fn declines_three_twos(rolls: &[u8], best: &Selection, ctx: &PlanContext) -> bool {
    ctx.fresh_throw
        && rolls.len() == DICE
        && rolls.iter().filter(|&&d| d == 2).count() == 3
        && matches!(best.left.len(), 1 | 2)
}

/// Aim for landing exactly on the goal.
fn granular(rolls: &[u8], gap: u32, ctx: &PlanContext) -> Plan {
    let options = scoring_subsets(rolls);
    let to_selection = |(kept, points): (Vec<u8>, u32)| {
        let mut left = rolls.to_vec();
        for d in &kept {
            if let Some(i) = left.iter().position(|x| x == d) {
                left.remove(i);
            }
        }
        Selection { kept, points, left, combos: vec![] }
    };
    if let Some(exact) = options.iter().filter(|(_, p)| *p == gap).min_by_key(|(k, _)| k.len()) {
        return Plan::new(Directive::Finish, to_selection(exact.clone()));
    }
    if let Some(under) = options
        .iter()
        .filter(|(_, p)| *p < gap)
        .max_by_key(|(k, p)| (*p, std::cmp::Reverse(k.len())))
    {
        return Plan::new(Directive::Continue, to_selection(under.clone()));
    }
    let pick = if ctx.welfare {
        options.iter().min_by_key(|(k, p)| (*p, k.len()))
    } else {
        options.iter().max_by_key(|(_, p)| *p)
    };
    match pick {
        Some(choice) => {
            let directive = if ctx.welfare { Directive::Continue } else { Directive::Finish };
            Plan::new(directive, to_selection(choice.clone()))
        }
        None => Plan::new(Directive::Continue, best_selection(rolls)),
    }
}

fn last_turn(rolls: &[u8], ctx: &PlanContext, target: u32, best: Selection) -> Plan {
    let deficit = target.saturating_sub(ctx.banked + ctx.round_points);
    if best.points > deficit {
        return Plan::new(Directive::Finish, ending(rolls, best, deficit + 1));
    }
    if rolls.len() >= 5 && best.points < LAST_TURN_SINGLES_BELOW && !best.left.is_empty() {
        if let Some(s) = [1u8, 5].into_iter().find(|f| rolls.contains(f)).and_then(single) {
            let mut sel = Selection { left: rolls.to_vec(), ..Selection::default() };
            sel.take(s);
            return Plan::new(Directive::Continue, sel);
        }
    }
    Plan::new(Directive::Continue, continuing(rolls, best, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::ScriptedDice;

    fn ctx(goal: u32, banked: u32, round_points: u32, best_opponent: u32) -> PlanContext {
        PlanContext { goal, banked, round_points, best_opponent, ..PlanContext::default() }
    }

    fn play(rolls: &[u8], ctx: &PlanContext) -> Decision {
        decide(rolls, ctx, &mut ScriptedDice::new([]))
    }

    #[test]
    fn banks_a_comfortable_win() {
        let d = play(&[1, 1, 1, 2, 3, 4], &ctx(4000, 3700, 0, 1000));
        assert_eq!(d, Decision { keep: vec![1, 1, 1], finish: true });
        assert_eq!(d.to_string(), "finish 1 1 1");
    }

    #[test]
    fn keeps_rolling_on_a_thin_lead_before_a_final_round() {
        let mut c = ctx(4000, 3950, 0, 3900);
        c.final_round = true;
        let d = play(&[1, 2, 3, 4, 6, 6], &c);
        assert_eq!(d, Decision { keep: vec![1], finish: false });
        assert_eq!(d.to_string(), "keep 1");
    }

    #[test]
    fn takes_the_win_when_the_goal_ends_the_match() {
        let d = play(&[1, 2, 3, 4, 6, 6], &ctx(4000, 3950, 0, 3900));
        assert_eq!(d, Decision { keep: vec![1], finish: true });
    }

    #[test]
    fn banking_keeps_one_extra_single() {
        let d = play(&[1, 1, 5, 5, 2, 3], &ctx(10_000, 0, 1900, 0));
        assert_eq!(d, Decision { keep: vec![1], finish: true });
        let d = play(&[1, 1, 1, 5, 5, 3], &ctx(10_000, 0, 1900, 0));
        assert_eq!(d, Decision { keep: vec![1, 1, 1, 5], finish: true });
    }

    #[test]
    fn banking_keeps_more_singles_when_one_falls_short() {
        // One 1 leaves the round at 1850; both 1s and the 5 reach 2000.
        let d = play(&[1, 1, 5, 2, 3, 6], &ctx(10_000, 0, 1750, 0));
        assert_eq!(d, Decision { keep: vec![1, 1, 5], finish: true });
    }

    #[test]
    fn rolling_on_keeps_two_of_each_single() {
        let d = play(&[1, 1, 5, 3, 4, 6], &ctx(10_000, 0, 0, 0));
        assert_eq!(d, Decision { keep: vec![1, 1, 5], finish: false });
        let plan = evaluate(&[1, 1, 5, 5, 3, 4], &ctx(10_000, 0, 0, 0));
        assert_eq!(plan.directive, Directive::Undecided);
        let mut kept = plan.selection.kept;
        kept.sort_unstable();
        assert_eq!(kept, vec![1, 1, 5, 5]);
    }

    #[test]
    fn granular_lands_exactly_on_goal() {
        let d = play(&[1, 5, 5, 3, 4], &ctx(10_000, 9000, 800, 9600));
        assert_eq!(d, Decision { keep: vec![1, 5, 5], finish: true });
    }

    #[test]
    fn granular_creeps_up_below_goal() {
        let d = play(&[1, 5, 5, 3, 4], &ctx(10_000, 9000, 700, 9500));
        assert_eq!(d, Decision { keep: vec![1, 5, 5], finish: false });
    }

    #[test]
    fn welfare_avoids_overshooting() {
        let mut c = ctx(4000, 3800, 0, 3000);
        c.welfare = true;
        // Best is 1050; two 1s land exactly on the goal instead.
        let d = play(&[1, 1, 1, 5, 3, 4], &c);
        assert_eq!(d, Decision { keep: vec![1, 1], finish: true });
    }

    #[test]
    fn banks_a_big_round() {
        let d = play(&[1, 2, 3, 4, 6, 6], &ctx(10_000, 0, 1900, 0));
        assert_eq!(d, Decision { keep: vec![1], finish: true });
    }

    #[test]
    fn opening_threshold_blocks_banking() {
        let mut c = ctx(10_000, 0, 1900, 0);
        c.opening_threshold = 3000;
        assert!(!play(&[1, 2, 3, 4, 6, 6], &c).finish);
    }

    #[test]
    fn banks_with_five_dice_and_enough_points() {
        let d = play(&[5, 2, 3, 4, 4], &ctx(10_000, 0, 300, 0));
        assert_eq!(d, Decision { keep: vec![5], finish: true });
    }

    #[test]
    fn small_rounds_keep_rolling() {
        let d = play(&[1, 2, 3, 4, 6, 6], &ctx(10_000, 0, 0, 0));
        assert!(!d.finish);
    }

    #[test]
    fn hot_dice_keep_everything() {
        let d = play(&[1, 2, 3, 4, 5, 6], &ctx(10_000, 0, 0, 0));
        assert_eq!(d.keep, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn fresh_throw_declines_three_twos() {
        let mut c = ctx(10_000, 0, 0, 0);
        c.fresh_throw = true;
        assert_eq!(play(&[2, 2, 2, 1, 3, 4], &c), Decision { keep: vec![1], finish: false });
        c.fresh_throw = false;
        assert_eq!(play(&[2, 2, 2, 1, 3, 4], &c), Decision { keep: vec![1, 2, 2, 2], finish: true });
    }

    #[test]
    fn preview_farkle_banks() {
        let c = ctx(10_000, 0, 300, 0);
        let mut farkle = ScriptedDice::new([vec![2, 3, 4]]);
        assert_eq!(decide(&[1, 2, 3, 4], &c, &mut farkle), Decision { keep: vec![1], finish: true });
        let mut scoring = ScriptedDice::new([vec![1, 3, 4]]);
        assert_eq!(decide(&[1, 2, 3, 4], &c, &mut scoring), Decision { keep: vec![1], finish: false });
    }

    #[test]
    fn last_turn_banks_once_ahead() {
        let mut c = ctx(4000, 4500, 0, 5000);
        c.to_beat = Some(5000);
        assert_eq!(play(&[1, 1, 1, 2, 3, 4], &c), Decision { keep: vec![1, 1, 1], finish: true });
        // A tie is not enough.
        assert!(!play(&[5, 2, 3, 3, 4, 4], &{ let mut c = c.clone(); c.round_points = 450; c }).finish);
    }

    #[test]
    fn last_turn_prefers_singles_early() {
        let mut c = ctx(4000, 3000, 0, 5000);
        c.to_beat = Some(5000);
        assert_eq!(play(&[1, 2, 2, 2, 3, 4], &c), Decision { keep: vec![1], finish: false });
    }

    #[test]
    fn high_stakes_choice() {
        assert!(choose_continue(0, 50));
        assert!(choose_continue(4, 300));
        assert!(!choose_continue(4, 250));
        assert!(!choose_continue(2, 1000));
    }
}
