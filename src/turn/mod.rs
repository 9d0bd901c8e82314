//! The match aggregate and every legal transition on it.
//!
//! [`Match::apply`] runs an action and the cascade it triggers (automatic
//! throws, farkles, turn hand-offs) against a copy of the state. The copy is
//! committed only if the whole cascade succeeds.

use crate::bot::{self, PlanContext};
use crate::config::MatchConfig;
use crate::error::MoveError;
use crate::lifecycle;
use crate::model::*;
use crate::rng::{DiceSource, SeededDice};
use crate::rules::{is_farkle, resolve_keep, validate_keep, DICE};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use tracing::{debug, info};


pub const MIN_PLAYERS: usize = 2;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchState {
    pub id: MatchId,
    pub config: MatchConfig,
    /// Seated players; `players[i].turn_order == i + 1`.
    pub players: Vec<Player>,
    pub phase: Phase,
    pub turn: Option<Turn>,
    pub endgame: Endgame,
    pub conceded: Vec<PlayerRecord>,
}

impl MatchState {
    pub fn seat(&self, player: &str) -> Option<usize> {
        self.players.iter().position(|p| p.id == player)
    }

    pub fn player(&self, player: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player)
    }

    pub fn current(&self) -> Option<&PlayerId> {
        match self.phase {
            Phase::AwaitingRoll | Phase::AwaitingKeep | Phase::AwaitingHighStakesChoice { .. } => {
                self.turn.as_ref().map(|t| &t.player)
            }
            Phase::Forming | Phase::Ended { .. } => None,
        }
    }

    pub fn winner(&self) -> Option<&PlayerId> {
        match &self.phase {
            Phase::Ended { winner } => Some(winner),
            _ => None,
        }
    }

    fn renumber(&mut self) {
        for (i, p) in self.players.iter_mut().enumerate() {
            p.turn_order = i as u32 + 1;
        }
    }
}

pub struct Match {
    state: MatchState,
    dice: Box<dyn DiceSource>,
}

impl Match {
    /// A forming match; seats follow the given order until the roll-off.
    pub fn new(id: MatchId, config: MatchConfig, players: Vec<Player>, dice: Box<dyn DiceSource>) -> Self {
        let mut state = MatchState {
            id,
            config,
            players,
            phase: Phase::Forming,
            turn: None,
            endgame: Endgame::Open,
            conceded: vec![],
        };
        state.renumber();
        Self { state, dice }
    }

    pub fn seeded(id: MatchId, config: MatchConfig, players: Vec<Player>, seed: u64) -> Self {
        Self::new(id, config, players, Box::new(SeededDice::new(seed)))
    }

    /// Picks up a match from a stored state.
    pub fn resume(state: MatchState, dice: Box<dyn DiceSource>) -> Self { Self { state, dice } }

    pub fn state(&self) -> &MatchState { &self.state }
    pub fn id(&self) -> MatchId { self.state.id }
    pub fn phase(&self) -> &Phase { &self.state.phase }
    pub fn current_player(&self) -> Option<&PlayerId> { self.state.current() }
    pub fn winner(&self) -> Option<&PlayerId> { self.state.winner() }
    pub fn is_over(&self) -> bool { self.state.winner().is_some() }

    pub fn apply(&mut self, player: &str, action: Action) -> Result<Vec<Event>, MoveError> {
        if self.is_over() {
            return Err(MoveError::MatchOver);
        }
        let mut next = self.state.clone();
        let mut tx = Transition { state: &mut next, dice: self.dice.as_mut(), events: vec![] };
        tx.dispatch(player, action)?;
        let events = tx.events;
        self.state = next;
        Ok(events)
    }

    /// Snapshot for the archive once a winner is known.
    pub fn history(&self) -> Option<MatchHistory> {
        let winner = self.state.winner()?;
        Some(lifecycle::history(self.state.id, &self.state.config, &self.state.players, &self.state.conceded, winner))
    }

    /// What the planner sees when the current player is a bot.
    pub fn plan_context(&self) -> Option<PlanContext> {
        let turn = self.state.turn.as_ref()?;
        let me = self.state.player(&turn.player)?;
        let others = self.state.players.iter().filter(|p| p.id != me.id);
        let best_opponent = others.map(|p| p.score).max().unwrap_or(0);
        let to_beat = match self.state.endgame.leader() {
            Some(leader) if leader != &me.id => Some(best_opponent),
            _ => None,
        };
        Some(PlanContext {
            goal: self.state.config.points_goal,
            banked: me.score,
            round_points: turn.round_total(),
            best_opponent,
            to_beat,
            opening_threshold: self.state.config.opening_threshold,
            welfare: self.state.config.welfare,
            final_round: self.state.config.last_turn && !self.state.config.welfare,
            fresh_throw: turn.roll_count == 1 && turn.rolls.len() == DICE,
        })
    }

    /// The bot's move, if the player to act is a bot.
    pub fn bot_action(&self, preview: &mut dyn DiceSource) -> Option<(PlayerId, Action)> {
        let current = self.state.current()?;
        if !self.state.player(current)?.is_bot {
            return None;
        }
        let action = match &self.state.phase {
            Phase::AwaitingKeep => {
                let turn = self.state.turn.as_ref()?;
                let decision = bot::decide(&turn.rolls, &self.plan_context()?, preview);
                debug!(player = %current, decision = %decision, "bot decided");
                decision.into_action()
            }
            Phase::AwaitingHighStakesChoice { dice_on_table, pending_points } => {
                if bot::choose_continue(*dice_on_table, *pending_points) { Action::ContinueDice } else { Action::NewDice }
            }
            _ => return None,
        };
        Some((current.clone(), action))
    }
}

/// One action's worth of mutation over a borrowed state.
struct Transition<'a> {
    state: &'a mut MatchState,
    dice: &'a mut dyn DiceSource,
    events: Vec<Event>,
}

impl Transition<'_> {
    fn dispatch(&mut self, player: &str, action: Action) -> Result<(), MoveError> {
        let seat = self.state.seat(player).ok_or(MoveError::UnknownPlayer)?;
        if action.is_turn_move() {
            self.expect_turn(player)?;
        }
        match action {
            Action::Ready => self.ready(seat)?,
            Action::Concede => self.concede(seat)?,
            Action::Hurry => self.hurry(player)?,
            Action::Keep(dice) => self.keep(dice)?,
            Action::Finish(dice) => self.finish(dice)?,
            Action::NewDice => self.high_stakes(false)?,
            Action::ContinueDice => self.high_stakes(true)?,
        }
        self.settle()
    }

    fn expect_turn(&self, player: &str) -> Result<(), MoveError> {
        let current = self.state.current().ok_or(MoveError::WrongPhase)?;
        if current != player {
            return Err(MoveError::NotYourTurn { current: current.clone() });
        }
        Ok(())
    }

    fn current_index(&self) -> Result<usize, MoveError> {
        let turn = self.state.turn.as_ref().ok_or_else(|| MoveError::Invariant("no turn in progress".into()))?;
        self.state
            .seat(&turn.player)
            .ok_or_else(|| MoveError::Invariant(format!("current player {} is not seated", turn.player)))
    }

    fn take_turn(&mut self) -> Result<Turn, MoveError> {
        self.state.turn.take().ok_or_else(|| MoveError::Invariant("no turn in progress".into()))
    }

    fn next_seat(&self, seat: usize) -> usize { (seat + 1) % self.state.players.len() }

    /// Throws until someone has a scoring roll in front of them or the match
    /// stops waiting on dice.
    fn settle(&mut self) -> Result<(), MoveError> {
        while self.state.phase == Phase::AwaitingRoll {
            self.throw()?;
        }
        Ok(())
    }

    fn ready(&mut self, seat: usize) -> Result<(), MoveError> {
        if self.state.phase != Phase::Forming {
            return Err(MoveError::WrongPhase);
        }
        self.state.players[seat].ready = true;
        self.start_if_ready()
    }

    fn start_if_ready(&mut self) -> Result<(), MoveError> {
        if self.state.players.len() >= MIN_PLAYERS && self.state.players.iter().all(|p| p.ready) {
            self.start()?;
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), MoveError> {
        let ids: Vec<PlayerId> = self.state.players.iter().map(|p| p.id.clone()).collect();
        let (order, roll_offs) = lifecycle::decide_turn_order(&ids, self.dice);
        let mut seated = Vec::with_capacity(order.len());
        for id in &order {
            let seat = self.state.seat(id).ok_or_else(|| MoveError::Invariant(format!("roll-off seated unknown {id}")))?;
            seated.push(self.state.players[seat].clone());
        }
        self.state.players = seated;
        self.state.renumber();
        info!(match_id = self.state.id, first = %order[0], "match started");
        self.events.push(Event::TurnOrderDecided { order, roll_offs });
        self.pass_to(0, None)
    }

    fn throw(&mut self) -> Result<(), MoveError> {
        let seat = self.current_index()?;
        let turn = self.state.turn.as_mut().ok_or_else(|| MoveError::Invariant("no turn in progress".into()))?;
        let count = turn.dice_to_throw();
        let faces = self.dice.roll(count);
        if faces.len() != count || faces.iter().any(|f| !(1..=6).contains(f)) {
            return Err(MoveError::Invariant(format!("dice source returned {faces:?} for {count} dice")));
        }
        turn.rolls = faces.clone();
        turn.roll_count += 1;
        self.state.players[seat].stats.rolls += 1;
        let player = turn.player.clone();
        let farkle = is_farkle(&faces);
        self.events.push(Event::DiceRolled { player, values: faces });
        if farkle {
            self.fold(seat)
        } else {
            self.state.phase = Phase::AwaitingKeep;
            Ok(())
        }
    }

    /// Checks a keep against the dice showing; returns its points and how
    /// many dice stay on the table.
    fn score(&self, keep: &[u8]) -> Result<(u32, usize), MoveError> {
        if self.state.phase != Phase::AwaitingKeep {
            return Err(MoveError::WrongPhase);
        }
        let turn = self.state.turn.as_ref().ok_or_else(|| MoveError::Invariant("no turn in progress".into()))?;
        if keep.is_empty() || !validate_keep(&turn.rolls, keep) {
            return Err(MoveError::DiceNotOnTable);
        }
        let resolved = resolve_keep(&turn.rolls, keep);
        if resolved.points == 0 {
            return Err(MoveError::NoScore);
        }
        Ok((resolved.points, resolved.remaining.len()))
    }

    fn keep(&mut self, kept: Vec<u8>) -> Result<(), MoveError> {
        let (points, left) = self.score(&kept)?;
        let seat = self.current_index()?;
        let turn = self.state.turn.as_mut().ok_or_else(|| MoveError::Invariant("no turn in progress".into()))?;
        turn.points += points;
        turn.dice_on_table = left;
        turn.rolls.clear();
        let round = turn.round_total();
        let player = turn.player.clone();
        self.events.push(Event::TurnResolved { kind: TurnKind::Keep, player, points, kept: kept.clone() });

        if self.state.config.welfare {
            let projected = self.state.players[seat].score + round;
            if projected > self.state.config.points_goal {
                return self.welfare(seat);
            }
            if projected == self.state.config.points_goal {
                return self.bank(seat, kept, left);
            }
        }
        self.state.phase = Phase::AwaitingRoll;
        Ok(())
    }

    fn finish(&mut self, kept: Vec<u8>) -> Result<(), MoveError> {
        let (points, left) = self.score(&kept)?;
        let seat = self.current_index()?;
        let banked = self.state.players[seat].score;
        let threshold = self.state.config.opening_threshold;
        let turn = self.state.turn.as_mut().ok_or_else(|| MoveError::Invariant("no turn in progress".into()))?;
        let round = turn.round_total() + points;
        if banked == 0 && round < threshold {
            return Err(MoveError::OpeningThreshold { threshold, shortfall: threshold - round });
        }
        turn.points += points;
        turn.dice_on_table = left;
        turn.rolls.clear();
        if self.state.config.welfare && banked + round > self.state.config.points_goal {
            return self.welfare(seat);
        }
        self.bank(seat, kept, left)
    }

    fn bank(&mut self, seat: usize, kept: Vec<u8>, left: usize) -> Result<(), MoveError> {
        let turn = self.take_turn()?;
        let round = turn.round_total();
        let goal = self.state.config.points_goal;
        let p = &mut self.state.players[seat];
        p.score += round;
        p.stats.banked.record(turn.points);
        if turn.piggybacked > 0 {
            p.stats.piggyback_banked.record(turn.piggybacked);
        }
        p.stats.finishes += 1;
        let (id, score) = (p.id.clone(), p.score);
        debug!(match_id = self.state.id, player = %id, round, score, "banked");
        self.events.push(Event::TurnResolved { kind: TurnKind::Finish, player: id.clone(), points: round, kept });

        let next = self.next_seat(seat);
        if score < goal {
            let pending = self.state.config.high_stakes.then_some((left, round));
            return self.pass_to(next, pending);
        }
        if self.state.config.welfare || !self.state.config.last_turn {
            return self.end(id);
        }
        if self.state.endgame == Endgame::Open {
            info!(match_id = self.state.id, leader = %id, score, "final round");
            self.state.endgame = Endgame::FinalRound { leader: id.clone() };
            self.events.push(Event::LastTurnStarted { leader: id, score });
        }
        self.pass_to(next, None)
    }

    fn fold(&mut self, seat: usize) -> Result<(), MoveError> {
        let turn = self.take_turn()?;
        let stats = &mut self.state.players[seat].stats;
        stats.lost.record(turn.points);
        if turn.piggybacked > 0 {
            stats.piggyback_lost.record(turn.piggybacked);
        }
        stats.folds += 1;
        self.events.push(Event::TurnResolved {
            kind: TurnKind::Farkle,
            player: turn.player,
            points: turn.points + turn.piggybacked,
            kept: vec![],
        });
        let next = self.next_seat(seat);
        self.pass_to(next, None)
    }

    /// Opponent who receives a welfare payout: lowest bank among those who
    /// have banked (everyone if nobody has), furthest ahead on ties.
    fn welfare_recipient(&self, seat: usize) -> Option<usize> {
        let n = self.state.players.len();
        let opponents: Vec<usize> = (1..n).map(|k| (seat + k) % n).collect();
        let on_board: Vec<usize> = opponents.iter().copied().filter(|&i| self.state.players[i].score > 0).collect();
        let pool = if on_board.is_empty() { opponents } else { on_board };
        pool.into_iter().min_by_key(|&i| (self.state.players[i].score, Reverse((i + n - seat) % n)))
    }

    fn welfare(&mut self, seat: usize) -> Result<(), MoveError> {
        let turn = self.take_turn()?;
        let amount = turn.round_total();
        let to = self
            .welfare_recipient(seat)
            .ok_or_else(|| MoveError::Invariant("welfare with no opponents".into()))?;
        let giver = &mut self.state.players[seat];
        giver.stats.welfare_lost.record(amount);
        giver.stats.welfares += 1;
        let from = giver.id.clone();
        let taker = &mut self.state.players[to];
        taker.score += amount;
        taker.stats.welfare_gained.record(amount);
        let (to_id, to_score) = (taker.id.clone(), taker.score);
        info!(match_id = self.state.id, from = %from, to = %to_id, amount, "welfare");
        self.events.push(Event::TurnResolved { kind: TurnKind::Welfare, player: from.clone(), points: amount, kept: vec![] });
        self.events.push(Event::WelfareTriggered { from, to: to_id.clone(), amount });
        if to_score >= self.state.config.points_goal {
            return self.end(to_id);
        }
        let next = self.next_seat(seat);
        self.pass_to(next, None)
    }

    fn high_stakes(&mut self, inherit: bool) -> Result<(), MoveError> {
        let Phase::AwaitingHighStakesChoice { dice_on_table, pending_points } = self.state.phase else {
            return Err(MoveError::WrongPhase);
        };
        let turn = self.state.turn.as_mut().ok_or_else(|| MoveError::Invariant("no turn in progress".into()))?;
        if inherit {
            turn.dice_on_table = dice_on_table;
            turn.piggybacked = pending_points;
        }
        self.state.phase = Phase::AwaitingRoll;
        Ok(())
    }

    fn hurry(&mut self, by: &str) -> Result<(), MoveError> {
        let current = self.state.current().ok_or(MoveError::WrongPhase)?;
        if current == by {
            return Err(MoveError::OwnTurn);
        }
        if !matches!(self.state.phase, Phase::AwaitingKeep | Phase::AwaitingHighStakesChoice { .. }) {
            return Err(MoveError::WrongPhase);
        }
        let seat = self.current_index()?;
        let turn = self.take_turn()?;
        let skipped = turn.round_total();
        let stats = &mut self.state.players[seat].stats;
        stats.skipped.record(skipped);
        stats.skips += 1;
        info!(match_id = self.state.id, player = %turn.player, by, "hurried");
        self.events.push(Event::TurnResolved { kind: TurnKind::Skip, player: turn.player, points: skipped, kept: vec![] });
        let next = self.next_seat(seat);
        self.pass_to(next, None)
    }

    fn concede(&mut self, seat: usize) -> Result<(), MoveError> {
        let id = self.state.players[seat].id.clone();
        let forming = self.state.phase == Phase::Forming;
        if self.state.players.len() == 1 {
            return Err(MoveError::WrongPhase);
        }
        let was_current = self.state.current() == Some(&id);
        let mut next = None;
        let mut forfeited = 0;
        if was_current {
            forfeited = self.take_turn()?.round_total();
            next = Some(self.state.players[self.next_seat(seat)].id.clone());
        }
        let record = PlayerRecord::from_player(&self.state.players[seat], true, false);
        self.state.players.remove(seat);
        self.state.renumber();
        self.state.conceded.push(record);
        info!(match_id = self.state.id, player = %id, remaining = self.state.players.len(), "conceded");
        if forming {
            if let [last] = self.state.players.as_slice() {
                let winner = last.id.clone();
                return self.end(winner);
            }
            return self.start_if_ready();
        }
        self.events.push(Event::TurnResolved { kind: TurnKind::Concede, player: id.clone(), points: forfeited, kept: vec![] });

        if self.state.endgame.leader() == Some(&id) {
            let goal = self.state.config.points_goal;
            let heir = self
                .state
                .players
                .iter()
                .filter(|p| p.score >= goal)
                .max_by_key(|p| (p.score, Reverse(p.turn_order)))
                .map(|p| p.id.clone());
            self.state.endgame = match heir {
                Some(leader) => Endgame::FinalRound { leader },
                None => Endgame::Open,
            };
        }
        if let [last] = self.state.players.as_slice() {
            let winner = last.id.clone();
            return self.end(winner);
        }
        match next {
            Some(next) => {
                let seat = self.state.seat(&next).ok_or_else(|| MoveError::Invariant(format!("{next} vanished")))?;
                self.pass_to(seat, None)
            }
            None => Ok(()),
        }
    }

    /// Hands the dice to `seat`, or closes the final round if the wheel is
    /// back at the leader.
    fn pass_to(&mut self, seat: usize, pending: Option<(usize, u32)>) -> Result<(), MoveError> {
        let id = self.state.players[seat].id.clone();
        if self.state.endgame.leader() == Some(&id) {
            return self.close_final_round();
        }
        self.state.turn = Some(Turn::fresh(id.clone()));
        self.events.push(Event::TurnAdvanced { player: id.clone() });
        match pending {
            Some((dice_on_table, pending_points)) => {
                self.state.phase = Phase::AwaitingHighStakesChoice { dice_on_table, pending_points };
                self.events.push(Event::HighStakesChoiceRequested { player: id, dice_on_table, pending_points });
            }
            None => self.state.phase = Phase::AwaitingRoll,
        }
        Ok(())
    }

    /// The leader holds unless someone now banks strictly more.
    fn close_final_round(&mut self) -> Result<(), MoveError> {
        let leader = self.state.endgame.leader().cloned().ok_or_else(|| MoveError::Invariant("no leader".into()))?;
        let held = self
            .state
            .player(&leader)
            .map(|p| p.score)
            .ok_or_else(|| MoveError::Invariant(format!("leader {leader} is not seated")))?;
        let challenger = self
            .state
            .players
            .iter()
            .filter(|p| p.id != leader)
            .max_by_key(|p| (p.score, Reverse(p.turn_order)));
        let winner = match challenger {
            Some(c) if c.score > held => c.id.clone(),
            _ => leader,
        };
        self.end(winner)
    }

    fn end(&mut self, winner: PlayerId) -> Result<(), MoveError> {
        self.state.turn = None;
        let standings = lifecycle::standings(&self.state.players);
        info!(match_id = self.state.id, winner = %winner, "match ended");
        self.state.phase = Phase::Ended { winner: winner.clone() };
        self.events.push(Event::MatchEnded { winner, standings });
        Ok(())
    }
}
