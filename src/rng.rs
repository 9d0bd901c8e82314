use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;

/// Where a match gets its dice from.
pub trait DiceSource: Send {
    fn roll(&mut self, count: usize) -> Vec<u8>;
}

/// Deterministic per-match dice: every throw reseeds from the match seed and
/// the throw sequence so a match can be replayed from its seed alone.
#[derive(Clone, Debug)]
pub struct SeededDice {
    seed: u64,
    seq: u64,
}

impl SeededDice {
    pub fn new(seed: u64) -> Self { Self { seed, seq: 0 } }
}

impl DiceSource for SeededDice {
    fn roll(&mut self, count: usize) -> Vec<u8> {
        self.seq += 1;
        let mut rng = StdRng::seed_from_u64(self.seed ^ self.seq.wrapping_mul(7919));
        (0..count).map(|_| rng.gen_range(1..=6u8)).collect()
    }
}

/// Replays queued throws, truncated to the requested count; falls back to a
/// seeded source once the script runs out.
#[derive(Clone, Debug)]
pub struct ScriptedDice {
    script: VecDeque<Vec<u8>>,
    fallback: SeededDice,
}

impl ScriptedDice {
    pub fn new<I: IntoIterator<Item = Vec<u8>>>(script: I) -> Self {
        Self { script: script.into_iter().collect(), fallback: SeededDice::new(0x5EED) }
    }
}

impl DiceSource for ScriptedDice {
    fn roll(&mut self, count: usize) -> Vec<u8> {
        match self.script.pop_front() {
            Some(mut faces) => {
                faces.truncate(count);
                faces
            }
            None => self.fallback.roll(count),
        }
    }
}
