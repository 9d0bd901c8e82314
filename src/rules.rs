//! Scoring catalog and keep resolution.
//!
//! Every scoring decision in the engine goes through [`CATALOG`]. Its order is
//! part of the rules: [`resolve_keep`] commits to the first entry that fits, so
//! rarer and larger combinations must come before the ones they contain.

pub const DICE: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Combination {
    pub name: &'static str,
    pub dice: &'static [u8],
    pub points: u32,
}

impl Combination {
    #[inline] pub fn counts(&self) -> [u8; 7] { face_counts(self.dice) }
    #[inline] pub fn is_single(&self) -> bool { self.dice.len() == 1 }
}

const fn combo(name: &'static str, dice: &'static [u8], points: u32) -> Combination {
    Combination { name, dice, points }
}

pub const CATALOG: &[Combination] = &[
    combo("six ones", &[1, 1, 1, 1, 1, 1], 8000),
    combo("six twos", &[2, 2, 2, 2, 2, 2], 1600),
    combo("six threes", &[3, 3, 3, 3, 3, 3], 2400),
    combo("six fours", &[4, 4, 4, 4, 4, 4], 3200),
    combo("six fives", &[5, 5, 5, 5, 5, 5], 4000),
    combo("six sixes", &[6, 6, 6, 6, 6, 6], 4800),
    combo("long straight", &[1, 2, 3, 4, 5, 6], 1500),
    combo("five ones", &[1, 1, 1, 1, 1], 4000),
    combo("five twos", &[2, 2, 2, 2, 2], 800),
    combo("five threes", &[3, 3, 3, 3, 3], 1200),
    combo("five fours", &[4, 4, 4, 4, 4], 1600),
    combo("five fives", &[5, 5, 5, 5, 5], 2000),
    combo("five sixes", &[6, 6, 6, 6, 6], 2400),
    combo("high straight", &[2, 3, 4, 5, 6], 750),
    combo("low straight", &[1, 2, 3, 4, 5], 500),
    combo("four ones", &[1, 1, 1, 1], 2000),
    combo("four twos", &[2, 2, 2, 2], 400),
    combo("four threes", &[3, 3, 3, 3], 600),
    combo("four fours", &[4, 4, 4, 4], 800),
    combo("four fives", &[5, 5, 5, 5], 1000),
    combo("four sixes", &[6, 6, 6, 6], 1200),
    combo("three ones", &[1, 1, 1], 1000),
    combo("three twos", &[2, 2, 2], 200),
    combo("three threes", &[3, 3, 3], 300),
    combo("three fours", &[4, 4, 4], 400),
    combo("three fives", &[5, 5, 5], 500),
    combo("three sixes", &[6, 6, 6], 600),
    combo("single one", &[1], 100),
    combo("single five", &[5], 50),
];

pub const THREE_TWOS: &str = "three twos";

/// Face histogram; slot 0 collects anything outside 1..=6.
pub fn face_counts(dice: &[u8]) -> [u8; 7] {
    let mut counts = [0u8; 7];
    for &d in dice {
        let slot = if (1..=6).contains(&d) { d as usize } else { 0 };
        counts[slot] = counts[slot].saturating_add(1);
    }
    counts
}

#[inline]
fn contains(have: &[u8; 7], want: &[u8; 7]) -> bool {
    want[0] == 0 && (1..=6).all(|f| want[f] <= have[f])
}

fn remove_one(dice: &mut Vec<u8>, face: u8) -> bool {
    match dice.iter().position(|&d| d == face) {
        Some(i) => { dice.remove(i); true }
        None => false,
    }
}

/// True when no catalog entry can be taken from `rolls`.
pub fn is_farkle(rolls: &[u8]) -> bool {
    let have = face_counts(rolls);
    !CATALOG.iter().any(|c| contains(&have, &c.counts()))
}

/// `keep` is a sub-multiset of `rolls`.
pub fn validate_keep(rolls: &[u8], keep: &[u8]) -> bool {
    contains(&face_counts(rolls), &face_counts(keep))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub points: u32,
    /// Dice still on the table once the keep is taken.
    pub remaining: Vec<u8>,
    /// Kept dice no combination could absorb. Empty on success.
    pub unused: Vec<u8>,
}

impl Resolution {
    fn rejected(rolls: &[u8], keep: &[u8]) -> Self {
        Self { points: 0, remaining: rolls.to_vec(), unused: keep.to_vec() }
    }
}

/// Scores `keep` against `rolls` by repeatedly taking the first catalog entry
/// that fits the dice still to be placed. Zero points means the keep is not a
/// legal scoring move.
pub fn resolve_keep(rolls: &[u8], keep: &[u8]) -> Resolution {
    if keep.is_empty() || !validate_keep(rolls, keep) {
        return Resolution::rejected(rolls, keep);
    }
    let mut remaining = rolls.to_vec();
    let mut unused = keep.to_vec();
    let mut points = 0u32;
    'scan: while !unused.is_empty() {
        let have = face_counts(&unused);
        for c in CATALOG {
            if contains(&have, &c.counts()) {
                for &d in c.dice {
                    remove_one(&mut unused, d);
                    remove_one(&mut remaining, d);
                }
                points += c.points;
                continue 'scan;
            }
        }
        return Resolution::rejected(rolls, &unused);
    }
    Resolution { points, remaining, unused }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub kept: Vec<u8>,
    pub points: u32,
    pub left: Vec<u8>,
    pub combos: Vec<&'static str>,
}

impl Selection {
    pub fn is_empty(&self) -> bool { self.kept.is_empty() }

    pub fn take(&mut self, c: &Combination) {
        for &d in c.dice {
            remove_one(&mut self.left, d);
            self.kept.push(d);
        }
        self.points += c.points;
        self.combos.push(c.name);
    }
}

/// Greedy decomposition of a roll restricted to the entries `allow` accepts.
pub fn select(rolls: &[u8], allow: impl Fn(&Combination) -> bool) -> Selection {
    let mut sel = Selection { left: rolls.to_vec(), ..Selection::default() };
    'scan: loop {
        let have = face_counts(&sel.left);
        for c in CATALOG.iter().filter(|c| allow(c)) {
            if contains(&have, &c.counts()) {
                sel.take(c);
                continue 'scan;
            }
        }
        return sel;
    }
}

/// Highest-value greedy decomposition of the whole roll.
pub fn best_selection(rolls: &[u8]) -> Selection { select(rolls, |_| true) }

pub fn single(face: u8) -> Option<&'static Combination> {
    CATALOG.iter().find(|c| c.is_single() && c.dice[0] == face)
}

/// Every distinct sub-multiset of `rolls` that resolves to a positive score.
pub fn scoring_subsets(rolls: &[u8]) -> Vec<(Vec<u8>, u32)> {
    let have = face_counts(rolls);
    let mut picks: Vec<Vec<u8>> = vec![vec![]];
    for face in 1..=6u8 {
        let mut next = Vec::new();
        for base in &picks {
            for n in 0..=have[face as usize] {
                let mut keep = base.clone();
                keep.extend(std::iter::repeat(face).take(n as usize));
                next.push(keep);
            }
        }
        picks = next;
    }
    picks
        .into_iter()
        .filter_map(|keep| {
            let points = resolve_keep(rolls, &keep).points;
            (points > 0).then_some((keep, points))
        })
        .collect()
}
