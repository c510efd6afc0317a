//! Blocks: the word/value maps a G-code line parses into.

use std::collections::BTreeMap;
use std::fmt;

use motion::{Distance, Waypoint};
use tracing::warn;

/// A single G-code block: a mapping from uppercase word letters to numbers,
/// e.g. `G1 X10 F200` is `{G:1, X:10, F:200}`.
///
/// Letters missing from a block inherit from the prior machine state, which
/// is itself a block kept merged up to date by the executive.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block(BTreeMap<char, f64>);

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, letter: char) -> Option<f64> {
        self.0.get(&letter).copied()
    }

    pub fn set(&mut self, letter: char, value: f64) {
        self.0.insert(letter, value);
    }

    pub fn remove(&mut self, letter: char) {
        self.0.remove(&letter);
    }

    pub fn contains(&self, letter: char) -> bool {
        self.0.contains_key(&letter)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// The `G` word as an integer code, if present.
    pub fn g(&self) -> Option<i32> {
        self.get('G').map(|v| v as i32)
    }

    /// The `M` word as an integer code, if present.
    pub fn m(&self) -> Option<i32> {
        self.get('M').map(|v| v as i32)
    }

    /// True for blocks that command a new position: G0/G1 without an M word.
    pub fn is_move(&self) -> bool {
        !self.contains('M') && matches!(self.g(), Some(0) | Some(1))
    }

    /// Right-biased overlay: values of `source` win over this block's.
    pub fn merge(&self, source: &Block) -> Block {
        let mut merged = self.clone();
        for (k, v) in source.iter() {
            merged.set(k, v);
        }
        merged
    }

    /// Keys of this block whose value differs from (or is absent in)
    /// `source`.
    pub fn diff(&self, source: &Block) -> Block {
        let mut out = Block::new();
        for (k, v) in self.iter() {
            if source.get(k) != Some(v) {
                out.set(k, v);
            }
        }
        out
    }

    /// The coordinates of this block as a 4D vector; absent axes read 0.
    pub fn to_distance(&self) -> Distance {
        Distance([
            self.get('X').unwrap_or(0.0),
            self.get('Y').unwrap_or(0.0),
            self.get('Z').unwrap_or(0.0),
            self.get('A').unwrap_or(0.0),
        ])
    }

    /// The coordinates plus feedrate as a 5D waypoint. A missing feedrate is
    /// substituted with 0.1 mm/s and logged; downstream velocity pacing
    /// cannot work with zero.
    pub fn to_waypoint(&self) -> Waypoint {
        let velocity = match self.get('F') {
            Some(f) => f,
            None => {
                warn!("block without a feedrate treated as F0.1: {}", self);
                0.1
            }
        };
        Waypoint::from_parts(self.to_distance(), velocity)
    }

    /// A block carrying only the coordinate words of `d`.
    pub fn from_distance(d: &Distance) -> Block {
        Block::from([('X', d[0]), ('Y', d[1]), ('Z', d[2]), ('A', d[3])])
    }

    /// A block carrying coordinates and feedrate of `w`.
    pub fn from_waypoint(w: &Waypoint) -> Block {
        let mut b = Block::from_distance(&w.spatial());
        b.set('F', w.velocity());
        b
    }

    /// Movement vector from this block's position to `target`'s.
    pub fn vector_to(&self, target: &Block) -> Distance {
        target.to_distance() - self.to_distance()
    }
}

impl<const N: usize> From<[(char, f64); N]> for Block {
    fn from(pairs: [(char, f64); N]) -> Self {
        Block(pairs.into_iter().collect())
    }
}

impl FromIterator<(char, f64)> for Block {
    fn from_iter<I: IntoIterator<Item = (char, f64)>>(iter: I) -> Self {
        Block(iter.into_iter().collect())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}{}", k, v)?;
        }
        Ok(())
    }
}
