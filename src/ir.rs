//! Intermediate Representation (IR) for binary signature patterns.
//!
//! This module defines the data structures shared by the pattern compiler and
//! the byte matcher. A [`CompiledPattern`] is immutable once built and is shared
//! read-only by every container identified against a library.

use std::fmt;

pub type SignatureId = u32;
pub type PatternId = u32;

/// A canonical pattern expression, as produced by the normalizer.
///
/// The only way to obtain one is through [`crate::compiler::normalize`], so a
/// `SignatureExpression` never carries legacy set syntax.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureExpression(String);

impl SignatureExpression {
    pub(crate) fn from_canonical(expression: String) -> Self {
        Self(expression)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SignatureExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SignatureExpression {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Where a pattern is allowed to match within an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    /// Match begins at offset 0.
    Start,
    /// Match ends at the last byte; evaluated from the end backwards.
    End,
    /// Match begins at offset 0 and ends at the last byte.
    Exact,
    /// Match may begin at any offset.
    Floating,
}

impl Anchor {
    /// Combine two anchoring constraints on the same pattern.
    pub fn combine(self, other: Anchor) -> Anchor {
        use Anchor::*;
        match (self, other) {
            (Floating, a) | (a, Floating) => a,
            (Exact, _) | (_, Exact) => Exact,
            (Start, End) | (End, Start) => Exact,
            (Start, Start) => Start,
            (End, End) => End,
        }
    }

    pub fn is_start_anchored(self) -> bool {
        matches!(self, Anchor::Start | Anchor::Exact)
    }

    pub fn is_end_anchored(self) -> bool {
        matches!(self, Anchor::End | Anchor::Exact)
    }
}

/// A set of byte values matched by a single byte of input.
///
/// Ranges are inclusive and kept in the order they were written. Membership is
/// answered from a 256-bit table built at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ByteClass {
    ranges: Vec<(u8, u8)>,
    negated: bool,
    bits: [u64; 4],
}

impl ByteClass {
    pub fn new(ranges: Vec<(u8, u8)>, negated: bool) -> Self {
        let ranges: Vec<(u8, u8)> = ranges
            .into_iter()
            .map(|(a, b)| if a <= b { (a, b) } else { (b, a) })
            .collect();

        let mut bits = [0u64; 4];
        for &(lo, hi) in &ranges {
            for byte in lo..=hi {
                bits[(byte >> 6) as usize] |= 1u64 << (byte & 63);
            }
        }
        if negated {
            for word in bits.iter_mut() {
                *word = !*word;
            }
        }

        Self {
            ranges,
            negated,
            bits,
        }
    }

    /// The class matching every byte (`??`).
    pub fn any() -> Self {
        Self::new(vec![(0x00, 0xFF)], false)
    }

    #[inline]
    pub fn contains(&self, byte: u8) -> bool {
        self.bits[(byte >> 6) as usize] & (1u64 << (byte & 63)) != 0
    }

    pub fn ranges(&self) -> &[(u8, u8)] {
        &self.ranges
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Number of distinct byte values the class accepts.
    pub fn cardinality(&self) -> u32 {
        self.bits.iter().map(|w| w.count_ones()).sum()
    }
}

/// One element of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fragment {
    /// Exact bytes.
    Literal(Vec<u8>),
    /// Exactly one byte from a class.
    Class(ByteClass),
    /// Between `min` and `max` arbitrary bytes; `max == None` is unbounded.
    Gap { min: usize, max: Option<usize> },
    /// One of several fixed runs of literals and classes.
    Alternatives(Vec<Vec<Fragment>>),
}

impl Fragment {
    pub fn min_length(&self) -> usize {
        match self {
            Fragment::Literal(bytes) => bytes.len(),
            Fragment::Class(_) => 1,
            Fragment::Gap { min, .. } => *min,
            Fragment::Alternatives(branches) => branches
                .iter()
                .map(|b| b.iter().map(Fragment::min_length).sum())
                .min()
                .unwrap_or(0),
        }
    }

    pub fn max_length(&self) -> Option<usize> {
        match self {
            Fragment::Literal(bytes) => Some(bytes.len()),
            Fragment::Class(_) => Some(1),
            Fragment::Gap { max, .. } => *max,
            Fragment::Alternatives(branches) => {
                let mut longest = 0usize;
                for branch in branches {
                    let mut len = 0usize;
                    for fragment in branch {
                        len = len.checked_add(fragment.max_length()?)?;
                    }
                    longest = longest.max(len);
                }
                Some(longest)
            }
        }
    }

    /// The same fragment as seen when reading input from the end.
    pub(crate) fn reversed(&self) -> Fragment {
        match self {
            Fragment::Literal(bytes) => Fragment::Literal(bytes.iter().rev().copied().collect()),
            Fragment::Alternatives(branches) => Fragment::Alternatives(
                branches
                    .iter()
                    .map(|b| b.iter().rev().map(Fragment::reversed).collect())
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// A fully compiled binary pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledPattern {
    pub expression: SignatureExpression,
    pub anchor: Anchor,
    pub fragments: Vec<Fragment>,
}

impl CompiledPattern {
    /// Build a pattern, coalescing adjacent literals and adjacent gaps.
    pub fn new(expression: SignatureExpression, anchor: Anchor, fragments: Vec<Fragment>) -> Self {
        Self {
            expression,
            anchor,
            fragments: coalesce(fragments),
        }
    }

    /// Fewest bytes an entry needs for this pattern to match.
    pub fn min_length(&self) -> usize {
        self.fragments.iter().map(Fragment::min_length).sum()
    }

    /// Most bytes a match can span, if bounded.
    pub fn max_length(&self) -> Option<usize> {
        let mut total = 0usize;
        for fragment in &self.fragments {
            total = total.checked_add(fragment.max_length()?)?;
        }
        Some(total)
    }

    /// The literal the pattern starts with, if any.
    pub fn leading_literal(&self) -> Option<&[u8]> {
        match self.fragments.first() {
            Some(Fragment::Literal(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Place the pattern `min..=max` bytes after the start of the entry.
    pub(crate) fn offset_from_start(self, min: usize, max: usize) -> Self {
        let mut fragments = Vec::with_capacity(self.fragments.len() + 1);
        fragments.push(Fragment::Gap {
            min,
            max: Some(max),
        });
        fragments.extend(self.fragments);
        Self::new(self.expression, self.anchor.combine(Anchor::Start), fragments)
    }

    /// Place the pattern `min..=max` bytes before the end of the entry.
    pub(crate) fn offset_from_end(self, min: usize, max: usize) -> Self {
        let mut fragments = self.fragments;
        fragments.push(Fragment::Gap {
            min,
            max: Some(max),
        });
        Self::new(self.expression, self.anchor.combine(Anchor::End), fragments)
    }
}

pub(crate) fn coalesce(fragments: Vec<Fragment>) -> Vec<Fragment> {
    let mut out: Vec<Fragment> = Vec::with_capacity(fragments.len());

    for fragment in fragments {
        match fragment {
            Fragment::Gap {
                min: 0,
                max: Some(0),
            } => {}
            Fragment::Literal(bytes) if bytes.is_empty() => {}
            Fragment::Literal(bytes) => {
                if let Some(Fragment::Literal(prev)) = out.last_mut() {
                    prev.extend_from_slice(&bytes);
                } else {
                    out.push(Fragment::Literal(bytes));
                }
            }
            Fragment::Gap { min, max } => {
                if let Some(Fragment::Gap {
                    min: prev_min,
                    max: prev_max,
                }) = out.last_mut()
                {
                    *prev_min = prev_min.saturating_add(min);
                    *prev_max = match (*prev_max, max) {
                        (Some(a), Some(b)) => Some(a.saturating_add(b)),
                        _ => None,
                    };
                } else {
                    out.push(Fragment::Gap { min, max });
                }
            }
            other => out.push(other),
        }
    }

    out
}
