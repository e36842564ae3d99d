//! Compiled patterns ready for evaluation against byte sources.

use super::backtrack::{Backtracker, Direction, View};
use super::source::ByteSource;
use crate::ir::{Anchor, CompiledPattern, Fragment};
use std::io;

/// A compiled pattern prepared for matching.
///
/// A `BytePattern` owns everything evaluation needs that can be derived once:
/// the reversed fragment list for end-anchored patterns and the length bounds
/// used to decide how much of an entry to read.
///
/// | Anchor     | Bytes requested                | Direction |
/// |------------|--------------------------------|-----------|
/// | `Start`    | head of at most `max_length`   | forward   |
/// | `End`      | tail                           | backward  |
/// | `Exact`    | whole entry (must fit window)  | forward   |
/// | `Floating` | scan window                    | forward   |
#[derive(Debug, Clone)]
pub struct BytePattern {
    compiled: CompiledPattern,
    reversed: Vec<Fragment>,
    min_length: usize,
    max_length: Option<usize>,
}

impl BytePattern {
    pub fn new(compiled: CompiledPattern) -> Self {
        let reversed = if compiled.anchor == Anchor::End {
            compiled.fragments.iter().rev().map(Fragment::reversed).collect()
        } else {
            Vec::new()
        };
        let min_length = compiled.min_length();
        let max_length = compiled.max_length();

        Self {
            compiled,
            reversed,
            min_length,
            max_length,
        }
    }

    pub fn compiled(&self) -> &CompiledPattern {
        &self.compiled
    }

    pub fn anchor(&self) -> Anchor {
        self.compiled.anchor
    }

    /// Evaluate against a source, trying every start offset when floating.
    pub fn matches(&self, source: &mut dyn ByteSource) -> io::Result<bool> {
        self.matches_with_offsets(source, None)
    }

    /// Evaluate against a source. For floating patterns, `candidates` restricts
    /// the start offsets tried (ascending, as found by a literal prefilter).
    pub fn matches_with_offsets(
        &self,
        source: &mut dyn ByteSource,
        candidates: Option<&[usize]>,
    ) -> io::Result<bool> {
        let fragments = &self.compiled.fragments;

        match self.compiled.anchor {
            Anchor::Start => {
                let data = match self.max_length {
                    Some(max) => source.head(max)?,
                    None => source.contents()?,
                };
                if data.len() < self.min_length {
                    return Ok(false);
                }
                let view = View::new(data, Direction::Forward);
                Ok(Backtracker::new(fragments).match_at(&view, 0, false))
            }
            Anchor::End => {
                let data = source.tail()?;
                if data.len() < self.min_length {
                    return Ok(false);
                }
                let view = View::new(data, Direction::Backward);
                Ok(Backtracker::new(&self.reversed).match_at(&view, 0, false))
            }
            Anchor::Exact => {
                if source.is_truncated()? {
                    return Ok(false);
                }
                let data = source.contents()?;
                if data.len() < self.min_length
                    || matches!(self.max_length, Some(max) if data.len() > max)
                {
                    return Ok(false);
                }
                let view = View::new(data, Direction::Forward);
                Ok(Backtracker::new(fragments).match_at(&view, 0, true))
            }
            Anchor::Floating => {
                let data = source.contents()?;
                if data.len() < self.min_length {
                    return Ok(false);
                }
                let view = View::new(data, Direction::Forward);
                let mut matcher = Backtracker::new(fragments);
                let last_start = data.len() - self.min_length;

                if let Some(starts) = candidates {
                    return Ok(starts
                        .iter()
                        .take_while(|&&start| start <= last_start)
                        .any(|&start| matcher.match_at(&view, start, false)));
                }

                // a leading unbounded gap already covers every later start
                if matches!(fragments.first(), Some(Fragment::Gap { max: None, .. })) {
                    return Ok(matcher.match_at(&view, 0, false));
                }

                Ok((0..=last_start).any(|start| matcher.match_at(&view, start, false)))
            }
        }
    }
}

impl From<CompiledPattern> for BytePattern {
    fn from(compiled: CompiledPattern) -> Self {
        Self::new(compiled)
    }
}
