//! Iterative backtracking over compiled fragments.
//!
//! Gaps and alternatives are choice points. Choices are kept on an explicit
//! stack rather than the call stack, gaps try the shortest consumption first,
//! and every `(fragment, offset)` state proven to fail is remembered so that
//! no state is explored twice within one input.

use crate::ir::Fragment;
use std::collections::HashSet;

/// Direction in which the input is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Forward,
    /// Offset 0 is the last byte of the input.
    Backward,
}

/// The input as seen by the matcher.
#[derive(Debug, Clone, Copy)]
pub(crate) struct View<'a> {
    data: &'a [u8],
    direction: Direction,
}

impl<'a> View<'a> {
    pub(crate) fn new(data: &'a [u8], direction: Direction) -> Self {
        Self { data, direction }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn byte(&self, offset: usize) -> u8 {
        match self.direction {
            Direction::Forward => self.data[offset],
            Direction::Backward => self.data[self.data.len() - 1 - offset],
        }
    }

    #[inline]
    fn matches_literal(&self, offset: usize, bytes: &[u8]) -> bool {
        if self.len() - offset < bytes.len() {
            return false;
        }
        match self.direction {
            Direction::Forward => &self.data[offset..offset + bytes.len()] == bytes,
            Direction::Backward => bytes
                .iter()
                .enumerate()
                .all(|(k, &b)| self.byte(offset + k) == b),
        }
    }

    /// Match a fixed run of literals and classes, returning the end offset.
    fn match_fixed(&self, offset: usize, run: &[Fragment]) -> Option<usize> {
        let mut pos = offset;
        for fragment in run {
            match fragment {
                Fragment::Literal(bytes) => {
                    if !self.matches_literal(pos, bytes) {
                        return None;
                    }
                    pos += bytes.len();
                }
                Fragment::Class(class) => {
                    if pos >= self.len() || !class.contains(self.byte(pos)) {
                        return None;
                    }
                    pos += 1;
                }
                // the parser keeps gaps and nesting out of alternatives
                Fragment::Gap { .. } | Fragment::Alternatives(_) => return None,
            }
        }
        Some(pos)
    }
}

#[derive(Debug, Clone, Copy)]
enum Choice {
    Gap {
        index: usize,
        base: usize,
        min: usize,
        taken: usize,
        max_take: usize,
    },
    Alternative {
        index: usize,
        offset: usize,
        next_branch: usize,
    },
}

/// Matcher state for one pattern over one input.
pub(crate) struct Backtracker<'p> {
    fragments: &'p [Fragment],
    failed: HashSet<(usize, usize)>,
    /// For a gap running to the end of input: the lowest offset after the gap
    /// from which every continuation is known to fail.
    floors: Vec<usize>,
}

impl<'p> Backtracker<'p> {
    pub(crate) fn new(fragments: &'p [Fragment]) -> Self {
        Self {
            fragments,
            failed: HashSet::new(),
            floors: vec![usize::MAX; fragments.len()],
        }
    }

    /// Try to match all fragments starting at `start`.
    ///
    /// With `require_end` the match must consume the input exactly. The same
    /// `Backtracker` must only be reused with the same view and `require_end`.
    pub(crate) fn match_at(&mut self, view: &View<'_>, start: usize, require_end: bool) -> bool {
        if start > view.len() {
            return false;
        }

        let len = view.len();
        let mut stack: Vec<(Choice, usize)> = Vec::new();
        let mut trail: Vec<(usize, usize)> = Vec::new();
        let mut index = 0usize;
        let mut pos = start;

        loop {
            // advance until the pattern completes or a fragment fails
            loop {
                if index == self.fragments.len() {
                    if !require_end || pos == len {
                        return true;
                    }
                    break;
                }

                if self.follows_choice(index) {
                    if self.failed.contains(&(index, pos)) {
                        break;
                    }
                    trail.push((index, pos));
                }

                match &self.fragments[index] {
                    Fragment::Literal(bytes) => {
                        if !view.matches_literal(pos, bytes) {
                            break;
                        }
                        pos += bytes.len();
                    }
                    Fragment::Class(class) => {
                        if pos >= len || !class.contains(view.byte(pos)) {
                            break;
                        }
                        pos += 1;
                    }
                    Fragment::Gap { min, max } => {
                        let remaining = len - pos;
                        if remaining < *min {
                            break;
                        }
                        let max_take = max.map_or(remaining, |m| m.min(remaining));
                        if max_take == remaining && pos + min >= self.floors[index] {
                            break;
                        }
                        stack.push((
                            Choice::Gap {
                                index,
                                base: pos,
                                min: *min,
                                taken: *min,
                                max_take,
                            },
                            trail.len(),
                        ));
                        pos += min;
                    }
                    Fragment::Alternatives(branches) => {
                        match first_branch(view, branches, pos, 0) {
                            Some((branch, end)) => {
                                stack.push((
                                    Choice::Alternative {
                                        index,
                                        offset: pos,
                                        next_branch: branch + 1,
                                    },
                                    trail.len(),
                                ));
                                pos = end;
                            }
                            None => break,
                        }
                    }
                }
                index += 1;
            }

            // backtrack to the most recent choice with an untried option
            loop {
                let Some((choice, mark)) = stack.pop() else {
                    self.failed.extend(trail.drain(..));
                    return false;
                };
                self.failed.extend(trail.drain(mark..));

                match choice {
                    Choice::Gap {
                        index: gap,
                        base,
                        min,
                        taken,
                        max_take,
                    } => {
                        if taken < max_take {
                            let taken = taken + 1;
                            stack.push((
                                Choice::Gap {
                                    index: gap,
                                    base,
                                    min,
                                    taken,
                                    max_take,
                                },
                                trail.len(),
                            ));
                            index = gap + 1;
                            pos = base + taken;
                            break;
                        }
                        if base + max_take == len {
                            self.floors[gap] = self.floors[gap].min(base + min);
                        }
                    }
                    Choice::Alternative {
                        index: alt,
                        offset,
                        next_branch,
                    } => {
                        let fragments = self.fragments;
                        let Fragment::Alternatives(branches) = &fragments[alt] else {
                            continue;
                        };
                        if let Some((branch, end)) = first_branch(view, branches, offset, next_branch)
                        {
                            stack.push((
                                Choice::Alternative {
                                    index: alt,
                                    offset,
                                    next_branch: branch + 1,
                                },
                                trail.len(),
                            ));
                            index = alt + 1;
                            pos = end;
                            break;
                        }
                    }
                }
            }
        }
    }

    #[inline]
    fn follows_choice(&self, index: usize) -> bool {
        index > 0
            && matches!(
                self.fragments[index - 1],
                Fragment::Gap { .. } | Fragment::Alternatives(_)
            )
    }
}

fn first_branch(
    view: &View<'_>,
    branches: &[Vec<Fragment>],
    offset: usize,
    from: usize,
) -> Option<(usize, usize)> {
    branches
        .iter()
        .enumerate()
        .skip(from)
        .find_map(|(i, run)| view.match_fixed(offset, run).map(|end| (i, end)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ByteClass;

    fn gap(min: usize, max: Option<usize>) -> Fragment {
        Fragment::Gap { min, max }
    }

    fn lit(bytes: &[u8]) -> Fragment {
        Fragment::Literal(bytes.to_vec())
    }

    fn forward(fragments: &[Fragment], data: &[u8], require_end: bool) -> bool {
        Backtracker::new(fragments).match_at(&View::new(data, Direction::Forward), 0, require_end)
    }

    #[test]
    fn test_bounded_gap_consumes_min_to_max() {
        let fragments = vec![lit(b"A"), gap(2, Some(4)), lit(b"B")];
        assert!(!forward(&fragments, b"A.B", false));
        assert!(forward(&fragments, b"A..B", false));
        assert!(forward(&fragments, b"A...B", false));
        assert!(forward(&fragments, b"A....B", false));
        assert!(!forward(&fragments, b"A.....B", false));
    }

    #[test]
    fn test_gap_backtracks_to_longer() {
        // the first B is too early for the shortest choice to succeed
        let fragments = vec![lit(b"A"), gap(0, None), lit(b"BC")];
        assert!(forward(&fragments, b"AxxBxxBC", false));
        assert!(!forward(&fragments, b"AxxBxxB", false));
    }

    #[test]
    fn test_require_end() {
        let fragments = vec![lit(b"A"), gap(0, Some(2))];
        assert!(forward(&fragments, b"A..", true));
        assert!(!forward(&fragments, b"A...", true));
        assert!(forward(&fragments, b"A...", false));
    }

    #[test]
    fn test_class_consumes_one_byte() {
        let fragments = vec![Fragment::Class(ByteClass::new(vec![(0x00, 0x1F)], true)), lit(b"!")];
        assert!(forward(&fragments, b"a!", false));
        assert!(!forward(&fragments, b"\x05!", false));
        assert!(!forward(&fragments, b"a", false));
    }

    #[test]
    fn test_alternatives_backtrack() {
        let fragments = vec![
            Fragment::Alternatives(vec![vec![lit(b"AB")], vec![lit(b"A")]]),
            lit(b"BC"),
        ];
        // first branch consumes "AB" and leaves "C", second branch succeeds
        assert!(forward(&fragments, b"ABC", false));
        assert!(!forward(&fragments, b"ACC", false));
    }

    #[test]
    fn test_backward_view() {
        let fragments: Vec<Fragment> = vec![lit(b"ZY"), gap(1, Some(1)), lit(b"X")];
        let view = View::new(b"..X.YZ", Direction::Backward);
        assert!(Backtracker::new(&fragments).match_at(&view, 0, false));
        let view = View::new(b"..X.YZ.", Direction::Backward);
        assert!(!Backtracker::new(&fragments).match_at(&view, 0, false));
    }

    #[test]
    fn test_memo_shared_across_starts() {
        let fragments = vec![lit(b"A"), gap(0, None), lit(b"Z")];
        let data = vec![b'A'; 4096];
        let view = View::new(&data, Direction::Forward);
        let mut matcher = Backtracker::new(&fragments);
        for start in 0..data.len() {
            assert!(!matcher.match_at(&view, start, false));
        }
    }

    #[test]
    fn test_start_past_end() {
        let fragments = vec![gap(0, None)];
        let view = View::new(b"ab", Direction::Forward);
        assert!(Backtracker::new(&fragments).match_at(&view, 2, true));
        assert!(!Backtracker::new(&fragments).match_at(&view, 3, false));
    }
}
