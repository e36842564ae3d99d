//! Literal prefilter for floating patterns.
//!
//! A floating pattern that begins with a literal can only match where that
//! literal occurs. The prefilter gathers the leading literals of every floating
//! pattern in a library into one Aho-Corasick automaton, so a single pass over
//! an entry yields the candidate start offsets of all of them at once.
//!
//! # Usage
//!
//! ```rust
//! use container_sig_engine::compiler::compile_str;
//! use container_sig_engine::matcher::LiteralPrefilter;
//! use container_sig_engine::PrefilterConfig;
//!
//! let patterns = vec![compile_str("'PK' 03 04")?, compile_str("'Word.Document'")?];
//! let prefilter = LiteralPrefilter::from_patterns(&patterns, &PrefilterConfig::default())?
//!     .expect("both patterns start with a literal");
//!
//! let hits = prefilter.scan(b"....Word.Document.8");
//! assert_eq!(hits.offsets(1), Some(&[4][..]));
//! assert_eq!(hits.offsets(0), Some(&[][..]));
//! # Ok::<(), container_sig_engine::SignatureError>(())
//! ```

use crate::config::PrefilterConfig;
use crate::error::{Result, SignatureError};
use crate::ir::{Anchor, CompiledPattern, PatternId};
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use std::collections::HashMap;

/// Shared automaton over the leading literals of floating patterns.
#[derive(Debug, Clone)]
pub struct LiteralPrefilter {
    automaton: AhoCorasick,
    /// Patterns sharing each literal, indexed by automaton pattern id
    literal_to_patterns: Vec<Vec<PatternId>>,
    /// Whether each library pattern is covered, indexed by `PatternId`
    covered: Vec<bool>,
    stats: PrefilterStats,
}

/// Statistics about prefilter construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefilterStats {
    /// Number of distinct literals in the automaton
    pub literal_count: usize,
    /// Number of patterns whose start offsets come from the prefilter
    pub pattern_count: usize,
    /// Floating patterns left to a full scan (no usable leading literal)
    pub unfiltered_count: usize,
    /// Estimated memory usage of the automaton in bytes
    pub memory_usage: usize,
}

/// Start offsets found by one scan, per pattern.
#[derive(Debug, Clone, Default)]
pub struct PrefilterHits {
    offsets: HashMap<PatternId, Vec<usize>>,
}

impl PrefilterHits {
    /// Candidate start offsets of a covered pattern, in ascending order.
    ///
    /// Returns `None` for patterns the prefilter does not cover.
    pub fn offsets(&self, id: PatternId) -> Option<&[usize]> {
        self.offsets.get(&id).map(Vec::as_slice)
    }
}

impl LiteralPrefilter {
    /// Build a prefilter over `patterns`, where each pattern's `PatternId` is
    /// its index. Returns `None` when no pattern qualifies or prefiltering is
    /// disabled.
    pub fn from_patterns(
        patterns: &[CompiledPattern],
        config: &PrefilterConfig,
    ) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        let mut literal_index: HashMap<&[u8], usize> = HashMap::new();
        let mut literals: Vec<&[u8]> = Vec::new();
        let mut literal_to_patterns: Vec<Vec<PatternId>> = Vec::new();
        let mut covered = vec![false; patterns.len()];
        let mut unfiltered_count = 0;

        for (id, pattern) in patterns.iter().enumerate() {
            if pattern.anchor != Anchor::Floating {
                continue;
            }
            let literal = match pattern.leading_literal() {
                Some(literal) if literal.len() >= config.min_literal_length.max(1) => literal,
                _ => {
                    unfiltered_count += 1;
                    continue;
                }
            };

            let slot = *literal_index.entry(literal).or_insert_with(|| {
                literals.push(literal);
                literal_to_patterns.push(Vec::new());
                literals.len() - 1
            });
            literal_to_patterns[slot].push(id as PatternId);
            covered[id] = true;
        }

        if literals.is_empty() {
            return Ok(None);
        }

        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::Standard)
            .build(&literals)
            .map_err(|e| {
                SignatureError::Definition(format!("Failed to build AhoCorasick automaton: {e}"))
            })?;

        let stats = PrefilterStats {
            literal_count: literals.len(),
            pattern_count: covered.iter().filter(|&&c| c).count(),
            unfiltered_count,
            memory_usage: automaton.memory_usage(),
        };

        Ok(Some(Self {
            automaton,
            literal_to_patterns,
            covered,
            stats,
        }))
    }

    /// Whether the prefilter supplies start offsets for this pattern.
    pub fn covers(&self, id: PatternId) -> bool {
        self.covered.get(id as usize).copied().unwrap_or(false)
    }

    /// Find every occurrence of every literal in `haystack`.
    pub fn scan(&self, haystack: &[u8]) -> PrefilterHits {
        let mut offsets: HashMap<PatternId, Vec<usize>> = HashMap::new();
        for (id, &covered) in self.covered.iter().enumerate() {
            if covered {
                offsets.insert(id as PatternId, Vec::new());
            }
        }

        for mat in self.automaton.find_overlapping_iter(haystack) {
            if let Some(pattern_ids) = self.literal_to_patterns.get(mat.pattern().as_usize()) {
                for id in pattern_ids {
                    if let Some(list) = offsets.get_mut(id) {
                        list.push(mat.start());
                    }
                }
            }
        }

        // overlapping matches arrive ordered by end offset
        for list in offsets.values_mut() {
            list.sort_unstable();
            list.dedup();
        }

        PrefilterHits { offsets }
    }

    /// Get prefilter statistics.
    pub fn stats(&self) -> &PrefilterStats {
        &self.stats
    }
}
