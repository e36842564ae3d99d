//! Per-candidate match state across the entries of one container.
//!
//! Each candidate signature gets an [`EntryMatchState`] when identification of
//! a container begins. The state records what the name pass observed and what
//! the binary pass decided, and yields the final verdict. States never outlive
//! the identification that created them.

use crate::compiler::Presence;
use crate::error::{Result, SignatureError};
use crate::ir::PatternId;
use crate::matcher::{BoundPath, ByteSource, PrefilterHits};
use crate::signature::{CandidateSignature, FileRequirement, SignatureLibrary};
use std::collections::HashMap;
use tracing::trace;

/// Progress of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// No declared file has been seen yet.
    Pending,
    /// Some declared files were seen; the verdict is still open.
    PartiallySatisfied,
    Matched,
    Rejected(RejectReason),
}

impl MatchPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchPhase::Matched | MatchPhase::Rejected(_))
    }
}

/// Why a candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A required file never appeared.
    MissingEntry,
    /// A required file's content did not match.
    BinaryMismatch,
    /// A file declared absent was present (and matched, when it has patterns).
    AbsentEntryPresent,
    /// An entry the candidate needed could not be read.
    Unreadable,
}

#[derive(Debug)]
struct FileState {
    bound: BoundPath,
    /// Entries whose name matched the path.
    seen: usize,
    /// Matching entries whose content satisfied the file.
    passed: usize,
    /// A matching entry could not be read.
    unreadable: bool,
}

impl FileState {
    /// Whether content of further matching entries can still change the verdict.
    fn wants_content(&self, requirement: &FileRequirement) -> bool {
        if !requirement.has_binary() {
            return false;
        }
        match requirement.presence {
            // existential: one satisfying entry settles it
            Presence::Required if self.bound.is_wildcard() => self.passed == 0,
            Presence::Required | Presence::Absent => true,
        }
    }
}

/// Match state of one candidate against one container.
#[derive(Debug)]
pub struct EntryMatchState<'l> {
    candidate: &'l CandidateSignature,
    files: Vec<FileState>,
    phase: MatchPhase,
}

impl<'l> EntryMatchState<'l> {
    pub fn new(candidate: &'l CandidateSignature, container_name: Option<&str>) -> Self {
        let files = candidate
            .files
            .iter()
            .map(|file| FileState {
                bound: file.path.bind(container_name),
                seen: 0,
                passed: 0,
                unreadable: false,
            })
            .collect();

        Self {
            candidate,
            files,
            phase: MatchPhase::Pending,
        }
    }

    pub fn candidate(&self) -> &'l CandidateSignature {
        self.candidate
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        !self.phase.is_terminal()
    }

    /// Record an entry name. Returns whether the entry's content is needed.
    pub fn observe_entry_name(&mut self, name: &str) -> bool {
        if !self.is_live() {
            return false;
        }

        let mut needs_binary = false;
        for (file, requirement) in self.files.iter_mut().zip(&self.candidate.files) {
            if !file.bound.matches(name) {
                continue;
            }
            file.seen += 1;
            if requirement.presence == Presence::Absent && !requirement.has_binary() {
                self.phase = MatchPhase::Rejected(RejectReason::AbsentEntryPresent);
                return false;
            }
            needs_binary |= requirement.has_binary();
        }

        if self.phase == MatchPhase::Pending && self.files.iter().any(|f| f.seen > 0) {
            self.phase = MatchPhase::PartiallySatisfied;
        }
        needs_binary
    }

    /// Settle what the names alone decide. Returns whether binary work remains.
    pub fn finish_name_pass(&mut self) -> bool {
        if !self.is_live() {
            return false;
        }

        let missing = self
            .files
            .iter()
            .zip(&self.candidate.files)
            .any(|(file, requirement)| requirement.presence == Presence::Required && file.seen == 0);
        if missing {
            self.phase = MatchPhase::Rejected(RejectReason::MissingEntry);
            return false;
        }

        let needs_binary = self
            .files
            .iter()
            .zip(&self.candidate.files)
            .any(|(file, requirement)| file.seen > 0 && requirement.has_binary());
        if !needs_binary {
            self.phase = MatchPhase::Matched;
        }
        needs_binary
    }

    /// Whether this entry's content is still needed.
    pub fn needs_binary_match(&self, name: &str) -> bool {
        self.is_live()
            && self
                .files
                .iter()
                .zip(&self.candidate.files)
                .any(|(file, requirement)| {
                    file.bound.matches(name) && file.wants_content(requirement)
                })
    }

    /// Evaluate the patterns declared for the entry against its content.
    ///
    /// A read failure is applied as by [`observe_unreadable`](Self::observe_unreadable)
    /// and then returned to the caller.
    pub fn observe_binary_content(&mut self, name: &str, content: &mut EntryContent<'_>) -> Result<()> {
        if !self.is_live() {
            return Ok(());
        }

        let candidate = self.candidate;
        for index in 0..self.files.len() {
            let requirement = &candidate.files[index];
            let file = &self.files[index];
            if !file.bound.matches(name) || !file.wants_content(requirement) {
                continue;
            }

            let outcome = any_binary_matches(requirement, content);
            let wildcard = file.bound.is_wildcard();
            let file = &mut self.files[index];

            match (outcome, requirement.presence) {
                (Ok(true), Presence::Required) => file.passed += 1,
                (Ok(false), Presence::Required) => {
                    if !wildcard {
                        self.reject(RejectReason::BinaryMismatch);
                        return Ok(());
                    }
                }
                (Ok(true), Presence::Absent) => {
                    self.reject(RejectReason::AbsentEntryPresent);
                    return Ok(());
                }
                (Ok(false), Presence::Absent) => {}
                (Err(err), _) => {
                    self.observe_unreadable(name);
                    return Err(err);
                }
            }
        }

        trace!(
            signature_id = self.candidate.id,
            entry = name,
            phase = ?self.phase,
            "Evaluated entry content"
        );
        Ok(())
    }

    /// Record that an entry this candidate needed could not be read.
    ///
    /// Files that needed every matching entry (exact required paths and absent
    /// paths) reject the candidate. A wildcard path only notes the failure and
    /// is rejected at the end if no other matching entry satisfied it.
    pub fn observe_unreadable(&mut self, name: &str) {
        if !self.is_live() {
            return;
        }

        let mut reject = false;
        for (file, requirement) in self.files.iter_mut().zip(&self.candidate.files) {
            if !file.bound.matches(name) || !file.wants_content(requirement) {
                continue;
            }
            file.unreadable = true;
            reject |= requirement.presence == Presence::Absent || !file.bound.is_wildcard();
        }
        if reject {
            self.phase = MatchPhase::Rejected(RejectReason::Unreadable);
        }
    }

    pub fn reject(&mut self, reason: RejectReason) {
        if self.is_live() {
            self.phase = MatchPhase::Rejected(reason);
        }
    }

    /// Final verdict once every needed entry was evaluated.
    pub fn finish(&mut self) -> MatchPhase {
        if !self.is_live() {
            return self.phase;
        }

        let mut reason = None;
        for (file, requirement) in self.files.iter().zip(&self.candidate.files) {
            if requirement.presence == Presence::Absent || !requirement.has_binary() {
                continue;
            }
            let satisfied = if file.bound.is_wildcard() {
                file.passed > 0
            } else {
                file.seen > 0 && file.passed == file.seen
            };
            if !satisfied {
                reason = Some(if file.unreadable {
                    RejectReason::Unreadable
                } else {
                    RejectReason::BinaryMismatch
                });
                break;
            }
        }

        self.phase = match reason {
            Some(reason) => MatchPhase::Rejected(reason),
            None if self.files.iter().zip(&self.candidate.files).any(|(file, requirement)| {
                requirement.presence == Presence::Required && file.seen == 0
            }) =>
            {
                MatchPhase::Rejected(RejectReason::MissingEntry)
            }
            None => MatchPhase::Matched,
        };
        self.phase
    }
}

fn any_binary_matches(requirement: &FileRequirement, content: &mut EntryContent<'_>) -> Result<bool> {
    for binary in &requirement.binary {
        let mut all = true;
        for &pattern in &binary.patterns {
            if !content.evaluate(pattern)? {
                all = false;
                break;
            }
        }
        if all {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Shared view of one open entry for every candidate that needs it.
///
/// Pattern results are memoized, so a pattern shared by several candidates is
/// evaluated once per entry. Prefilter hits are computed on first use.
pub struct EntryContent<'a> {
    entry: &'a str,
    source: &'a mut dyn ByteSource,
    library: &'a SignatureLibrary,
    results: HashMap<PatternId, bool>,
    hits: Option<PrefilterHits>,
    use_prefilter: bool,
    evaluated: usize,
}

impl<'a> EntryContent<'a> {
    pub fn new(entry: &'a str, source: &'a mut dyn ByteSource, library: &'a SignatureLibrary) -> Self {
        Self {
            entry,
            source,
            library,
            results: HashMap::new(),
            hits: None,
            use_prefilter: true,
            evaluated: 0,
        }
    }

    /// Whether floating patterns are tried only at prefilter hits (the default).
    pub fn with_prefilter(mut self, enabled: bool) -> Self {
        self.use_prefilter = enabled;
        self
    }

    /// Number of distinct patterns actually run against the entry.
    pub fn patterns_evaluated(&self) -> usize {
        self.evaluated
    }

    pub fn evaluate(&mut self, id: PatternId) -> Result<bool> {
        if let Some(&matched) = self.results.get(&id) {
            return Ok(matched);
        }

        let pattern = self.library.pattern(id).ok_or_else(|| {
            SignatureError::Definition(format!("unknown pattern id {}", id))
        })?;

        let prefilter = self
            .library
            .prefilter()
            .filter(|p| self.use_prefilter && p.covers(id));
        if let Some(prefilter) = prefilter {
            if self.hits.is_none() {
                let data = self
                    .source
                    .contents()
                    .map_err(|e| SignatureError::entry_read(self.entry, e))?;
                self.hits = Some(prefilter.scan(data));
            }
        }
        let offsets = match prefilter {
            Some(_) => self.hits.as_ref().and_then(|hits| hits.offsets(id)),
            None => None,
        };

        let matched = pattern
            .matches_with_offsets(&mut *self.source, offsets)
            .map_err(|e| SignatureError::entry_read(self.entry, e))?;

        self.evaluated += 1;
        self.results.insert(id, matched);
        trace!(entry = self.entry, pattern = id, matched, "Evaluated pattern");
        Ok(matched)
    }
}
