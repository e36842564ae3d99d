//! Identification results.

use crate::container::ContainerType;
use crate::error::SignatureError;
use crate::ir::SignatureId;

/// Outcome of identifying one container.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentificationResult {
    pub container: ContainerType,
    /// Matched signature ids, ascending.
    pub matched: Vec<SignatureId>,
    /// Format identifiers of the matched signatures, without duplicates.
    pub puids: Vec<String>,
    /// Entries that could not be evaluated.
    pub warnings: Vec<EntryWarning>,
    pub stats: PassStatistics,
}

impl IdentificationResult {
    pub fn is_match(&self) -> bool {
        !self.matched.is_empty()
    }

    /// Whether every needed entry was evaluated.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// An entry whose evaluation failed.
///
/// Identification continues with the remaining entries; the candidates that
/// needed this entry fail closed.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryWarning {
    pub entry: String,
    pub error: SignatureError,
    /// Candidates that needed the entry.
    pub affected: Vec<SignatureId>,
    /// Affected candidates rejected because of the failure.
    pub rejected: Vec<SignatureId>,
}

/// Work done by the two passes over one container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStatistics {
    pub entries_seen: usize,
    pub entries_opened: usize,
    pub candidates: usize,
    /// Candidates rejected by the name pass alone.
    pub candidates_pruned_by_name: usize,
    /// Candidate evaluations against opened entries.
    pub candidates_evaluated: usize,
    /// Distinct patterns run, summed over opened entries.
    pub patterns_evaluated: usize,
    pub bytes_read: u64,
}
