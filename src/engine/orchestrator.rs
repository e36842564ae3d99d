//! Two-pass evaluation of a container against a signature library.
//!
//! 1. **Name pass**: every entry name is shown to every candidate declared for
//!    the container type. Candidates missing a required file, or holding a
//!    file declared absent, are rejected before any entry is opened.
//! 2. **Binary pass**: each entry still needed by a live candidate is opened
//!    once, every candidate needing it is evaluated off that one source, and
//!    the source is released before the next entry is opened.
//!
//! The verdict does not depend on the order of entries or of candidates.

use super::result::{EntryWarning, IdentificationResult, PassStatistics};
use super::state::{EntryContent, EntryMatchState, MatchPhase, RejectReason};
use crate::config::MatchConfig;
use crate::container::{Container, ContainerEntry};
use crate::error::{Result, SignatureError};
use crate::ir::SignatureId;
use crate::matcher::StreamSource;
use crate::signature::SignatureLibrary;
use std::time::Instant;
use tracing::{debug, warn};

/// Evaluates containers against one library.
pub struct MatchOrchestrator<'l> {
    library: &'l SignatureLibrary,
    config: &'l MatchConfig,
    deadline: Option<Instant>,
}

impl<'l> MatchOrchestrator<'l> {
    pub fn new(library: &'l SignatureLibrary, config: &'l MatchConfig) -> Self {
        Self {
            library,
            config,
            deadline: None,
        }
    }

    /// Give up with `SignatureError::Timeout` once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn identify(&self, container: &mut dyn Container) -> Result<IdentificationResult> {
        let container_type = container.container_type();
        let container_name = container.name().map(str::to_string);
        let entries = container.entries()?;

        let signatures = self.library.signatures();
        let mut states: Vec<EntryMatchState<'l>> = self
            .library
            .candidate_indices(container_type)
            .iter()
            .map(|&i| EntryMatchState::new(&signatures[i], container_name.as_deref()))
            .collect();

        let mut stats = PassStatistics {
            entries_seen: entries.len(),
            candidates: states.len(),
            ..PassStatistics::default()
        };

        // name pass
        let mut needed_by: Vec<Vec<usize>> = vec![Vec::new(); entries.len()];
        for (entry, needers) in entries.iter().zip(needed_by.iter_mut()) {
            for (index, state) in states.iter_mut().enumerate() {
                if state.observe_entry_name(&entry.name) {
                    needers.push(index);
                }
            }
        }
        for state in &mut states {
            state.finish_name_pass();
            if matches!(state.phase(), MatchPhase::Rejected(_)) {
                stats.candidates_pruned_by_name += 1;
            }
        }

        // binary pass
        let mut warnings = Vec::new();
        for (entry, needers) in entries.iter().zip(&needed_by) {
            if needers.is_empty() {
                continue;
            }
            self.check_deadline()?;

            let live: Vec<usize> = needers
                .iter()
                .copied()
                .filter(|&i| states[i].needs_binary_match(&entry.name))
                .collect();
            if live.is_empty() {
                continue;
            }

            stats.entries_opened += 1;
            if let Err(error) = self.evaluate_entry(container, entry, &live, &mut states, &mut stats)
            {
                let affected: Vec<SignatureId> =
                    live.iter().map(|&i| states[i].candidate().id).collect();
                let rejected: Vec<SignatureId> = live
                    .iter()
                    .filter(|&&i| {
                        states[i].phase() == MatchPhase::Rejected(RejectReason::Unreadable)
                    })
                    .map(|&i| states[i].candidate().id)
                    .collect();
                warn!(
                    entry = %entry.name,
                    error = %error,
                    affected = affected.len(),
                    rejected = rejected.len(),
                    "Entry could not be evaluated"
                );
                warnings.push(EntryWarning {
                    entry: entry.name.clone(),
                    error,
                    affected,
                    rejected,
                });
            }
        }

        let matched: Vec<SignatureId> = states
            .iter_mut()
            .filter_map(|state| (state.finish() == MatchPhase::Matched).then(|| state.candidate().id))
            .collect();

        let mut puids: Vec<String> = Vec::new();
        for &id in &matched {
            for puid in self.library.puids(id) {
                if !puids.contains(puid) {
                    puids.push(puid.clone());
                }
            }
        }

        debug!(
            container = %container_type,
            entries_seen = stats.entries_seen,
            entries_opened = stats.entries_opened,
            candidates = stats.candidates,
            pruned_by_name = stats.candidates_pruned_by_name,
            patterns_evaluated = stats.patterns_evaluated,
            matched = matched.len(),
            "Identified container"
        );

        Ok(IdentificationResult {
            container: container_type,
            matched,
            puids,
            warnings,
            stats,
        })
    }

    /// Open one entry and evaluate every live candidate that needs it.
    ///
    /// The entry's reader and buffer are dropped when this returns.
    fn evaluate_entry(
        &self,
        container: &mut dyn Container,
        entry: &ContainerEntry,
        live: &[usize],
        states: &mut [EntryMatchState<'l>],
        stats: &mut PassStatistics,
    ) -> Result<()> {
        let reader = match container.open(entry) {
            Ok(reader) => reader,
            Err(error) => {
                for &i in live {
                    states[i].observe_unreadable(&entry.name);
                }
                return Err(error);
            }
        };

        let mut source = StreamSource::new(reader, self.config.scan_limit());
        let mut first_error: Option<SignatureError> = None;
        let patterns_evaluated;
        {
            let mut content = EntryContent::new(&entry.name, &mut source, self.library)
                .with_prefilter(self.config.use_prefilter);
            for &i in live {
                stats.candidates_evaluated += 1;
                if let Err(error) = states[i].observe_binary_content(&entry.name, &mut content) {
                    first_error.get_or_insert(error);
                }
            }
            patterns_evaluated = content.patterns_evaluated();
        }
        stats.patterns_evaluated += patterns_evaluated;
        stats.bytes_read += source.bytes_read();

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(SignatureError::Timeout),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerType, MemoryContainer};
    use std::io::{self, Read};

    const DEFS: &str = r#"
signatures:
  - id: 1
    container: ole2
    files:
      - path: WordDocument
      - path: CompObj
        binary_signatures: ["'Word.Document.8'"]
  - id: 2
    container: ole2
    files:
      - path: Workbook
  - id: 3
    container: ole2
    files:
      - path: CompObj
        binary_signatures: ["'Excel.Sheet'"]
formats:
  - signature_id: 1
    puid: fmt/40
"#;

    fn word_document() -> MemoryContainer {
        MemoryContainer::new(ContainerType::Ole2)
            .with_entry("WordDocument", vec![0xEC, 0xA5, 0xC1, 0x00])
            .with_entry("CompObj", b"\x01\x00\xfe\xffWord.Document.8\x00".to_vec())
    }

    #[test]
    fn test_two_pass_identification() {
        let library = SignatureLibrary::from_yaml(DEFS).unwrap();
        let config = MatchConfig::default();
        let result = MatchOrchestrator::new(&library, &config)
            .identify(&mut word_document())
            .unwrap();

        assert_eq!(result.matched, vec![1]);
        assert_eq!(result.puids, vec!["fmt/40".to_string()]);
        assert!(result.is_complete());
        assert_eq!(result.stats.entries_seen, 2);
        assert_eq!(result.stats.entries_opened, 1);
        assert_eq!(result.stats.candidates, 3);
        assert_eq!(result.stats.candidates_pruned_by_name, 1);
        // both candidates needing CompObj share one open
        assert_eq!(result.stats.candidates_evaluated, 2);
    }

    #[test]
    fn test_other_container_types_are_ignored() {
        let library = SignatureLibrary::from_yaml(DEFS).unwrap();
        let config = MatchConfig::default();
        let mut container = MemoryContainer::new(ContainerType::Zip).with_entry("Workbook", Vec::new());
        let result = MatchOrchestrator::new(&library, &config)
            .identify(&mut container)
            .unwrap();
        assert!(!result.is_match());
        assert_eq!(result.stats.candidates, 0);
    }

    #[test]
    fn test_expired_deadline() {
        let library = SignatureLibrary::from_yaml(DEFS).unwrap();
        let config = MatchConfig::default();
        let result = MatchOrchestrator::new(&library, &config)
            .with_deadline(Some(Instant::now()))
            .identify(&mut word_document());
        assert_eq!(result, Err(SignatureError::Timeout));
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::InvalidData, "bad sector"))
        }
    }

    /// `CompObj` fails to read; every other entry is served from memory.
    struct BrokenEntries(MemoryContainer);

    impl Container for BrokenEntries {
        fn container_type(&self) -> ContainerType {
            self.0.container_type()
        }

        fn entries(&mut self) -> Result<Vec<ContainerEntry>> {
            self.0.entries()
        }

        fn open<'a>(&'a mut self, entry: &ContainerEntry) -> Result<Box<dyn Read + 'a>> {
            if entry.name == "CompObj" {
                Ok(Box::new(FailingReader))
            } else {
                self.0.open(entry)
            }
        }
    }

    #[test]
    fn test_unreadable_entry_fails_closed() {
        let library = SignatureLibrary::from_yaml(DEFS).unwrap();
        let config = MatchConfig::default();
        let mut container = BrokenEntries(word_document().with_entry("Workbook", Vec::new()));
        let result = MatchOrchestrator::new(&library, &config)
            .identify(&mut container)
            .unwrap();

        // the name-only candidate is unaffected
        assert_eq!(result.matched, vec![2]);
        assert_eq!(result.warnings.len(), 1);
        let warning = &result.warnings[0];
        assert_eq!(warning.entry, "CompObj");
        assert_eq!(warning.affected, vec![1, 3]);
        assert_eq!(warning.rejected, vec![1, 3]);
        assert!(matches!(warning.error, SignatureError::EntryRead { .. }));
    }
}
