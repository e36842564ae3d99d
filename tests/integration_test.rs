//! Integration tests for the two-pass match orchestration.
//!
//! These tests drive [`ContainerIdentifier`] with in-memory containers to pin
//! down verdict semantics: order independence, lazy opening, absent entries,
//! wildcard paths, repeated names and failure handling.

mod common;

use common::{permutations, CountingContainer};
use container_sig_engine::container::{Container, ContainerEntry, ContainerType, MemoryContainer};
use container_sig_engine::{
    ContainerIdentifier, EngineConfig, Result, SignatureError, SignatureLibrary,
};
use std::io::{self, Read};
use std::time::Duration;

const OFFICE: &str = r#"
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
      - path: WordDocument
      - path: CompObj
        binary_signatures: ["'Word.Document.6'"]
  - id: 3
    container: ole2
    files:
      - path: Workbook
  - id: 4
    container: ole2
    files:
      - path: WordDocument
      - path: "1Table"
        binary_signatures: ["^ 00 00"]
      - path: EncryptionInfo
        presence: absent
  - id: 5
    container: ole2
    files:
      - path: PowerPoint Document
      - path: Macros
        presence: absent
        binary_signatures: ["'Attribute VB_Name'"]
"#;

fn library(yaml: &str) -> SignatureLibrary {
    SignatureLibrary::from_yaml(yaml).unwrap()
}

fn container(entries: &[(&str, &[u8])]) -> MemoryContainer {
    entries
        .iter()
        .fold(MemoryContainer::new(ContainerType::Ole2), |c, (name, data)| {
            c.with_entry(*name, data.to_vec())
        })
}

fn matched(identifier: &ContainerIdentifier, entries: &[(&str, &[u8])]) -> Vec<u32> {
    identifier
        .identify(&mut container(entries))
        .unwrap()
        .matched
}

#[test]
fn test_word_document_scenarios() {
    let identifier = ContainerIdentifier::new(library(OFFICE));

    assert_eq!(
        matched(
            &identifier,
            &[("WordDocument", b""), ("CompObj", b"\x01\x00Word.Document.8\x00")]
        ),
        vec![1]
    );
    assert_eq!(
        matched(
            &identifier,
            &[("WordDocument", b""), ("CompObj", b"\x01\x00Word.Document.6\x00")]
        ),
        vec![2]
    );
    // CompObj alone is not enough
    assert!(matched(&identifier, &[("CompObj", b"Word.Document.8")]).is_empty());
    // WordDocument alone is not enough for the CompObj-based signatures
    assert!(matched(&identifier, &[("WordDocument", b"")]).is_empty());
}

#[test]
fn test_verdict_independent_of_entry_order() {
    let identifier = ContainerIdentifier::new(library(OFFICE));
    let entries: &[(&str, &[u8])] = &[
        ("WordDocument", b"\xec\xa5"),
        ("CompObj", b"Word.Document.8"),
        ("1Table", b"\x00\x00\x01"),
        ("Workbook", b""),
        ("Macros", b"Sub AutoOpen()"),
    ];

    let expected = matched(&identifier, entries);
    assert_eq!(expected, vec![1, 3, 4]);
    for ordering in permutations(entries) {
        assert_eq!(matched(&identifier, &ordering), expected, "{:?}", ordering);
    }
}

#[test]
fn test_verdict_independent_of_candidate_order() {
    let reversed = r#"
signatures:
  - id: 5
    container: ole2
    files:
      - path: Macros
        presence: absent
        binary_signatures: ["'Attribute VB_Name'"]
      - path: PowerPoint Document
  - id: 1
    container: ole2
    files:
      - path: CompObj
        binary_signatures: ["'Word.Document.8'"]
      - path: WordDocument
"#;
    let entries: &[(&str, &[u8])] = &[
        ("Macros", b"Attribute VB_Name = \"Module1\""),
        ("PowerPoint Document", b""),
        ("WordDocument", b""),
        ("CompObj", b"Word.Document.8"),
    ];
    let forward = ContainerIdentifier::new(library(OFFICE));
    let backward = ContainerIdentifier::new(library(reversed));
    assert_eq!(matched(&forward, entries), vec![1]);
    assert_eq!(matched(&backward, entries), vec![1]);
}

#[test]
fn test_no_entry_opened_without_live_binary_requirement() {
    let identifier = ContainerIdentifier::new(library(OFFICE));

    // only name-only candidates can match; nothing is opened
    let mut workbook = CountingContainer::new(container(&[
        ("Workbook", b"BIFF"),
        ("CompObj", b"Excel.Sheet.8"),
    ]));
    let result = identifier.identify(&mut workbook).unwrap();
    assert_eq!(result.matched, vec![3]);
    assert!(workbook.opened().is_empty());

    // CompObj is needed, Workbook and SummaryInformation are not
    let mut word = CountingContainer::new(container(&[
        ("Workbook", b"BIFF"),
        ("WordDocument", b""),
        ("CompObj", b"Word.Document.8"),
        ("SummaryInformation", b""),
    ]));
    identifier.identify(&mut word).unwrap();
    assert_eq!(word.opened(), &["CompObj".to_string()]);
}

#[test]
fn test_each_entry_opened_once() {
    let identifier = ContainerIdentifier::new(library(OFFICE));
    let mut word = CountingContainer::new(container(&[
        ("WordDocument", b""),
        ("CompObj", b"Word.Document.8"),
    ]));
    let result = identifier.identify(&mut word).unwrap();
    // candidates 1 and 2 both needed CompObj
    assert_eq!(word.opened(), &["CompObj".to_string()]);
    assert_eq!(result.stats.candidates_evaluated, 2);
}

#[test]
fn test_absent_entries() {
    let identifier = ContainerIdentifier::new(library(OFFICE));
    let base: &[(&str, &[u8])] = &[
        ("WordDocument", b""),
        ("1Table", b"\x00\x00"),
        ("PowerPoint Document", b""),
    ];
    assert_eq!(matched(&identifier, base), vec![4, 5]);

    // presence alone rejects when no patterns are declared
    let mut encrypted = base.to_vec();
    encrypted.push(("EncryptionInfo", b""));
    assert_eq!(matched(&identifier, &encrypted), vec![5]);

    // with patterns, only a matching absent entry rejects
    let mut harmless = base.to_vec();
    harmless.push(("Macros", b"nothing to see"));
    assert_eq!(matched(&identifier, &harmless), vec![4, 5]);

    let mut macros = base.to_vec();
    macros.push(("Macros", b"Attribute VB_Name = \"Module1\""));
    assert_eq!(matched(&identifier, &macros), vec![4]);
}

#[test]
fn test_repeated_entry_names() {
    let identifier = ContainerIdentifier::new(library(OFFICE));
    // every CompObj occurrence must satisfy the exact path
    assert!(matched(
        &identifier,
        &[
            ("WordDocument", b""),
            ("CompObj", b"Word.Document.8"),
            ("CompObj", b"something else"),
        ]
    )
    .is_empty());
    assert_eq!(
        matched(
            &identifier,
            &[
                ("WordDocument", b""),
                ("CompObj", b"Word.Document.8"),
                ("CompObj", b"xxWord.Document.8"),
            ]
        ),
        vec![1]
    );
}

const WILDCARDS: &str = r#"
signatures:
  - id: 10
    container: zip
    files:
      - path: "word/*.xml"
        binary_signatures: ["'w:document'"]
  - id: 11
    container: zip
    files:
      - path: "{containerFileName}.xml"
  - id: 12
    container: zip
    files:
      - path: "**/manifest.{xml,rdf}"
"#;

#[test]
fn test_wildcard_paths() {
    let identifier = ContainerIdentifier::new(library(WILDCARDS));
    let mut archive = MemoryContainer::new(ContainerType::Zip)
        .with_name("Report.v2.zip")
        .with_entry("word/styles.xml", b"<w:styles/>".to_vec())
        .with_entry("word/document.xml", b"<w:document/>".to_vec())
        .with_entry("Report.v2.xml", Vec::new())
        .with_entry("META-INF/manifest.rdf", Vec::new());
    assert_eq!(identifier.identify(&mut archive).unwrap().matched, vec![10, 11, 12]);

    // no matching member content, no container name
    let mut other = MemoryContainer::new(ContainerType::Zip)
        .with_entry("word/styles.xml", b"<w:styles/>".to_vec())
        .with_entry("word/", Vec::new());
    assert!(!identifier.identify(&mut other).unwrap().is_match());
}

#[test]
fn test_wildcard_stops_opening_once_satisfied() {
    let identifier = ContainerIdentifier::new(library(WILDCARDS));
    let mut archive = CountingContainer::new(
        MemoryContainer::new(ContainerType::Zip)
            .with_entry("word/document.xml", b"<w:document/>".to_vec())
            .with_entry("word/styles.xml", b"<w:styles/>".to_vec()),
    );
    assert_eq!(identifier.identify(&mut archive).unwrap().matched, vec![10]);
    assert_eq!(archive.opened(), &["word/document.xml".to_string()]);
}

struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream truncated"))
    }
}

/// Entries named in `broken` fail on read.
struct PartlyBroken {
    inner: MemoryContainer,
    broken: Vec<&'static str>,
}

impl Container for PartlyBroken {
    fn container_type(&self) -> ContainerType {
        self.inner.container_type()
    }

    fn entries(&mut self) -> Result<Vec<ContainerEntry>> {
        self.inner.entries()
    }

    fn open<'a>(&'a mut self, entry: &ContainerEntry) -> Result<Box<dyn Read + 'a>> {
        if self.broken.contains(&entry.name.as_str()) {
            return Ok(Box::new(FailingReader));
        }
        self.inner.open(entry)
    }
}

#[test]
fn test_unreadable_entry_is_a_warning() {
    let identifier = ContainerIdentifier::new(library(OFFICE));
    let mut broken = PartlyBroken {
        inner: container(&[
            ("WordDocument", b""),
            ("CompObj", b"Word.Document.8"),
            ("Workbook", b""),
        ]),
        broken: vec!["CompObj"],
    };
    let result = identifier.identify(&mut broken).unwrap();
    assert_eq!(result.matched, vec![3]);
    assert!(!result.is_complete());
    assert_eq!(result.warnings[0].entry, "CompObj");
    assert_eq!(result.warnings[0].rejected, vec![1, 2]);
    assert!(matches!(
        result.warnings[0].error,
        SignatureError::EntryRead { .. }
    ));
}

#[test]
fn test_unreadable_wildcard_member_does_not_decide_alone() {
    let identifier = ContainerIdentifier::new(library(WILDCARDS));
    // the only satisfying member could not be read
    for (broken, expected) in [("word/a.xml", vec![10]), ("word/b.xml", vec![])] {
        let mut archive = PartlyBroken {
            inner: MemoryContainer::new(ContainerType::Zip)
                .with_entry("word/a.xml", b"<w:styles/>".to_vec())
                .with_entry("word/b.xml", b"<w:document/>".to_vec()),
            broken: vec![broken],
        };
        let result = identifier.identify(&mut archive).unwrap();
        assert_eq!(result.matched, expected, "with {} unreadable", broken);
        assert_eq!(result.warnings.len(), 1);
    }
}

#[test]
fn test_unknown_entry_from_adapter() {
    struct Vanishing(MemoryContainer);

    impl Container for Vanishing {
        fn container_type(&self) -> ContainerType {
            ContainerType::Ole2
        }

        fn entries(&mut self) -> Result<Vec<ContainerEntry>> {
            self.0.entries()
        }

        fn open<'a>(&'a mut self, entry: &ContainerEntry) -> Result<Box<dyn Read + 'a>> {
            Err(SignatureError::EntryNotFound(entry.name.clone()))
        }
    }

    let identifier = ContainerIdentifier::new(library(OFFICE));
    let mut container = Vanishing(container(&[("WordDocument", b""), ("CompObj", b"")]));
    let result = identifier.identify(&mut container).unwrap();
    assert!(!result.is_match());
    assert!(matches!(
        result.warnings[0].error,
        SignatureError::EntryNotFound(_)
    ));
}

#[test]
fn test_scan_limit_applies_to_entries() {
    let mut compobj = vec![0u8; 8192];
    compobj[6000..6015].copy_from_slice(b"Word.Document.8");
    let entries: &[(&str, &[u8])] = &[("WordDocument", b""), ("CompObj", &compobj)];

    let unlimited = ContainerIdentifier::with_config(library(OFFICE), EngineConfig::thorough());
    assert_eq!(matched(&unlimited, entries), vec![1]);

    let bounded = ContainerIdentifier::with_config(
        library(OFFICE),
        EngineConfig::default().with_max_bytes_to_scan(4096),
    );
    assert!(matched(&bounded, entries).is_empty());
}

#[test]
fn test_prefilter_does_not_change_verdicts() {
    let entries: &[(&str, &[u8])] = &[
        ("WordDocument", b""),
        ("CompObj", b"..Word.Document.6..Word.Document.8"),
    ];
    let with = ContainerIdentifier::with_config(
        library(OFFICE),
        EngineConfig::default().with_prefilter(true),
    );
    let without = ContainerIdentifier::with_config(
        library(OFFICE),
        EngineConfig::default().with_prefilter(false),
    );
    // both CompObj signatures hit; neither is exclusive
    assert_eq!(matched(&with, entries), vec![1, 2]);
    assert_eq!(matched(&with, entries), matched(&without, entries));
}

#[test]
fn test_timeout_is_reported() {
    let identifier = ContainerIdentifier::with_config(
        library(OFFICE),
        EngineConfig::default().with_timeout(Duration::ZERO),
    );
    let result = identifier.identify(&mut container(&[
        ("WordDocument", b""),
        ("CompObj", b"Word.Document.8"),
    ]));
    assert_eq!(result, Err(SignatureError::Timeout));
}

#[test]
fn test_identifier_is_shared_across_threads() {
    let identifier = ContainerIdentifier::new(library(OFFICE));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let identifier = identifier.clone();
            std::thread::spawn(move || {
                matched(
                    &identifier,
                    &[("WordDocument", b""), ("CompObj", b"Word.Document.8")],
                )
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), vec![1]);
    }
}
