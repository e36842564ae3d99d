//! # Container Signature Engine
//!
//! A Rust library for identifying file formats that live inside containers:
//! OLE2 compound documents, ZIP archives and GZIP streams. A format is
//! recognized by which entries the container holds and by binary patterns
//! found in the content of those entries.
//!
//! Signatures are compiled once into an immutable [`SignatureLibrary`] and
//! shared across threads. Each container is then evaluated in two passes:
//! first over entry names only, then over the content of the entries that
//! surviving candidates still need. Each entry is opened at most once.
//!
//! ## Quick Start
//!
//! ### Basic Usage
//!
//! ```rust
//! use container_sig_engine::container::{ContainerType, MemoryContainer};
//! use container_sig_engine::{Compiler, ContainerIdentifier};
//!
//! let mut compiler = Compiler::new();
//! compiler.compile_yaml(r#"
//! signatures:
//!   - id: 1030
//!     container: ole2
//!     description: Microsoft Word 97-2003
//!     files:
//!       - path: WordDocument
//!       - path: CompObj
//!         binary_signatures:
//!           - "'Word.Document.8'"
//! formats:
//!   - signature_id: 1030
//!     puid: fmt/40
//! "#)?;
//!
//! let identifier = ContainerIdentifier::new(compiler.into_library()?);
//!
//! let mut container = MemoryContainer::new(ContainerType::Ole2)
//!     .with_entry("WordDocument", vec![0xEC, 0xA5, 0xC1, 0x00])
//!     .with_entry("CompObj", b"\x01\x00\xfe\xffWord.Document.8\x00".to_vec());
//!
//! let result = identifier.identify(&mut container)?;
//! assert_eq!(result.puids, vec!["fmt/40".to_string()]);
//! # Ok::<(), container_sig_engine::SignatureError>(())
//! ```
//!
//! ### Files on Disk
//!
//! ```rust,no_run
//! use container_sig_engine::{ContainerIdentifier, SignatureLibrary};
//!
//! let library = SignatureLibrary::from_yaml(&std::fs::read_to_string("signatures.yaml")?)?;
//! let identifier = ContainerIdentifier::new(library);
//!
//! // the container type is detected from the file's magic bytes
//! let result = identifier.identify_file("report.doc")?;
//! for warning in &result.warnings {
//!     eprintln!("{}: {}", warning.entry, warning.error);
//! }
//! println!("{:?}", result.puids);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Pattern Syntax
//!
//! Binary signatures are written as hex bytes with literals, byte sets, gaps
//! and alternatives, e.g. `^ 'PK' 03 04 {26} (14 00|0a 00) [00:7f]`. Legacy
//! set spellings such as `[00-7f]` and `^[00]` are normalized before
//! compilation; see [`compiler::normalize`] and [`compiler::parser`].
//!
//! ## Modules
//!
//! - [`compiler`] - Definition loading, normalization and pattern compilation
//! - [`matcher`] - Byte patterns, entry paths, prefilter and byte sources
//! - [`signature`] - The compiled, immutable signature library
//! - [`engine`] - The identifier, per-candidate state and the two-pass orchestrator
//! - [`container`] - OLE2, ZIP, GZIP and in-memory container adapters

pub mod compiler;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod ir;
pub mod matcher;
pub mod signature;

// Primary identification interface
pub use engine::{ContainerIdentifier, EntryWarning, IdentificationResult, PassStatistics};

// Compiler and configuration
pub use compiler::{Compiler, SignatureDefinitions};
pub use config::{EngineConfig, MatchConfig, ParallelConfig, PrefilterConfig};

// Core types and errors
pub use error::{Result, SignatureError};
pub use ir::{Anchor, CompiledPattern, Fragment, PatternId, SignatureExpression, SignatureId};
pub use signature::{CandidateSignature, SignatureLibrary};

// Containers
pub use container::{Container, ContainerEntry, ContainerType, MemoryContainer};
