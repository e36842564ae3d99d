//! Primary container identification interface.
//!
//! This module provides the [`ContainerIdentifier`] struct that serves as the
//! main entry point for identifying containers against a signature library.
//!
//! - [`state`] - Per-candidate match state machine
//! - [`orchestrator`] - Name pass and binary pass over one container
//! - [`result`] - Identification results, warnings and statistics

pub mod orchestrator;
pub mod result;
pub mod state;

pub use orchestrator::MatchOrchestrator;
pub use result::{EntryWarning, IdentificationResult, PassStatistics};
pub use state::{EntryContent, EntryMatchState, MatchPhase, RejectReason};

use crate::config::EngineConfig;
use crate::container::{self, Container};
use crate::error::{Result, SignatureError};
use crate::signature::SignatureLibrary;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Identifies containers against a shared signature library.
///
/// The identifier is cheap to clone: clones share one library. Every
/// container is identified synchronously; many containers can be identified
/// in parallel, either from several threads or with
/// [`identify_batch`](Self::identify_batch).
///
/// # Usage Patterns
///
/// ## Single Container
/// ```rust
/// use container_sig_engine::container::{ContainerType, MemoryContainer};
/// use container_sig_engine::{ContainerIdentifier, SignatureLibrary};
///
/// let library = SignatureLibrary::from_yaml(r#"
/// signatures:
///   - id: 9
///     container: ole2
///     files:
///       - path: WordDocument
///       - path: CompObj
///         binary_signatures: ["'Word.Document.8'"]
/// "#)?;
/// let identifier = ContainerIdentifier::new(library);
///
/// let mut container = MemoryContainer::new(ContainerType::Ole2)
///     .with_entry("WordDocument", vec![0xEC, 0xA5])
///     .with_entry("CompObj", b"..Word.Document.8..".to_vec());
/// let result = identifier.identify(&mut container)?;
/// assert_eq!(result.matched, vec![9]);
/// # Ok::<(), container_sig_engine::SignatureError>(())
/// ```
///
/// ## Batch Processing
/// ```rust,no_run
/// use container_sig_engine::{ContainerIdentifier, EngineConfig, SignatureLibrary};
/// use std::path::PathBuf;
///
/// let library = SignatureLibrary::from_yaml(&std::fs::read_to_string("signatures.yaml")?)?;
/// let identifier = ContainerIdentifier::with_config(library, EngineConfig::fast_scan());
///
/// let paths: Vec<PathBuf> = vec!["a.docx".into(), "b.doc".into()];
/// for (path, result) in paths.iter().zip(identifier.identify_batch(&paths)?) {
///     match result {
///         Ok(result) => println!("{}: {:?}", path.display(), result.puids),
///         Err(err) => println!("{}: {}", path.display(), err),
///     }
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct ContainerIdentifier {
    library: Arc<SignatureLibrary>,
    config: EngineConfig,
}

impl ContainerIdentifier {
    /// Create an identifier with the default configuration.
    pub fn new(library: impl Into<Arc<SignatureLibrary>>) -> Self {
        Self::with_config(library, EngineConfig::default())
    }

    pub fn with_config(library: impl Into<Arc<SignatureLibrary>>, config: EngineConfig) -> Self {
        Self {
            library: library.into(),
            config,
        }
    }

    pub fn library(&self) -> &Arc<SignatureLibrary> {
        &self.library
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Identify one container.
    ///
    /// # Errors
    /// Returns an error if the container cannot be enumerated or the
    /// configured timeout expires. Failures of single entries are reported as
    /// warnings in the result instead.
    pub fn identify(&self, container: &mut dyn Container) -> Result<IdentificationResult> {
        let deadline = self.config.timeout.map(|timeout| Instant::now() + timeout);
        MatchOrchestrator::new(&self.library, &self.config.matching)
            .with_deadline(deadline)
            .identify(container)
    }

    /// Detect the container type of a file from its magic bytes and identify it.
    pub fn identify_file(&self, path: impl AsRef<Path>) -> Result<IdentificationResult> {
        let mut container = container::open_path(path.as_ref())?;
        self.identify(&mut *container)
    }

    /// Identify many files in parallel.
    ///
    /// Results are returned in input order. The outer error is only returned
    /// when the thread pool cannot be built.
    pub fn identify_batch(&self, paths: &[PathBuf]) -> Result<Vec<Result<IdentificationResult>>> {
        let parallel = &self.config.parallel;
        if parallel.num_threads <= 1 || paths.len() < parallel.min_batch_size_for_parallelism {
            return Ok(paths.iter().map(|path| self.identify_file(path)).collect());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallel.num_threads)
            .build()
            .map_err(|e| SignatureError::ThreadPool(e.to_string()))?;

        debug!(
            containers = paths.len(),
            threads = parallel.num_threads,
            "Identifying batch in parallel"
        );
        Ok(pool.install(|| {
            paths
                .par_iter()
                .map(|path| self.identify_file(path))
                .collect()
        }))
    }
}
