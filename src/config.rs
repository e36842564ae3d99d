//! Configuration for signature compilation, byte matching and identification.
//!
//! The configuration is split the same way the engine is: [`PrefilterConfig`] is
//! read once, when a library is compiled; [`MatchConfig`] controls how much of each
//! entry the byte matcher may read and whether the library's prefilter is used;
//! [`ParallelConfig`] controls batch identification, and [`EngineConfig`] ties the
//! match-time settings together with a per-container timeout.

use std::time::Duration;

/// Configuration for the literal prefilter used by floating patterns.
///
/// A floating pattern that starts with a literal only needs to be tried at offsets
/// where that literal occurs. The prefilter finds those offsets with an
/// Aho-Corasick automaton instead of trying every offset of the entry.
///
/// Used at library build time, see [`Compiler::with_prefilter_config`](crate::Compiler::with_prefilter_config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefilterConfig {
    /// Whether to build prefilters at all (master switch)
    pub enabled: bool,
    /// Minimum length of the leading literal before a prefilter is worth building
    pub min_literal_length: usize,
}

impl Default for PrefilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_literal_length: 2,
        }
    }
}

impl PrefilterConfig {
    /// Create a disabled configuration (every offset is tried).
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Configuration for the byte matcher.
///
/// # Examples
///
/// ```rust
/// use container_sig_engine::MatchConfig;
///
/// // Only look at the first 64 KiB (and last 64 KiB for end-anchored patterns)
/// let config = MatchConfig::default().with_max_bytes_to_scan(64 * 1024);
/// assert_eq!(config.max_bytes_to_scan, Some(65536));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchConfig {
    /// Maximum number of bytes of an entry the matcher may inspect.
    ///
    /// Start-anchored and floating patterns see the first `max_bytes_to_scan`
    /// bytes, end-anchored patterns the last `max_bytes_to_scan` bytes.
    ///
    /// **Default**: `None` (unlimited)
    pub max_bytes_to_scan: Option<u64>,

    /// Whether floating patterns are tried only where the library's prefilter
    /// found their leading literal. Has no effect on a library built without a
    /// prefilter.
    ///
    /// **Default**: `true`
    pub use_prefilter: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_bytes_to_scan: None,
            use_prefilter: true,
        }
    }
}

impl MatchConfig {
    /// Limit how many bytes of each entry are inspected.
    pub fn with_max_bytes_to_scan(mut self, bytes: u64) -> Self {
        self.max_bytes_to_scan = Some(bytes);
        self
    }

    /// Remove the scan limit.
    pub fn unlimited(mut self) -> Self {
        self.max_bytes_to_scan = None;
        self
    }

    /// Enable or disable literal prefiltering.
    pub fn with_prefilter(mut self, enable: bool) -> Self {
        self.use_prefilter = enable;
        self
    }

    /// The scan limit as a buffer length, saturating on 32-bit targets.
    pub(crate) fn scan_limit(&self) -> Option<usize> {
        self.max_bytes_to_scan
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
    }
}

/// Configuration for parallel batch identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Number of worker threads used by `identify_batch`
    pub num_threads: usize,
    /// Batches smaller than this are identified sequentially
    pub min_batch_size_for_parallelism: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            min_batch_size_for_parallelism: 4,
        }
    }
}

/// Top-level engine configuration.
///
/// # Examples
///
/// ```rust
/// use container_sig_engine::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::default()
///     .with_max_bytes_to_scan(1024 * 1024)
///     .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.matching.max_bytes_to_scan, Some(1024 * 1024));
/// assert_eq!(config.timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineConfig {
    /// Byte matcher configuration
    pub matching: MatchConfig,
    /// Batch identification configuration
    pub parallel: ParallelConfig,
    /// Overall time allowed for one container; checked between entries
    pub timeout: Option<Duration>,
}

impl EngineConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounded scanning: inspect at most 64 KiB per entry and give up on a
    /// container after ten seconds.
    pub fn fast_scan() -> Self {
        Self {
            matching: MatchConfig::default().with_max_bytes_to_scan(64 * 1024),
            parallel: ParallelConfig::default(),
            timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Unbounded scanning with every offset tried; useful when verifying
    /// prefilter behaviour or debugging signatures.
    pub fn thorough() -> Self {
        Self {
            matching: MatchConfig {
                max_bytes_to_scan: None,
                use_prefilter: false,
            },
            parallel: ParallelConfig::default(),
            timeout: None,
        }
    }

    /// Limit how many bytes of each entry are inspected.
    pub fn with_max_bytes_to_scan(mut self, bytes: u64) -> Self {
        self.matching.max_bytes_to_scan = Some(bytes);
        self
    }

    /// Enable or disable literal prefiltering.
    pub fn with_prefilter(mut self, enable: bool) -> Self {
        self.matching.use_prefilter = enable;
        self
    }

    /// Set the per-container timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the per-container timeout.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set the number of threads for batch identification.
    pub fn with_parallel_threads(mut self, num_threads: usize) -> Self {
        self.parallel.num_threads = num_threads.max(1);
        self
    }

    /// Set minimum batch size for parallel identification.
    pub fn with_min_batch_size_for_parallelism(mut self, min_size: usize) -> Self {
        self.parallel.min_batch_size_for_parallelism = min_size;
        self
    }
}
