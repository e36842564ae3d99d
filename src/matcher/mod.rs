//! Byte-level and entry-level matching primitives.
//!
//! The matcher layer separates what is decided once per library from what is
//! decided once per entry:
//! - **Library load**: patterns become [`BytePattern`]s, declared paths become
//!   [`PathPattern`]s, and floating literals are gathered into one
//!   [`LiteralPrefilter`]
//! - **Per entry**: a [`ByteSource`] reads only as much of the entry as the
//!   patterns being evaluated need
//!
//! ## Example
//!
//! ```rust
//! use container_sig_engine::compiler::compile_str;
//! use container_sig_engine::matcher::{BytePattern, SliceSource};
//!
//! let pattern = BytePattern::new(compile_str("^ 41 [2:4] 42 $")?);
//! assert!(pattern.matches(&mut SliceSource::new(b"A123B"))?);
//! assert!(!pattern.matches(&mut SliceSource::new(b"A12345B"))?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub(crate) mod backtrack;
pub mod entry_path;
pub mod pattern;
pub mod prefilter;
pub mod source;

pub use entry_path::{container_stem, normalize_entry_name, BoundPath, PathPattern};
pub use pattern::BytePattern;
pub use prefilter::{LiteralPrefilter, PrefilterHits, PrefilterStats};
pub use source::{ByteSource, SliceSource, StreamSource};
