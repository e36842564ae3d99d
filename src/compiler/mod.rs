//! Container signature compiler.
//!
//! This module handles the offline compilation of signature definitions into
//! a [`SignatureLibrary`] ready for matching.
//!
//! The compiler is organized into several sub-modules:
//! - [`normalizer`] - Rewriting of legacy expression syntax to canonical form
//! - [`parser`] - Parsing of canonical expressions into fragments
//! - [`definitions`] - The YAML/JSON definition schema
//!
//! # Examples
//!
//! ```rust
//! use container_sig_engine::Compiler;
//!
//! let mut compiler = Compiler::new();
//! compiler.compile_yaml(r#"
//! signatures:
//!   - id: 1
//!     container: zip
//!     files:
//!       - path: mimetype
//!         binary_signatures: ["^'application/epub+zip'"]
//! formats:
//!   - signature_id: 1
//!     puid: fmt/483
//! "#)?;
//!
//! assert_eq!(compiler.signature_count(), 1);
//! let library = compiler.into_library()?;
//! assert_eq!(library.puids(1), &["fmt/483".to_string()]);
//! # Ok::<(), container_sig_engine::SignatureError>(())
//! ```

pub mod definitions;
pub mod normalizer;
pub mod parser;

pub use definitions::{
    BinarySignatureDef, ByteSequenceDef, ContainerFileDef, ContainerSignatureDef, FormatMapping,
    Presence, Reference, SignatureDefinitions,
};
pub use normalizer::normalize;
pub use parser::{compile, compile_str};

use crate::config::PrefilterConfig;
use crate::error::{Result, SignatureError};
use crate::ir::{CompiledPattern, PatternId, SignatureId};
use crate::matcher::PathPattern;
use crate::signature::{BinarySignature, CandidateSignature, FileRequirement, SignatureLibrary};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// The container signature compiler.
///
/// This struct maintains state across definition files, including the
/// mapping of patterns to their IDs for deduplication across signatures.
///
/// # Examples
///
/// ```rust
/// use container_sig_engine::Compiler;
///
/// let compiler = Compiler::new();
/// assert_eq!(compiler.pattern_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct Compiler {
    pattern_map: HashMap<CompiledPattern, PatternId>,
    patterns: Vec<CompiledPattern>,
    signatures: Vec<CandidateSignature>,
    signature_ids: HashSet<SignatureId>,
    formats: HashMap<SignatureId, Vec<String>>,
    prefilter: PrefilterConfig,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compiler whose library uses the given prefilter settings.
    pub fn with_prefilter_config(prefilter: PrefilterConfig) -> Self {
        Self {
            prefilter,
            ..Self::default()
        }
    }

    /// Compile every signature of a YAML definition document.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML is malformed or does not follow the schema
    /// - A byte sequence is not a valid expression
    /// - A signature is structurally invalid (duplicate id, no files, bad path)
    pub fn compile_yaml(&mut self, yaml: &str) -> Result<()> {
        let definitions: SignatureDefinitions = serde_yaml::from_str(yaml)
            .map_err(|e| SignatureError::YamlError(format!("Failed to parse YAML: {}", e)))?;
        self.add_definitions(definitions)
    }

    /// Compile every signature of a JSON definition document.
    pub fn compile_json(&mut self, json: &str) -> Result<()> {
        let definitions: SignatureDefinitions = serde_json::from_str(json)
            .map_err(|e| SignatureError::JsonError(format!("Failed to parse JSON: {}", e)))?;
        self.add_definitions(definitions)
    }

    /// Compile already-deserialized definitions.
    ///
    /// Nothing is added when any signature of the document fails to compile.
    pub fn add_definitions(&mut self, definitions: SignatureDefinitions) -> Result<()> {
        let mut compiled = Vec::with_capacity(definitions.signatures.len());
        let mut seen = HashSet::new();
        let mut pending: Vec<CompiledPattern> = Vec::new();

        for def in &definitions.signatures {
            if self.signature_ids.contains(&def.id) || !seen.insert(def.id) {
                return Err(SignatureError::Definition(format!(
                    "duplicate signature id {}",
                    def.id
                )));
            }
            compiled.push(self.compile_signature(def, &mut pending)?);
        }

        // commit only after the whole document compiled; pending patterns are
        // new and distinct, so they receive the ids handed out above
        for pattern in pending {
            self.get_or_create_pattern_id(pattern);
        }
        for signature in compiled {
            self.signature_ids.insert(signature.id);
            self.signatures.push(signature);
        }

        for mapping in definitions.formats {
            if !self.signature_ids.contains(&mapping.signature_id) {
                warn!(
                    signature_id = mapping.signature_id,
                    puid = %mapping.puid,
                    "Format mapping refers to an unknown signature, skipping"
                );
                continue;
            }
            let puids = self.formats.entry(mapping.signature_id).or_default();
            if !puids.contains(&mapping.puid) {
                puids.push(mapping.puid);
            }
        }

        debug!(
            signatures = self.signatures.len(),
            patterns = self.patterns.len(),
            "Compiled signature definitions"
        );
        Ok(())
    }

    /// Get the current signature count.
    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    /// Get the number of distinct patterns across all signatures.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Get a reference to the discovered patterns (for testing).
    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    /// Finish compilation and build the library.
    pub fn into_library(self) -> Result<SignatureLibrary> {
        SignatureLibrary::build(self.signatures, self.patterns, self.formats, &self.prefilter)
    }

    fn compile_signature(
        &self,
        def: &ContainerSignatureDef,
        pending: &mut Vec<CompiledPattern>,
    ) -> Result<CandidateSignature> {
        if def.files.is_empty() {
            return Err(SignatureError::Definition(format!(
                "signature {} declares no files",
                def.id
            )));
        }

        let mut files = Vec::with_capacity(def.files.len());
        for file in &def.files {
            let path = PathPattern::parse(&file.path)?;

            let mut binary = Vec::with_capacity(file.binary_signatures.len());
            for signature in &file.binary_signatures {
                let sequences = signature.sequences();
                if sequences.is_empty() {
                    return Err(SignatureError::Definition(format!(
                        "signature {}: empty binary signature for {}",
                        def.id, file.path
                    )));
                }
                let mut patterns = Vec::with_capacity(sequences.len());
                for sequence in sequences {
                    let pattern = sequence.compile()?;
                    patterns.push(self.pending_pattern_id(pattern, pending));
                }
                binary.push(BinarySignature { patterns });
            }

            files.push(FileRequirement {
                path,
                presence: file.presence,
                binary,
            });
        }

        Ok(CandidateSignature {
            id: def.id,
            container: def.container,
            description: def.description.clone(),
            files,
        })
    }

    /// Id the pattern will have once the document is committed.
    fn pending_pattern_id(
        &self,
        pattern: CompiledPattern,
        pending: &mut Vec<CompiledPattern>,
    ) -> PatternId {
        if let Some(&existing_id) = self.pattern_map.get(&pattern) {
            return existing_id;
        }
        let index = match pending.iter().position(|p| *p == pattern) {
            Some(index) => index,
            None => {
                pending.push(pattern);
                pending.len() - 1
            }
        };
        (self.patterns.len() + index) as PatternId
    }

    fn get_or_create_pattern_id(&mut self, pattern: CompiledPattern) -> PatternId {
        if let Some(&existing_id) = self.pattern_map.get(&pattern) {
            existing_id
        } else {
            let new_id = self.patterns.len() as PatternId;
            self.pattern_map.insert(pattern.clone(), new_id);
            self.patterns.push(pattern);
            new_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Presence;
    use crate::container::ContainerType;

    const WORD: &str = r#"
signatures:
  - id: 9
    container: ole2
    description: Microsoft Word 97
    files:
      - path: WordDocument
      - path: CompObj
        binary_signatures: ["'Word.Document.8'"]
  - id: 10
    container: ole2
    files:
      - path: CompObj
        binary_signatures: ["'Word.Document.8'"]
      - path: Encryption
        presence: absent
formats:
  - signature_id: 9
    puid: fmt/40
  - signature_id: 9
    puid: fmt/40
  - signature_id: 77
    puid: fmt/999
"#;

    #[test]
    fn test_patterns_are_deduplicated() {
        let mut compiler = Compiler::new();
        compiler.compile_yaml(WORD).unwrap();
        assert_eq!(compiler.signature_count(), 2);
        assert_eq!(compiler.pattern_count(), 1);

        let library = compiler.into_library().unwrap();
        let word = library.signature(9).unwrap();
        let other = library.signature(10).unwrap();
        assert_eq!(word.files[1].binary[0].patterns, other.files[0].binary[0].patterns);
        assert_eq!(other.files[1].presence, Presence::Absent);
    }

    #[test]
    fn test_format_mappings() {
        let mut compiler = Compiler::new();
        compiler.compile_yaml(WORD).unwrap();
        let library = compiler.into_library().unwrap();

        // duplicates collapse, unknown ids are skipped
        assert_eq!(library.puids(9), &["fmt/40".to_string()]);
        assert!(library.puids(10).is_empty());
        assert!(library.puids(77).is_empty());
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut compiler = Compiler::new();
        compiler.compile_yaml(WORD).unwrap();
        let result = compiler.compile_yaml(
            r#"
signatures:
  - id: 9
    container: zip
    files: [{path: mimetype}]
"#,
        );
        assert!(matches!(result, Err(SignatureError::Definition(_))));
        assert_eq!(compiler.signature_count(), 2);
    }

    #[test]
    fn test_failed_document_adds_nothing() {
        let mut compiler = Compiler::new();
        let result = compiler.compile_yaml(
            r#"
signatures:
  - id: 1
    container: zip
    files:
      - path: a
        binary_signatures: ["'fine'"]
  - id: 2
    container: zip
    files:
      - path: b
        binary_signatures: ["[01"]
"#,
        );
        assert!(matches!(result, Err(SignatureError::PatternSyntax { .. })));
        assert_eq!(compiler.signature_count(), 0);
        assert_eq!(compiler.pattern_count(), 0);
    }

    #[test]
    fn test_structural_errors() {
        let cases = [
            "signatures: [{id: 1, container: zip, files: []}]",
            "signatures: [{id: 1, container: zip, files: [{path: ''}]}]",
            "signatures: [{id: 1, container: zip, files: [{path: 'a', binary_signatures: [[]]}]}]",
            "signatures: [{id: 1, container: zip, files: [{path: '*.{a,b'}]}]",
        ];
        for yaml in cases {
            let mut compiler = Compiler::new();
            assert!(
                matches!(compiler.compile_yaml(yaml), Err(SignatureError::Definition(_))),
                "{}",
                yaml
            );
        }
    }

    #[test]
    fn test_parse_errors() {
        let mut compiler = Compiler::new();
        assert!(matches!(
            compiler.compile_yaml("signatures: [{id: 1, container: tar, files: [{path: a}]}]"),
            Err(SignatureError::YamlError(_))
        ));
        assert!(matches!(
            compiler.compile_json("{\"signatures\": "),
            Err(SignatureError::JsonError(_))
        ));
    }

    #[test]
    fn test_prefilter_config_applies_when_building_the_library() {
        let mut compiler = Compiler::new();
        compiler.compile_yaml(WORD).unwrap();
        let library = compiler.into_library().unwrap();
        assert_eq!(library.prefilter().unwrap().stats().pattern_count, 1);

        // 'Word.Document.8' is shorter than the required literal
        let mut compiler = Compiler::with_prefilter_config(PrefilterConfig {
            enabled: true,
            min_literal_length: 16,
        });
        compiler.compile_yaml(WORD).unwrap();
        assert!(compiler.into_library().unwrap().prefilter().is_none());

        let mut compiler = Compiler::with_prefilter_config(PrefilterConfig::disabled());
        compiler.compile_yaml(WORD).unwrap();
        assert!(compiler.into_library().unwrap().prefilter().is_none());
    }

    #[test]
    fn test_json_definitions() {
        let mut compiler = Compiler::new();
        compiler
            .compile_json(
                r#"{"signatures": [{"id": 3, "container": "gzip",
                    "files": [{"path": "*", "binary_signatures": ["^ 1f 8b"]}]}]}"#,
            )
            .unwrap();
        let library = compiler.into_library().unwrap();
        assert_eq!(library.candidates_for(ContainerType::Gzip).count(), 1);
        assert_eq!(library.candidates_for(ContainerType::Zip).count(), 0);
    }
}
