//! Compiled candidate signatures and the library that holds them.

use crate::compiler::{Compiler, Presence};
use crate::config::PrefilterConfig;
use crate::container::ContainerType;
use crate::error::Result;
use crate::ir::{CompiledPattern, PatternId, SignatureId};
use crate::matcher::{BytePattern, LiteralPrefilter, PathPattern};
use std::collections::HashMap;
use tracing::debug;

/// A conjunction of patterns that must all match one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySignature {
    pub patterns: Vec<PatternId>,
}

/// One file a candidate declares.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRequirement {
    pub path: PathPattern,
    pub presence: Presence,
    /// Alternatives: any one satisfies the file. Empty means the name alone
    /// decides.
    pub binary: Vec<BinarySignature>,
}

impl FileRequirement {
    pub fn has_binary(&self) -> bool {
        !self.binary.is_empty()
    }
}

/// A container signature ready for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSignature {
    pub id: SignatureId,
    pub container: ContainerType,
    pub description: Option<String>,
    pub files: Vec<FileRequirement>,
}

impl CandidateSignature {
    /// Whether matching this candidate can require reading any entry.
    pub fn has_binary_requirement(&self) -> bool {
        self.files.iter().any(FileRequirement::has_binary)
    }
}

/// An immutable set of candidate signatures.
///
/// The library is built once and shared read-only, typically behind an `Arc`,
/// by every identification in the session.
#[derive(Debug)]
pub struct SignatureLibrary {
    signatures: Vec<CandidateSignature>,
    by_id: HashMap<SignatureId, usize>,
    by_container: HashMap<ContainerType, Vec<usize>>,
    declared_paths: HashMap<ContainerType, Vec<String>>,
    patterns: Vec<BytePattern>,
    prefilter: Option<LiteralPrefilter>,
    formats: HashMap<SignatureId, Vec<String>>,
}

impl SignatureLibrary {
    pub(crate) fn build(
        signatures: Vec<CandidateSignature>,
        patterns: Vec<CompiledPattern>,
        formats: HashMap<SignatureId, Vec<String>>,
        prefilter_config: &PrefilterConfig,
    ) -> Result<Self> {
        let prefilter = LiteralPrefilter::from_patterns(&patterns, prefilter_config)?;

        let mut by_id = HashMap::with_capacity(signatures.len());
        let mut by_container: HashMap<ContainerType, Vec<usize>> = HashMap::new();
        let mut declared_paths: HashMap<ContainerType, Vec<String>> = HashMap::new();

        for (index, signature) in signatures.iter().enumerate() {
            by_id.insert(signature.id, index);
            by_container.entry(signature.container).or_default().push(index);

            let paths = declared_paths.entry(signature.container).or_default();
            for file in &signature.files {
                let source = file.path.source();
                if !paths.iter().any(|p| p == source) {
                    paths.push(source.to_string());
                }
            }
        }
        for indices in by_container.values_mut() {
            indices.sort_by_key(|&i| signatures[i].id);
        }
        for paths in declared_paths.values_mut() {
            paths.sort();
        }

        if let Some(prefilter) = &prefilter {
            let stats = prefilter.stats();
            debug!(
                literals = stats.literal_count,
                covered = stats.pattern_count,
                unfiltered = stats.unfiltered_count,
                memory = stats.memory_usage,
                "Built literal prefilter"
            );
        }

        Ok(Self {
            signatures,
            by_id,
            by_container,
            declared_paths,
            patterns: patterns.into_iter().map(BytePattern::new).collect(),
            prefilter,
            formats,
        })
    }

    /// Compile a library from a YAML definition document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut compiler = Compiler::new();
        compiler.compile_yaml(yaml)?;
        compiler.into_library()
    }

    /// Compile a library from a JSON definition document.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut compiler = Compiler::new();
        compiler.compile_json(json)?;
        compiler.into_library()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn signatures(&self) -> &[CandidateSignature] {
        &self.signatures
    }

    pub fn signature(&self, id: SignatureId) -> Option<&CandidateSignature> {
        self.by_id.get(&id).map(|&i| &self.signatures[i])
    }

    /// Candidates declared for a container type, in ascending id order.
    pub fn candidates_for(
        &self,
        container: ContainerType,
    ) -> impl Iterator<Item = &CandidateSignature> + '_ {
        self.candidate_indices(container)
            .iter()
            .map(move |&i| &self.signatures[i])
    }

    pub(crate) fn candidate_indices(&self, container: ContainerType) -> &[usize] {
        self.by_container
            .get(&container)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every distinct path declared for a container type, sorted.
    pub fn declared_paths(&self, container: ContainerType) -> &[String] {
        self.declared_paths
            .get(&container)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn pattern(&self, id: PatternId) -> Option<&BytePattern> {
        self.patterns.get(id as usize)
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn prefilter(&self) -> Option<&LiteralPrefilter> {
        self.prefilter.as_ref()
    }

    /// Format identifiers mapped to a signature.
    pub fn puids(&self, id: SignatureId) -> &[String] {
        self.formats.get(&id).map(Vec::as_slice).unwrap_or_default()
    }
}
