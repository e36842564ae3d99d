//! Serde model of a container signature definition file.
//!
//! Definitions are read from YAML or JSON with the same schema:
//!
//! ```yaml
//! signatures:
//!   - id: 9
//!     container: ole2
//!     description: Microsoft Word 97
//!     files:
//!       - path: WordDocument
//!       - path: CompObj
//!         binary_signatures:
//!           - "'Word.Document.8'"
//!           - - sequence: "10 00 00 00 'Word.Document.'"
//!               reference: bof
//!               min_offset: 40
//!               max_offset: 60
//! formats:
//!   - signature_id: 9
//!     puid: fmt/40
//! ```
//!
//! A file's `binary_signatures` are alternatives: any one of them may satisfy
//! the file. An entry of the list is either one byte sequence or a list of byte
//! sequences that must all match.

use crate::compiler::parser::compile_str;
use crate::container::ContainerType;
use crate::error::{Result, SignatureError};
use crate::ir::{CompiledPattern, SignatureId};
use serde::{Deserialize, Serialize};

/// Top-level document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureDefinitions {
    #[serde(default)]
    pub signatures: Vec<ContainerSignatureDef>,
    #[serde(default)]
    pub formats: Vec<FormatMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSignatureDef {
    pub id: SignatureId,
    pub container: ContainerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<ContainerFileDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerFileDef {
    pub path: String,
    #[serde(default)]
    pub presence: Presence,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binary_signatures: Vec<BinarySignatureDef>,
}

/// Whether a declared file must be present or must not be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Required,
    #[serde(alias = "forbidden")]
    Absent,
}

/// One binary signature: a single byte sequence or a conjunction of several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinarySignatureDef {
    Single(ByteSequenceDef),
    Conjunction(Vec<ByteSequenceDef>),
}

impl BinarySignatureDef {
    pub fn sequences(&self) -> &[ByteSequenceDef] {
        match self {
            BinarySignatureDef::Single(sequence) => std::slice::from_ref(sequence),
            BinarySignatureDef::Conjunction(sequences) => sequences,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ByteSequenceDef {
    /// A bare expression; anchoring comes from `^` and `$` in the expression.
    Expression(String),
    Detailed {
        sequence: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<Reference>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_offset: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_offset: Option<usize>,
    },
}

/// Where a byte sequence's offsets are measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reference {
    #[serde(alias = "BOFoffset", alias = "start")]
    Bof,
    #[serde(alias = "EOFoffset", alias = "end")]
    Eof,
    #[serde(alias = "any")]
    Variable,
}

/// Maps a container signature to a format identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatMapping {
    pub signature_id: SignatureId,
    pub puid: String,
}

impl ByteSequenceDef {
    pub fn sequence(&self) -> &str {
        match self {
            ByteSequenceDef::Expression(sequence) | ByteSequenceDef::Detailed { sequence, .. } => {
                sequence
            }
        }
    }

    /// Normalize, compile and apply the reference window.
    ///
    /// A `bof` reference places the pattern `min_offset..=max_offset` bytes
    /// after the start of the entry, an `eof` reference the same distance
    /// before its end. `max_offset` defaults to `min_offset`.
    pub fn compile(&self) -> Result<CompiledPattern> {
        let (sequence, reference, min_offset, max_offset) = match self {
            ByteSequenceDef::Expression(sequence) => (sequence, None, None, None),
            ByteSequenceDef::Detailed {
                sequence,
                reference,
                min_offset,
                max_offset,
            } => (sequence, *reference, *min_offset, *max_offset),
        };

        let pattern = compile_str(sequence)?;
        let has_offsets = min_offset.is_some() || max_offset.is_some();

        let reference = match reference {
            Some(Reference::Bof) | Some(Reference::Eof) => reference,
            Some(Reference::Variable) | None if has_offsets => {
                return Err(SignatureError::Definition(format!(
                    "offsets on '{}' need a bof or eof reference",
                    sequence
                )));
            }
            _ => return Ok(pattern),
        };

        let min = min_offset.unwrap_or(0);
        let max = max_offset.unwrap_or(min);
        if max < min {
            return Err(SignatureError::Definition(format!(
                "max_offset {} is below min_offset {} on '{}'",
                max, min, sequence
            )));
        }

        Ok(match reference {
            Some(Reference::Eof) => pattern.offset_from_end(min, max),
            _ => pattern.offset_from_start(min, max),
        })
    }
}
