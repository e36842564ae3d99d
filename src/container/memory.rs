//! In-memory container of named byte buffers.

use super::{Container, ContainerEntry, ContainerType};
use crate::error::{Result, SignatureError};
use std::io::{Cursor, Read};

/// A container whose entries are already decoded.
///
/// Useful for callers that unpack containers themselves and for tests. Entry
/// names may repeat.
///
/// ```rust
/// use container_sig_engine::container::{Container, ContainerType, MemoryContainer};
///
/// let mut container = MemoryContainer::new(ContainerType::Ole2)
///     .with_entry("WordDocument", vec![0xEC, 0xA5])
///     .with_entry("CompObj", b"Word.Document.8".to_vec());
/// assert_eq!(container.entries()?.len(), 2);
/// # Ok::<(), container_sig_engine::SignatureError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MemoryContainer {
    container_type: ContainerType,
    name: Option<String>,
    entries: Vec<(String, Vec<u8>)>,
}

impl MemoryContainer {
    pub fn new(container_type: ContainerType) -> Self {
        Self {
            container_type,
            name: None,
            entries: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_entry(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.add_entry(name, data);
        self
    }

    pub fn add_entry(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.entries.push((name.into(), data));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Container for MemoryContainer {
    fn container_type(&self) -> ContainerType {
        self.container_type
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn entries(&mut self) -> Result<Vec<ContainerEntry>> {
        Ok(self
            .entries
            .iter()
            .enumerate()
            .map(|(index, (name, _))| {
                ContainerEntry::new(index, crate::matcher::normalize_entry_name(name))
            })
            .collect())
    }

    fn open<'a>(&'a mut self, entry: &ContainerEntry) -> Result<Box<dyn Read + 'a>> {
        let (_, data) = self
            .entries
            .get(entry.index)
            .ok_or_else(|| SignatureError::EntryNotFound(entry.name.clone()))?;
        Ok(Box::new(Cursor::new(data.as_slice())))
    }
}
