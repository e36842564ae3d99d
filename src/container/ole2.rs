//! OLE2 compound document adapter.

use super::compound::CompoundFile;
use super::{Container, ContainerEntry, ContainerType};
use crate::error::{Result, SignatureError};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

/// Exposes every stream of a compound document as an entry.
///
/// Entries are named by their trimmed directory-entry names, so a stream
/// stored as `"\x01CompObj"` appears as `CompObj`. Streams inside nested
/// storages appear under their own names and are not deduplicated.
#[derive(Debug)]
pub struct Ole2Container<R> {
    file: CompoundFile<R>,
    name: Option<String>,
    streams: Vec<u32>,
}

impl Ole2Container<BufReader<File>> {
    /// Open a compound document on disk. The container is named after the file.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut container = Self::new(BufReader::new(file))?;
        container.name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Ok(container)
    }
}

impl<R: Read + Seek> Ole2Container<R> {
    /// Parse the header, allocation tables and directory of a compound document.
    pub fn new(reader: R) -> Result<Self> {
        let file = CompoundFile::open(reader)?;
        let streams = file.streams();
        Ok(Self {
            file,
            name: None,
            streams,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl<R: Read + Seek> Container for Ole2Container<R> {
    fn container_type(&self) -> ContainerType {
        ContainerType::Ole2
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn entries(&mut self) -> Result<Vec<ContainerEntry>> {
        Ok(self
            .streams
            .iter()
            .enumerate()
            .filter_map(|(index, &sid)| {
                self.file
                    .entry(sid)
                    .map(|entry| ContainerEntry::new(index, entry.name.clone()))
            })
            .collect())
    }

    fn open<'a>(&'a mut self, entry: &ContainerEntry) -> Result<Box<dyn Read + 'a>> {
        let sid = *self
            .streams
            .get(entry.index)
            .ok_or_else(|| SignatureError::EntryNotFound(entry.name.clone()))?;
        self.file
            .open_stream(sid)
            .map_err(|e| SignatureError::entry_read(&entry.name, e))
    }
}
