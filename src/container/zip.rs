//! ZIP archive adapter.

use super::{Container, ContainerEntry, ContainerType};
use crate::error::{Result, SignatureError};
use crate::matcher::normalize_entry_name;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use zip::ZipArchive;

/// Exposes every member of a ZIP archive as an entry.
///
/// Names come from the central directory; directory members keep their names
/// without the trailing `/`. Members are decompressed only when opened.
#[derive(Debug)]
pub struct ZipContainer<R> {
    archive: ZipArchive<R>,
    name: Option<String>,
}

impl ZipContainer<BufReader<File>> {
    /// Open an archive on disk. The container is named after the file.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut container = Self::new(BufReader::new(file))?;
        container.name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Ok(container)
    }
}

impl<R: Read + Seek> ZipContainer<R> {
    pub fn new(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader)
            .map_err(|e| SignatureError::Container(format!("Failed to open ZIP archive: {}", e)))?;
        Ok(Self {
            archive,
            name: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl<R: Read + Seek> Container for ZipContainer<R> {
    fn container_type(&self) -> ContainerType {
        ContainerType::Zip
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn entries(&mut self) -> Result<Vec<ContainerEntry>> {
        Ok((0..self.archive.len())
            .filter_map(|index| {
                self.archive
                    .name_for_index(index)
                    .map(|name| ContainerEntry::new(index, normalize_entry_name(name)))
            })
            .collect())
    }

    fn open<'a>(&'a mut self, entry: &ContainerEntry) -> Result<Box<dyn Read + 'a>> {
        if entry.index >= self.archive.len() {
            return Err(SignatureError::EntryNotFound(entry.name.clone()));
        }
        let file = self
            .archive
            .by_index(entry.index)
            .map_err(|e| SignatureError::entry_read(&entry.name, e))?;
        Ok(Box::new(file))
    }
}
