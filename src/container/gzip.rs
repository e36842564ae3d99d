//! GZIP adapter.
//!
//! A gzip stream holds a single member, exposed as one synthetic entry whose
//! content is the decompressed payload.

use super::{Container, ContainerEntry, ContainerType};
use crate::error::{Result, SignatureError};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Entry name used when the container has no name to derive one from.
pub const DEFAULT_ENTRY_NAME: &str = "content";

#[derive(Debug)]
pub struct GzipContainer<R> {
    reader: R,
    name: Option<String>,
}

impl GzipContainer<BufReader<File>> {
    /// Open a gzip file on disk. The container is named after the file.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut container = Self::new(BufReader::new(file))?;
        container.name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Ok(container)
    }
}

impl<R: Read + Seek> GzipContainer<R> {
    /// Wrap a gzip stream, checking its magic bytes.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 2];
        reader.read_exact(&mut magic).map_err(|_| not_gzip())?;
        if magic != [0x1F, 0x8B] {
            return Err(not_gzip());
        }
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self { reader, name: None })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name of the single entry, derived from the container name.
    ///
    /// `report.doc.gz` yields `report.doc`, `bundle.tgz` yields `bundle.tar`.
    pub fn entry_name(&self) -> String {
        let Some(name) = self.name.as_deref() else {
            return DEFAULT_ENTRY_NAME.to_string();
        };
        let lower = name.to_ascii_lowercase();
        let stem = if lower.ends_with(".tgz") {
            return format!("{}.tar", &name[..name.len() - 4]);
        } else if lower.ends_with(".gzip") {
            &name[..name.len() - 5]
        } else if lower.ends_with(".gz") || lower.ends_with("-gz") {
            &name[..name.len() - 3]
        } else {
            name
        };
        if stem.is_empty() {
            DEFAULT_ENTRY_NAME.to_string()
        } else {
            stem.to_string()
        }
    }
}

fn not_gzip() -> SignatureError {
    SignatureError::Container("not a gzip stream".to_string())
}

impl<R: Read + Seek> Container for GzipContainer<R> {
    fn container_type(&self) -> ContainerType {
        ContainerType::Gzip
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn entries(&mut self) -> Result<Vec<ContainerEntry>> {
        Ok(vec![ContainerEntry::new(0, self.entry_name())])
    }

    fn open<'a>(&'a mut self, entry: &ContainerEntry) -> Result<Box<dyn Read + 'a>> {
        if entry.index != 0 {
            return Err(SignatureError::EntryNotFound(entry.name.clone()));
        }
        self.reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| SignatureError::entry_read(&entry.name, e))?;
        Ok(Box::new(GzDecoder::new(&mut self.reader)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_single_decompressed_entry() {
        let mut container = GzipContainer::new(Cursor::new(compress(b"%PDF-1.7 body")))
            .unwrap()
            .with_name("paper.pdf.gz");
        let entries = container.entries().unwrap();
        assert_eq!(entries, vec![ContainerEntry::new(0, "paper.pdf")]);

        let mut content = Vec::new();
        container
            .open(&entries[0])
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, b"%PDF-1.7 body");
    }

    #[test]
    fn test_entry_can_be_reopened() {
        let mut container = GzipContainer::new(Cursor::new(compress(b"abc"))).unwrap();
        let entry = ContainerEntry::new(0, DEFAULT_ENTRY_NAME);
        for _ in 0..2 {
            let mut content = Vec::new();
            container.open(&entry).unwrap().read_to_end(&mut content).unwrap();
            assert_eq!(content, b"abc");
        }
    }

    #[test]
    fn test_entry_names() {
        let gz = compress(b"");
        let named = |name: &str| {
            GzipContainer::new(Cursor::new(gz.clone()))
                .unwrap()
                .with_name(name)
                .entry_name()
        };
        assert_eq!(named("data.csv.gz"), "data.csv");
        assert_eq!(named("data.csv.GZIP"), "data.csv");
        assert_eq!(named("bundle.tgz"), "bundle.tar");
        assert_eq!(named("archive-gz"), "archive");
        assert_eq!(named("plain"), "plain");
        assert_eq!(named(".gz"), DEFAULT_ENTRY_NAME);
        assert_eq!(
            GzipContainer::new(Cursor::new(gz)).unwrap().entry_name(),
            DEFAULT_ENTRY_NAME
        );
    }

    #[test]
    fn test_not_gzip() {
        let result = GzipContainer::new(Cursor::new(b"PK\x03\x04".to_vec()));
        assert!(matches!(result, Err(SignatureError::Container(_))));
    }

    #[test]
    fn test_corrupt_payload_fails_on_read() {
        let mut bytes = compress(b"some content that compresses");
        let len = bytes.len();
        bytes.truncate(len / 2);
        let mut container = GzipContainer::new(Cursor::new(bytes)).unwrap();
        let entry = ContainerEntry::new(0, DEFAULT_ENTRY_NAME);
        let mut content = Vec::new();
        assert!(container
            .open(&entry)
            .unwrap()
            .read_to_end(&mut content)
            .is_err());
    }
}
