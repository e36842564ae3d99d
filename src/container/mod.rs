//! Container adapters.
//!
//! Every container format is exposed through the [`Container`] trait: list the
//! entries, then open any of them as a byte stream. The engine never needs
//! anything else from a container.
//!
//! | Adapter             | Feature | Entries                                 |
//! |---------------------|---------|-----------------------------------------|
//! | [`MemoryContainer`] | always  | named byte buffers                      |
//! | `Ole2Container`     | `ole2`  | every stream of the compound document   |
//! | `ZipContainer`      | `zip`   | every archive member                    |
//! | `GzipContainer`     | `gzip`  | one synthetic entry, decompressed       |

use crate::error::{Result, SignatureError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub mod memory;

#[cfg(feature = "ole2")]
pub(crate) mod compound;
#[cfg(feature = "ole2")]
pub mod ole2;

#[cfg(feature = "zip")]
pub mod zip;

#[cfg(feature = "gzip")]
pub mod gzip;

pub use memory::MemoryContainer;

#[cfg(feature = "gzip")]
pub use gzip::GzipContainer;
#[cfg(feature = "ole2")]
pub use ole2::Ole2Container;
#[cfg(feature = "zip")]
pub use self::zip::ZipContainer;

/// The container formats signatures can be declared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    #[serde(alias = "OLE2", alias = "cfb")]
    Ole2,
    #[serde(alias = "ZIP")]
    Zip,
    #[serde(alias = "GZIP", alias = "gz")]
    Gzip,
}

impl ContainerType {
    const OLE2_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];
    const ZIP_EMPTY_MAGIC: [u8; 4] = [b'P', b'K', 0x05, 0x06];
    const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

    /// Guess the container type from the first bytes of a file.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        if header.starts_with(&Self::OLE2_MAGIC) {
            Some(ContainerType::Ole2)
        } else if header.starts_with(&Self::ZIP_MAGIC) || header.starts_with(&Self::ZIP_EMPTY_MAGIC)
        {
            Some(ContainerType::Zip)
        } else if header.starts_with(&Self::GZIP_MAGIC) {
            Some(ContainerType::Gzip)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerType::Ole2 => "ole2",
            ContainerType::Zip => "zip",
            ContainerType::Gzip => "gzip",
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a container, as enumerated.
///
/// `index` identifies the entry to [`Container::open`]; `name` is the name
/// matched against declared paths, with any trailing `/` removed. Names are
/// not unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    pub index: usize,
    pub name: String,
}

impl ContainerEntry {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

/// The capability every container adapter provides.
pub trait Container {
    fn container_type(&self) -> ContainerType;

    /// File name of the container itself, when known.
    fn name(&self) -> Option<&str> {
        None
    }

    /// List every entry. Fails with `SignatureError::Container` when the
    /// container cannot be decoded.
    fn entries(&mut self) -> Result<Vec<ContainerEntry>>;

    /// Open one entry for reading.
    ///
    /// Fails with `EntryNotFound` for an unknown entry and `EntryRead` when the
    /// entry cannot be opened. The reader is released when dropped.
    fn open<'a>(&'a mut self, entry: &ContainerEntry) -> Result<Box<dyn Read + 'a>>;
}

impl<C: Container + ?Sized> Container for Box<C> {
    fn container_type(&self) -> ContainerType {
        (**self).container_type()
    }

    fn name(&self) -> Option<&str> {
        (**self).name()
    }

    fn entries(&mut self) -> Result<Vec<ContainerEntry>> {
        (**self).entries()
    }

    fn open<'a>(&'a mut self, entry: &ContainerEntry) -> Result<Box<dyn Read + 'a>> {
        (**self).open(entry)
    }
}

/// Open a file on disk with the adapter its magic bytes call for.
///
/// # Errors
/// `IoError` when the file cannot be read, `Container` when the format is
/// unrecognized or its adapter was not compiled in.
pub fn open_path(path: &Path) -> Result<Box<dyn Container>> {
    let mut header = Vec::with_capacity(8);
    File::open(path)?.take(8).read_to_end(&mut header)?;

    match ContainerType::sniff(&header) {
        #[cfg(feature = "ole2")]
        Some(ContainerType::Ole2) => Ok(Box::new(Ole2Container::open_path(path)?)),
        #[cfg(feature = "zip")]
        Some(ContainerType::Zip) => Ok(Box::new(ZipContainer::open_path(path)?)),
        #[cfg(feature = "gzip")]
        Some(ContainerType::Gzip) => Ok(Box::new(GzipContainer::open_path(path)?)),
        #[allow(unreachable_patterns)]
        Some(other) => Err(SignatureError::Container(format!(
            "{} support not compiled in",
            other
        ))),
        None => Err(SignatureError::Container(
            "unrecognized container format".to_string(),
        )),
    }
}
