//! Minimal reader for OLE2 compound documents.
//!
//! Only what identification needs is decoded: the header, the sector
//! allocation tables, the directory tree, and stream contents. Every chain and
//! tree walk is bounded, so a corrupt file fails instead of looping.

use crate::error::{Result, SignatureError};
use std::collections::HashSet;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use zerocopy::{FromBytes, LE, U16, U32, U64};

pub(crate) const MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const HEADER_SIZE: usize = 512;
const DIR_ENTRY_SIZE: usize = 128;
const HEADER_DIFAT_ENTRIES: usize = 109;

const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
const FREESECT: u32 = 0xFFFF_FFFF;
const NOSTREAM: u32 = 0xFFFF_FFFF;

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    Empty,
    Storage,
    Stream,
    Root,
}

impl EntryKind {
    fn from_byte(byte: u8) -> Self {
        match byte {
            1 => EntryKind::Storage,
            2 => EntryKind::Stream,
            5 => EntryKind::Root,
            _ => EntryKind::Empty,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    left: u32,
    right: u32,
    child: u32,
    start_sector: u32,
    pub size: u64,
}

fn u16_at(buf: &[u8], offset: usize) -> u16 {
    buf.get(offset..offset + 2)
        .and_then(|b| U16::<LE>::read_from_bytes(b).ok())
        .map(|v| v.get())
        .unwrap_or(0)
}

fn u32_at(buf: &[u8], offset: usize) -> u32 {
    buf.get(offset..offset + 4)
        .and_then(|b| U32::<LE>::read_from_bytes(b).ok())
        .map(|v| v.get())
        .unwrap_or(FREESECT)
}

fn u64_at(buf: &[u8], offset: usize) -> u64 {
    buf.get(offset..offset + 8)
        .and_then(|b| U64::<LE>::read_from_bytes(b).ok())
        .map(|v| v.get())
        .unwrap_or(0)
}

fn corrupt(message: impl Into<String>) -> SignatureError {
    SignatureError::Container(format!("compound document: {}", message.into()))
}

/// A parsed compound document over a seekable reader.
#[derive(Debug)]
pub(crate) struct CompoundFile<R> {
    reader: R,
    sector_size: usize,
    mini_sector_size: usize,
    mini_stream_cutoff: u64,
    fat: Vec<u32>,
    minifat: Vec<u32>,
    entries: Vec<DirEntry>,
    ministream: Option<Vec<u8>>,
}

impl<R: Read + Seek> CompoundFile<R> {
    pub(crate) fn open(mut reader: R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut header)
            .map_err(|_| corrupt("file is shorter than its header"))?;

        if header[..8] != MAGIC {
            return Err(corrupt("bad signature"));
        }
        if u16_at(&header, 0x1C) != 0xFFFE {
            return Err(corrupt("invalid byte order mark"));
        }

        let sector_shift = u16_at(&header, 0x1E);
        let mini_sector_shift = u16_at(&header, 0x20);
        if !(7..=16).contains(&sector_shift) || mini_sector_shift > sector_shift {
            return Err(corrupt(format!("unsupported sector shift {}", sector_shift)));
        }

        let mut file = CompoundFile {
            reader,
            sector_size: 1usize << sector_shift,
            mini_sector_size: 1usize << mini_sector_shift,
            mini_stream_cutoff: u64::from(u32_at(&header, 0x38)),
            fat: Vec::new(),
            minifat: Vec::new(),
            entries: Vec::new(),
            ministream: None,
        };

        file.load_fat(&header)?;
        file.load_directory(u32_at(&header, 0x30))?;
        if u32_at(&header, 0x40) > 0 {
            file.load_minifat(u32_at(&header, 0x3C))?;
        }

        match file.entries.first() {
            Some(root) if root.kind == EntryKind::Root => Ok(file),
            _ => Err(corrupt("missing root entry")),
        }
    }

    fn read_sector(&mut self, sector: u32) -> io::Result<Vec<u8>> {
        let position = (u64::from(sector) + 1) * self.sector_size as u64;
        self.reader.seek(SeekFrom::Start(position))?;
        let mut buffer = vec![0u8; self.sector_size];
        self.reader.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn load_fat(&mut self, header: &[u8]) -> Result<()> {
        let mut fat_sectors: Vec<u32> = (0..HEADER_DIFAT_ENTRIES)
            .map(|i| u32_at(header, 0x4C + i * 4))
            .take_while(|&s| s != FREESECT && s != ENDOFCHAIN)
            .collect();

        let entries_per_sector = self.sector_size / 4;
        let mut difat_sector = u32_at(header, 0x44);
        let difat_count = u32_at(header, 0x48);
        let mut visited = HashSet::new();

        for _ in 0..difat_count {
            if difat_sector == ENDOFCHAIN || difat_sector == FREESECT {
                break;
            }
            if !visited.insert(difat_sector) {
                return Err(corrupt("DIFAT chain loops"));
            }
            let data = self
                .read_sector(difat_sector)
                .map_err(|e| corrupt(format!("DIFAT sector {}: {}", difat_sector, e)))?;
            fat_sectors.extend(
                (0..entries_per_sector - 1)
                    .map(|i| u32_at(&data, i * 4))
                    .filter(|&s| s != FREESECT && s != ENDOFCHAIN),
            );
            difat_sector = u32_at(&data, (entries_per_sector - 1) * 4);
        }

        self.fat.reserve(fat_sectors.len() * entries_per_sector);
        for sector in fat_sectors {
            let data = self
                .read_sector(sector)
                .map_err(|e| corrupt(format!("FAT sector {}: {}", sector, e)))?;
            self.fat
                .extend((0..entries_per_sector).map(|i| u32_at(&data, i * 4)));
        }
        Ok(())
    }

    /// Sector ids of the chain starting at `start`, bounded by the table size.
    fn chain(table: &[u32], start: u32) -> io::Result<Vec<u32>> {
        let mut sectors = Vec::new();
        let mut sector = start;
        while sector != ENDOFCHAIN && sector != FREESECT {
            let next = table.get(sector as usize).copied().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("sector {} outside allocation table", sector),
                )
            })?;
            if sectors.len() >= table.len() {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "sector chain loops"));
            }
            sectors.push(sector);
            sector = next;
        }
        Ok(sectors)
    }

    fn read_chain(&mut self, start: u32) -> io::Result<Vec<u8>> {
        let sectors = Self::chain(&self.fat, start)?;
        let mut data = Vec::with_capacity(sectors.len() * self.sector_size);
        for sector in sectors {
            data.extend_from_slice(&self.read_sector(sector)?);
        }
        Ok(data)
    }

    fn load_directory(&mut self, first_sector: u32) -> Result<()> {
        let data = self
            .read_chain(first_sector)
            .map_err(|e| corrupt(format!("directory: {}", e)))?;

        self.entries = data
            .chunks_exact(DIR_ENTRY_SIZE)
            .map(|raw| {
                let name_len = usize::from(u16_at(raw, 64)).min(64);
                let units: Vec<u16> = (0..name_len.saturating_sub(2) / 2)
                    .map(|i| u16_at(raw, i * 2))
                    .collect();
                let name = String::from_utf16_lossy(&units);
                DirEntry {
                    // control characters such as the \x01 of "\x01CompObj" are trimmed
                    name: name.trim_matches(|c: char| c <= ' ').to_string(),
                    kind: EntryKind::from_byte(raw[66]),
                    left: u32_at(raw, 68),
                    right: u32_at(raw, 72),
                    child: u32_at(raw, 76),
                    start_sector: u32_at(raw, 116),
                    size: if self.sector_size == 512 {
                        // version 3 files may leave the high half uninitialized
                        u64_at(raw, 120) & 0xFFFF_FFFF
                    } else {
                        u64_at(raw, 120)
                    },
                }
            })
            .collect();
        Ok(())
    }

    fn load_minifat(&mut self, first_sector: u32) -> Result<()> {
        let data = self
            .read_chain(first_sector)
            .map_err(|e| corrupt(format!("mini FAT: {}", e)))?;
        self.minifat = data.chunks_exact(4).map(|b| u32_at(b, 0)).collect();
        Ok(())
    }

    /// Directory ids of every stream, walking the tree from the root storage.
    pub(crate) fn streams(&self) -> Vec<u32> {
        let mut streams = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = match self.entries.first() {
            Some(root) => vec![root.child],
            None => return streams,
        };

        while let Some(sid) = stack.pop() {
            if sid == NOSTREAM || !visited.insert(sid) {
                continue;
            }
            let Some(entry) = self.entries.get(sid as usize) else {
                continue;
            };
            // right first so that siblings come out left to right
            stack.push(entry.right);
            match entry.kind {
                EntryKind::Stream => streams.push(sid),
                EntryKind::Storage => stack.push(entry.child),
                EntryKind::Root | EntryKind::Empty => {}
            }
            stack.push(entry.left);
        }
        streams
    }

    pub(crate) fn entry(&self, sid: u32) -> Option<&DirEntry> {
        self.entries.get(sid as usize)
    }

    /// Open a stream for reading.
    ///
    /// Small streams live in the mini stream and are read at once; larger
    /// streams are read sector by sector as the reader is consumed.
    pub(crate) fn open_stream(&mut self, sid: u32) -> io::Result<Box<dyn Read + '_>> {
        let entry = self
            .entries
            .get(sid as usize)
            .filter(|e| e.kind == EntryKind::Stream)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such stream"))?;

        if entry.size < self.mini_stream_cutoff {
            let data = self.read_mini_stream(entry.start_sector, entry.size)?;
            return Ok(Box::new(Cursor::new(data)));
        }

        let sectors = Self::chain(&self.fat, entry.start_sector)?;
        Ok(Box::new(ChainReader {
            reader: &mut self.reader,
            sectors: sectors.into_iter(),
            sector_size: self.sector_size,
            remaining: entry.size,
            buffer: Vec::new(),
            position: 0,
        }))
    }

    fn read_mini_stream(&mut self, start: u32, size: u64) -> io::Result<Vec<u8>> {
        if self.ministream.is_none() {
            let (start_sector, root_size) = match self.entries.first() {
                Some(root) => (root.start_sector, root.size),
                None => (ENDOFCHAIN, 0),
            };
            let mut data = self.read_chain(start_sector)?;
            data.truncate(usize::try_from(root_size).unwrap_or(usize::MAX));
            self.ministream = Some(data);
        }
        let ministream = self.ministream.as_deref().unwrap_or_default();

        let size = usize::try_from(size).unwrap_or(usize::MAX);
        let mut data = Vec::with_capacity(size.min(ministream.len()));
        for sector in Self::chain(&self.minifat, start)? {
            let offset = sector as usize * self.mini_sector_size;
            let chunk = ministream
                .get(offset..offset + self.mini_sector_size)
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "mini sector outside mini stream")
                })?;
            data.extend_from_slice(chunk);
            if data.len() >= size {
                break;
            }
        }
        if data.len() < size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream is shorter than its declared size",
            ));
        }
        data.truncate(size);
        Ok(data)
    }
}

/// Reads a regular stream one sector at a time.
struct ChainReader<'a, R> {
    reader: &'a mut R,
    sectors: std::vec::IntoIter<u32>,
    sector_size: usize,
    remaining: u64,
    buffer: Vec<u8>,
    position: usize,
}

impl<R: Read + Seek> Read for ChainReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        if self.position == self.buffer.len() {
            let sector = self.sectors.next().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream is shorter than its declared size",
                )
            })?;
            let offset = (u64::from(sector) + 1) * self.sector_size as u64;
            self.reader.seek(SeekFrom::Start(offset))?;
            self.buffer.resize(self.sector_size, 0);
            self.reader.read_exact(&mut self.buffer)?;
            self.position = 0;
        }

        let available = (self.buffer.len() - self.position).min(buf.len());
        let n = usize::try_from(self.remaining).map_or(available, |r| r.min(available));
        buf[..n].copy_from_slice(&self.buffer[self.position..self.position + n]);
        self.position += n;
        self.remaining -= n as u64;
        Ok(n)
    }
}
