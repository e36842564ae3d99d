//! Fixture builders shared by the integration tests.

#![allow(dead_code)]

use container_sig_engine::container::{Container, ContainerEntry, ContainerType};
use container_sig_engine::Result;
use std::io::{Cursor, Read, Write};

const SECTOR: usize = 512;
const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
const FREESECT: u32 = 0xFFFF_FFFF;
const FATSECT: u32 = 0xFFFF_FFFD;
const NOSTREAM: u32 = 0xFFFF_FFFF;

fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn directory_entry(name: &str, kind: u8, right: u32, child: u32, start: u32, size: u32) -> [u8; 128] {
    let mut raw = [0u8; 128];
    let units: Vec<u16> = name.encode_utf16().collect();
    for (i, unit) in units.iter().enumerate() {
        put_u16(&mut raw, i * 2, *unit);
    }
    put_u16(&mut raw, 64, ((units.len() + 1) * 2) as u16);
    raw[66] = kind;
    raw[67] = 1;
    put_u32(&mut raw, 68, NOSTREAM);
    put_u32(&mut raw, 72, right);
    put_u32(&mut raw, 76, child);
    put_u32(&mut raw, 116, start);
    put_u32(&mut raw, 120, size);
    raw
}

const MINI_SECTOR: usize = 64;

fn sectors_for(len: usize, size: usize) -> usize {
    (len + size - 1) / size
}

/// Link `from..to` into one chain of the given allocation table.
fn chain(table: &mut [u32], from: usize, to: usize) {
    for sector in from..to {
        table[sector] = if sector + 1 == to {
            ENDOFCHAIN
        } else {
            (sector + 1) as u32
        };
    }
}

/// Build a version 3 compound document with the given streams under the root.
///
/// Streams are stored in regular sectors (mini stream cutoff zero).
pub fn ole2_document(streams: &[(&str, &[u8])]) -> Vec<u8> {
    ole2_document_with_cutoff(streams, 0)
}

/// Build a version 3 compound document whose streams shorter than `cutoff`
/// live in the root entry's mini stream, as Office writes them with 4096.
pub fn ole2_document_with_cutoff(streams: &[(&str, &[u8])], cutoff: u32) -> Vec<u8> {
    let in_mini = |content: &[u8]| content.len() < cutoff as usize;

    // mini sector of each small stream
    let mut mini_starts = Vec::new();
    let mut mini_next = 0;
    for (_, content) in streams {
        mini_starts.push(mini_next);
        if in_mini(*content) {
            mini_next += sectors_for(content.len(), MINI_SECTOR);
        }
    }

    let dir_sectors = (streams.len() + 1 + 3) / 4;
    let minifat_sectors = sectors_for(mini_next * 4, SECTOR);
    let ministream_sectors = sectors_for(mini_next * MINI_SECTOR, SECTOR);
    let minifat_start = 1 + dir_sectors;
    let ministream_start = minifat_start + minifat_sectors;

    let mut starts = Vec::new();
    let mut next = ministream_start + ministream_sectors;
    for (_, content) in streams {
        starts.push(next);
        if !in_mini(*content) {
            next += sectors_for(content.len(), SECTOR).max(1);
        }
    }
    assert!(next <= SECTOR / 4, "fixture needs more than one FAT sector");

    let mut fat = vec![FREESECT; SECTOR / 4];
    fat[0] = FATSECT;
    chain(&mut fat, 1, minifat_start);
    chain(&mut fat, minifat_start, ministream_start);
    chain(&mut fat, ministream_start, ministream_start + ministream_sectors);
    let mut minifat = vec![FREESECT; minifat_sectors * SECTOR / 4];
    for (i, (_, content)) in streams.iter().enumerate() {
        if in_mini(*content) {
            let start = mini_starts[i];
            chain(&mut minifat, start, start + sectors_for(content.len(), MINI_SECTOR));
        } else {
            let end = starts.get(i + 1).copied().unwrap_or(next);
            chain(&mut fat, starts[i], end);
        }
    }

    let mut out = vec![0u8; SECTOR];
    out[..8].copy_from_slice(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);
    put_u16(&mut out, 0x18, 0x003E);
    put_u16(&mut out, 0x1A, 3);
    put_u16(&mut out, 0x1C, 0xFFFE);
    put_u16(&mut out, 0x1E, 9);
    put_u16(&mut out, 0x20, 6);
    put_u32(&mut out, 0x2C, 1);
    put_u32(&mut out, 0x30, 1);
    put_u32(&mut out, 0x38, cutoff);
    if minifat_sectors == 0 {
        put_u32(&mut out, 0x3C, ENDOFCHAIN);
    } else {
        put_u32(&mut out, 0x3C, minifat_start as u32);
    }
    put_u32(&mut out, 0x40, minifat_sectors as u32);
    put_u32(&mut out, 0x44, ENDOFCHAIN);
    for i in 0..109 {
        put_u32(&mut out, 0x4C + i * 4, if i == 0 { 0 } else { FREESECT });
    }

    for value in fat {
        out.extend_from_slice(&value.to_le_bytes());
    }

    let child = if streams.is_empty() { NOSTREAM } else { 1 };
    let root_start = if ministream_sectors == 0 {
        ENDOFCHAIN
    } else {
        ministream_start as u32
    };
    let root_size = (mini_next * MINI_SECTOR) as u32;
    let mut directory =
        directory_entry("Root Entry", 5, NOSTREAM, child, root_start, root_size).to_vec();
    for (i, (name, content)) in streams.iter().enumerate() {
        let right = if i + 1 < streams.len() {
            (i + 2) as u32
        } else {
            NOSTREAM
        };
        let start = if !in_mini(*content) {
            starts[i] as u32
        } else if content.is_empty() {
            ENDOFCHAIN
        } else {
            mini_starts[i] as u32
        };
        directory.extend_from_slice(&directory_entry(
            name,
            2,
            right,
            NOSTREAM,
            start,
            content.len() as u32,
        ));
    }
    directory.resize(dir_sectors * SECTOR, 0);
    out.extend(directory);

    for value in minifat {
        out.extend_from_slice(&value.to_le_bytes());
    }
    let mut ministream = Vec::new();
    for (_, content) in streams.iter().filter(|(_, c)| in_mini(c)) {
        let mut data = content.to_vec();
        data.resize(sectors_for(data.len(), MINI_SECTOR) * MINI_SECTOR, 0);
        ministream.extend(data);
    }
    ministream.resize(ministream_sectors * SECTOR, 0);
    out.extend(ministream);

    for (_, content) in streams.iter().filter(|(_, c)| !in_mini(c)) {
        let mut data = content.to_vec();
        let padded = sectors_for(data.len(), SECTOR).max(1) * SECTOR;
        data.resize(padded, 0);
        out.extend(data);
    }
    out
}

/// Build a deflated ZIP archive. Names ending in `/` become directories.
pub fn zip_archive(members: &[(&str, &[u8])]) -> Vec<u8> {
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in members {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Wraps a container and records the name of every entry opened.
pub struct CountingContainer<C> {
    inner: C,
    opened: Vec<String>,
}

impl<C: Container> CountingContainer<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            opened: Vec::new(),
        }
    }

    pub fn opened(&self) -> &[String] {
        &self.opened
    }
}

impl<C: Container> Container for CountingContainer<C> {
    fn container_type(&self) -> ContainerType {
        self.inner.container_type()
    }

    fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    fn entries(&mut self) -> Result<Vec<ContainerEntry>> {
        self.inner.entries()
    }

    fn open<'a>(&'a mut self, entry: &ContainerEntry) -> Result<Box<dyn Read + 'a>> {
        self.opened.push(entry.name.clone());
        self.inner.open(entry)
    }
}

/// All orderings of `items`.
pub fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}
