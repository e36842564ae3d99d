//! Bounded views over the bytes of one container entry.
//!
//! The matcher never reads an entry directly. It asks a [`ByteSource`] for the
//! head, the whole scan window, or the tail, and the source reads from the
//! underlying stream only as far as the request needs. A source never reads
//! past the end of its entry, and never past the configured scan window except
//! to locate the tail.

use std::io::{self, Read};

const READ_CHUNK: usize = 64 * 1024;

/// Byte access for the matcher.
pub trait ByteSource {
    /// The first `len` bytes, or fewer when the entry or scan window is shorter.
    fn head(&mut self, len: usize) -> io::Result<&[u8]>;

    /// All bytes inside the scan window.
    fn contents(&mut self) -> io::Result<&[u8]>;

    /// The last bytes of the entry, no more than the scan window holds.
    fn tail(&mut self) -> io::Result<&[u8]>;

    /// Whether the entry extends past the scan window.
    fn is_truncated(&mut self) -> io::Result<bool>;
}

/// A source over bytes already in memory.
#[derive(Debug, Clone, Copy)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    window: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_limit(data, None)
    }

    pub fn with_limit(data: &'a [u8], limit: Option<usize>) -> Self {
        let window = limit.map_or(data.len(), |l| l.min(data.len()));
        Self { data, window }
    }
}

impl ByteSource for SliceSource<'_> {
    fn head(&mut self, len: usize) -> io::Result<&[u8]> {
        Ok(&self.data[..len.min(self.window)])
    }

    fn contents(&mut self) -> io::Result<&[u8]> {
        Ok(&self.data[..self.window])
    }

    fn tail(&mut self) -> io::Result<&[u8]> {
        Ok(&self.data[self.data.len() - self.window..])
    }

    fn is_truncated(&mut self) -> io::Result<bool> {
        Ok(self.window < self.data.len())
    }
}

/// A source that buffers a reader on demand.
///
/// A read error is remembered: later requests that can be answered from what
/// was already buffered still succeed, and any request that needs more bytes
/// fails with the same error. The outcome of a request therefore does not
/// depend on which requests came before it.
pub struct StreamSource<R> {
    reader: R,
    limit: Option<usize>,
    buffer: Vec<u8>,
    /// Bytes read past the window while checking for truncation.
    overflow: Vec<u8>,
    tail: Option<Vec<u8>>,
    truncated: Option<bool>,
    exhausted: bool,
    failure: Option<(io::ErrorKind, String)>,
    bytes_read: u64,
}

impl<R: Read> StreamSource<R> {
    pub fn new(reader: R, limit: Option<usize>) -> Self {
        Self {
            reader,
            limit,
            buffer: Vec::new(),
            overflow: Vec::new(),
            tail: None,
            truncated: None,
            exhausted: false,
            failure: None,
            bytes_read: 0,
        }
    }

    /// Total bytes pulled from the reader so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    fn window(&self) -> usize {
        self.limit.unwrap_or(usize::MAX)
    }

    fn replay_failure(&self) -> io::Result<()> {
        match &self.failure {
            Some((kind, message)) => Err(io::Error::new(*kind, message.clone())),
            None => Ok(()),
        }
    }

    /// Read up to `max` bytes into `into`, recording EOF and errors.
    fn read_chunk(&mut self, into: &mut Vec<u8>, max: usize) -> io::Result<usize> {
        self.replay_failure()?;

        let start = into.len();
        into.resize(start + max.min(READ_CHUNK), 0);
        loop {
            match self.reader.read(&mut into[start..]) {
                Ok(0) => {
                    into.truncate(start);
                    self.exhausted = true;
                    return Ok(0);
                }
                Ok(n) => {
                    into.truncate(start + n);
                    self.bytes_read += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    into.truncate(start);
                    self.failure = Some((e.kind(), e.to_string()));
                    return Err(e);
                }
            }
        }
    }

    fn fill_to(&mut self, target: usize) -> io::Result<()> {
        let target = target.min(self.window());
        while self.buffer.len() < target && !self.exhausted {
            let mut buffer = std::mem::take(&mut self.buffer);
            let wanted = target - buffer.len();
            let result = self.read_chunk(&mut buffer, wanted);
            self.buffer = buffer;
            result?;
        }
        Ok(())
    }
}

impl<R: Read> ByteSource for StreamSource<R> {
    fn head(&mut self, len: usize) -> io::Result<&[u8]> {
        self.fill_to(len)?;
        let end = len.min(self.buffer.len());
        Ok(&self.buffer[..end])
    }

    fn contents(&mut self) -> io::Result<&[u8]> {
        self.fill_to(usize::MAX)?;
        Ok(&self.buffer)
    }

    fn tail(&mut self) -> io::Result<&[u8]> {
        if self.tail.is_none() {
            self.fill_to(usize::MAX)?;
            let window = self.window();

            let tail = if self.exhausted && self.overflow.is_empty() {
                self.truncated = Some(false);
                self.buffer.clone()
            } else {
                let mut ring = Vec::with_capacity(window.saturating_mul(2).min(1 << 24));
                ring.extend_from_slice(&self.buffer);
                ring.extend_from_slice(&self.overflow);
                let mut beyond = !self.overflow.is_empty();
                while !self.exhausted {
                    beyond |= self.read_chunk(&mut ring, READ_CHUNK)? > 0;
                    if ring.len() > window.saturating_add(READ_CHUNK) {
                        ring.drain(..ring.len() - window);
                    }
                }
                if ring.len() > window {
                    ring.drain(..ring.len() - window);
                }
                self.truncated = Some(beyond);
                ring
            };
            self.tail = Some(tail);
        }

        Ok(self.tail.as_deref().unwrap_or_default())
    }

    fn is_truncated(&mut self) -> io::Result<bool> {
        if let Some(truncated) = self.truncated {
            return Ok(truncated);
        }

        self.fill_to(usize::MAX)?;
        let truncated = if self.buffer.len() < self.window() {
            false
        } else if !self.overflow.is_empty() {
            true
        } else {
            let mut overflow = std::mem::take(&mut self.overflow);
            let result = self.read_chunk(&mut overflow, 1);
            self.overflow = overflow;
            result?;
            !self.overflow.is_empty()
        };

        self.truncated = Some(truncated);
        Ok(truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Yields `data` a few bytes at a time, then fails at `fail_at`.
    struct FlakyReader {
        data: Vec<u8>,
        position: usize,
        fail_at: Option<usize>,
    }

    impl Read for FlakyReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if Some(self.position) == self.fail_at {
                return Err(io::Error::new(io::ErrorKind::Other, "disk on fire"));
            }
            let stop = self.fail_at.unwrap_or(self.data.len()).min(self.data.len());
            let n = buf.len().min(3).min(stop - self.position);
            buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
            self.position += n;
            Ok(n)
        }
    }

    fn data(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }

    #[test]
    fn test_slice_source_without_limit() {
        let bytes = data(10);
        let mut source = SliceSource::new(&bytes);
        assert_eq!(source.head(4).unwrap(), &[0, 1, 2, 3]);
        assert_eq!(source.head(100).unwrap().len(), 10);
        assert_eq!(source.contents().unwrap().len(), 10);
        assert_eq!(source.tail().unwrap().len(), 10);
        assert!(!source.is_truncated().unwrap());
    }

    #[test]
    fn test_slice_source_with_limit() {
        let bytes = data(10);
        let mut source = SliceSource::with_limit(&bytes, Some(4));
        assert_eq!(source.head(8).unwrap(), &[0, 1, 2, 3]);
        assert_eq!(source.contents().unwrap(), &[0, 1, 2, 3]);
        assert_eq!(source.tail().unwrap(), &[6, 7, 8, 9]);
        assert!(source.is_truncated().unwrap());
    }

    #[test]
    fn test_stream_source_reads_lazily() {
        let mut source = StreamSource::new(Cursor::new(data(1000)), None);
        assert_eq!(source.head(2).unwrap(), &[0, 1]);
        assert!(source.bytes_read() < 1000);
        assert_eq!(source.contents().unwrap().len(), 1000);
        assert_eq!(source.bytes_read(), 1000);
    }

    #[test]
    fn test_stream_source_window_and_tail() {
        let reader = FlakyReader {
            data: data(200),
            position: 0,
            fail_at: None,
        };
        let mut source = StreamSource::new(reader, Some(16));

        assert_eq!(source.contents().unwrap(), &data(16)[..]);
        assert!(source.is_truncated().unwrap());
        let tail = source.tail().unwrap().to_vec();
        assert_eq!(tail, (184..200).map(|i| i as u8).collect::<Vec<_>>());
        // head is still served from the window after the tail was read
        assert_eq!(source.head(3).unwrap(), &[0, 1, 2]);
        assert!(source.is_truncated().unwrap());
    }

    #[test]
    fn test_stream_source_tail_before_truncation_check() {
        let mut source = StreamSource::new(Cursor::new(data(40)), Some(16));
        assert_eq!(source.tail().unwrap().len(), 16);
        assert!(source.is_truncated().unwrap());
    }

    #[test]
    fn test_stream_source_short_entry_is_not_truncated() {
        let mut source = StreamSource::new(Cursor::new(data(8)), Some(16));
        assert!(!source.is_truncated().unwrap());
        assert_eq!(source.tail().unwrap(), &data(8)[..]);
    }

    #[test]
    fn test_stream_source_exact_window_is_not_truncated() {
        let mut source = StreamSource::new(Cursor::new(data(16)), Some(16));
        assert!(!source.is_truncated().unwrap());
        assert_eq!(source.tail().unwrap(), &data(16)[..]);
    }

    #[test]
    fn test_stream_source_failure_is_order_independent() {
        let make = || {
            StreamSource::new(
                FlakyReader {
                    data: data(100),
                    position: 0,
                    fail_at: Some(9),
                },
                None,
            )
        };

        // head first, then contents
        let mut source = make();
        assert_eq!(source.head(4).unwrap(), &[0, 1, 2, 3]);
        assert!(source.contents().is_err());
        assert_eq!(source.head(4).unwrap(), &[0, 1, 2, 3]);

        // contents first, then head
        let mut source = make();
        assert!(source.contents().is_err());
        assert_eq!(source.head(4).unwrap(), &[0, 1, 2, 3]);
        assert!(source.head(20).is_err());
        assert!(source.tail().is_err());
    }
}
