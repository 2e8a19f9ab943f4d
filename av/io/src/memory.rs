/*!
    In-memory stream adapters.

    Ready-made bindings for the common case of feeding FFmpeg from bytes
    already in memory, or collecting its output into memory. `MemorySink`
    and `MemoryStream` are cheap clones over a shared buffer, so a caller
    can keep a tap on the data while the binding itself lives in the
    registry.
*/

use std::io::SeekFrom;
use std::sync::Arc;

use av_types::{Error, Result};
use parking_lot::Mutex;

use crate::binding::{InputStream, OutputStream, RandomAccess};

/**
    Read-only stream over an owned byte buffer.

    Serves short reads as the cursor approaches the end and reports
    exhaustion with `Ok(0)`, which the bridge translates to end-of-stream.
*/
pub struct MemorySource {
    data: Vec<u8>,
    pos: usize,
}

impl MemorySource {
    /**
        Create a source over `data`, positioned at the start.
    */
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /**
        Bytes left to read.
    */
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl InputStream for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/**
    Write-only stream appending into a shared buffer.

    Clones share the same buffer; keep one clone outside the binding to
    read the collected bytes back after the muxer is done.
*/
#[derive(Clone)]
pub struct MemorySink {
    data: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    /**
        Create an empty sink.
    */
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /**
        Total bytes written so far.
    */
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /**
        Returns true if nothing has been written.
    */
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /**
        Copy of the collected bytes.
    */
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputStream for MemorySink {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.data.lock().extend_from_slice(data);
        Ok(data.len())
    }
}

struct StreamBuf {
    data: Vec<u8>,
    pos: u64,
}

/**
    Seekable read-write stream over a shared buffer.

    Writes past the current end grow the buffer; the position may be moved
    anywhere at or past zero, matching what container muxers expect when
    they come back to patch headers. Clones share the same buffer.
*/
#[derive(Clone)]
pub struct MemoryStream {
    inner: Arc<Mutex<StreamBuf>>,
}

impl MemoryStream {
    /**
        Create an empty stream.
    */
    pub fn new() -> Self {
        Self::with_contents(Vec::new())
    }

    /**
        Create a stream pre-loaded with `data`, positioned at the start.
    */
    pub fn with_contents(data: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StreamBuf { data, pos: 0 })),
        }
    }

    /**
        Total bytes in the buffer.
    */
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    /**
        Returns true if the buffer is empty.
    */
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /**
        Copy of the buffer contents.
    */
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().data.clone()
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

impl InputStream for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let pos = inner.pos.min(inner.data.len() as u64) as usize;
        let n = buf.len().min(inner.data.len() - pos);
        buf[..n].copy_from_slice(&inner.data[pos..pos + n]);
        inner.pos = (pos + n) as u64;
        Ok(n)
    }
}

impl OutputStream for MemoryStream {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let pos = inner.pos as usize;
        let end = pos + data.len();
        if end > inner.data.len() {
            inner.data.resize(end, 0);
        }
        inner.data[pos..end].copy_from_slice(data);
        inner.pos = end as u64;
        Ok(data.len())
    }
}

impl RandomAccess for MemoryStream {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let mut inner = self.inner.lock();
        let len = inner.data.len() as i64;
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(delta) => inner.pos as i64 + delta,
            SeekFrom::End(delta) => len + delta,
        };
        if target < 0 {
            return Err(Error::invalid_data("seek before start of stream"));
        }
        inner.pos = target as u64;
        Ok(inner.pos)
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.inner.lock().data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_short_reads_and_exhaustion() {
        let mut source = MemorySource::new((0u8..10).collect());
        let mut buf = [0u8; 4];

        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(source.remaining(), 0);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn sink_accumulates_through_clones() {
        let mut sink = MemorySink::new();
        let tap = sink.clone();

        assert_eq!(sink.write(&[1u8; 100]).unwrap(), 100);
        assert_eq!(sink.write(&[2u8; 50]).unwrap(), 50);
        assert_eq!(sink.write(&[]).unwrap(), 0);

        assert_eq!(tap.len(), 150);
        assert_eq!(&tap.contents()[..3], &[1, 1, 1]);
    }

    #[test]
    fn stream_read_write_roundtrip() {
        let mut stream = MemoryStream::new();
        assert_eq!(stream.write(b"header....payload").unwrap(), 17);

        // Come back and patch the header, the muxer way.
        assert_eq!(stream.seek(SeekFrom::Start(0)).unwrap(), 0);
        assert_eq!(stream.write(b"HEADER").unwrap(), 6);

        assert_eq!(stream.seek(SeekFrom::Start(0)).unwrap(), 0);
        let mut buf = [0u8; 17];
        assert_eq!(stream.read(&mut buf).unwrap(), 17);
        assert_eq!(&buf, b"HEADER....payload");
    }

    #[test]
    fn stream_seek_math() {
        let mut stream = MemoryStream::with_contents(vec![0u8; 100]);

        assert_eq!(stream.seek(SeekFrom::Start(40)).unwrap(), 40);
        assert_eq!(stream.seek(SeekFrom::Current(10)).unwrap(), 50);
        assert_eq!(stream.seek(SeekFrom::End(-20)).unwrap(), 80);
        assert!(stream.seek(SeekFrom::Current(-200)).is_err());
        assert_eq!(stream.byte_len(), Some(100));
    }

    #[test]
    fn stream_write_past_end_grows() {
        let mut stream = MemoryStream::new();
        stream.seek(SeekFrom::Start(4)).unwrap();
        assert_eq!(stream.write(&[7u8; 4]).unwrap(), 4);
        assert_eq!(stream.len(), 8);
        assert_eq!(stream.contents(), vec![0, 0, 0, 0, 7, 7, 7, 7]);
    }

    #[test]
    fn stream_read_at_end_reports_zero() {
        let mut stream = MemoryStream::with_contents(vec![1, 2, 3]);
        stream.seek(SeekFrom::End(0)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }
}
