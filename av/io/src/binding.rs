/*!
    Stream traits and the binding sum type.
*/

use std::io::SeekFrom;

use av_types::{Error, Result};

/**
    A stream FFmpeg can pull bytes from.

    `read` fills as much of `buf` as is currently available and returns the
    number of bytes written. A short read is normal; returning `Ok(0)` (or
    `Err(Error::Eof)`) means the stream is exhausted and is reported to
    FFmpeg as end-of-stream.
*/
pub trait InputStream: Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/**
    A stream FFmpeg can push bytes into.

    `write` must accept the whole buffer; accepting fewer bytes than offered
    is surfaced to FFmpeg as a write error rather than a silent truncation.
    Zero-length writes are no-ops returning 0.
*/
pub trait OutputStream: Send {
    fn write(&mut self, data: &[u8]) -> Result<usize>;
}

/**
    A stream with a movable position.

    `byte_len` reports the total size of the underlying data if known; it
    backs FFmpeg's size query and must not move the stream position.
*/
pub trait RandomAccess: Send {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;
    fn byte_len(&self) -> Option<u64>;
}

/**
    A stream that supports both reading and writing.
*/
pub trait DuplexStream: InputStream + OutputStream {}

impl<T: InputStream + OutputStream> DuplexStream for T {}

/**
    A duplex stream with seek support.
*/
pub trait SeekableStream: DuplexStream + RandomAccess {}

impl<T: DuplexStream + RandomAccess> SeekableStream for T {}

/**
    A caller-supplied stream, shaped by capability.

    The variant is chosen once when the binding is created; callbacks are
    wired from it at attach time and never probe for extra capabilities
    afterwards.
*/
pub enum IoBinding {
    /// Bytes are pulled through `read` only.
    ReadOnly(Box<dyn InputStream>),
    /// Bytes are pushed through `write` only.
    WriteOnly(Box<dyn OutputStream>),
    /// Both directions, no repositioning.
    ReadWrite(Box<dyn DuplexStream>),
    /// Both directions plus seek and size queries.
    ReadWriteSeek(Box<dyn SeekableStream>),
}

impl IoBinding {
    /**
        Create a read-only binding.
    */
    pub fn reader(stream: impl InputStream + 'static) -> Self {
        Self::ReadOnly(Box::new(stream))
    }

    /**
        Create a write-only binding.
    */
    pub fn writer(stream: impl OutputStream + 'static) -> Self {
        Self::WriteOnly(Box::new(stream))
    }

    /**
        Create a read-write binding without seek support.
    */
    pub fn duplex(stream: impl DuplexStream + 'static) -> Self {
        Self::ReadWrite(Box::new(stream))
    }

    /**
        Create a read-write binding with seek support.
    */
    pub fn seekable(stream: impl SeekableStream + 'static) -> Self {
        Self::ReadWriteSeek(Box::new(stream))
    }

    /**
        Returns true if this binding can serve read callbacks.
    */
    pub fn can_read(&self) -> bool {
        matches!(self, Self::ReadOnly(_) | Self::ReadWrite(_) | Self::ReadWriteSeek(_))
    }

    /**
        Returns true if this binding can serve write callbacks.
    */
    pub fn can_write(&self) -> bool {
        matches!(self, Self::WriteOnly(_) | Self::ReadWrite(_) | Self::ReadWriteSeek(_))
    }

    /**
        Returns true if this binding can serve seek callbacks.
    */
    pub fn can_seek(&self) -> bool {
        matches!(self, Self::ReadWriteSeek(_))
    }

    /**
        Read into `buf`, if this binding is readable.
    */
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Self::ReadOnly(s) => s.read(buf),
            Self::ReadWrite(s) => s.read(buf),
            Self::ReadWriteSeek(s) => s.read(buf),
            Self::WriteOnly(_) => Err(Error::unsupported("read on write-only binding")),
        }
    }

    /**
        Write `data`, if this binding is writable.
    */
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        match self {
            Self::WriteOnly(s) => s.write(data),
            Self::ReadWrite(s) => s.write(data),
            Self::ReadWriteSeek(s) => s.write(data),
            Self::ReadOnly(_) => Err(Error::unsupported("write on read-only binding")),
        }
    }

    /**
        Reposition the stream, if this binding is seekable.
    */
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match self {
            Self::ReadWriteSeek(s) => s.seek(pos),
            _ => Err(Error::unsupported("seek on non-seekable binding")),
        }
    }

    /**
        Total size of the underlying data, if this binding is seekable and
        its size is known.
    */
    pub fn byte_len(&self) -> Option<u64> {
        match self {
            Self::ReadWriteSeek(s) => s.byte_len(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for IoBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            Self::ReadOnly(_) => "ReadOnly",
            Self::WriteOnly(_) => "WriteOnly",
            Self::ReadWrite(_) => "ReadWrite",
            Self::ReadWriteSeek(_) => "ReadWriteSeek",
        };
        f.debug_tuple(variant).finish()
    }
}

/**
    Which callback directions the attached context exposes to FFmpeg.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoMode {
    /// Demuxer input: only the read callback is wired.
    Read,
    /// Muxer output: only the write callback is wired.
    Write,
    /// Both callbacks are wired.
    ReadWrite,
}

impl IoMode {
    /**
        Returns true if this mode wires the read callback.
    */
    pub const fn allows_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /**
        Returns true if this mode wires the write callback.
    */
    pub const fn allows_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/**
    Options for attaching a binding.
*/
#[derive(Clone, Copy, Debug)]
pub struct AttachOptions {
    /// Size of the scratch buffer FFmpeg reads into / writes out of.
    pub buffer_size: usize,
    /// Callback directions to expose.
    pub mode: IoMode,
}

impl AttachOptions {
    /// Scratch buffer size used when none is specified, in bytes.
    pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

    /**
        Options for a demuxer input context.
    */
    pub fn read() -> Self {
        Self {
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            mode: IoMode::Read,
        }
    }

    /**
        Options for a muxer output context.
    */
    pub fn write() -> Self {
        Self {
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            mode: IoMode::Write,
        }
    }

    /**
        Options for a context wired in both directions.
    */
    pub fn read_write() -> Self {
        Self {
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            mode: IoMode::ReadWrite,
        }
    }

    /**
        Override the scratch buffer size.
    */
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemorySink, MemorySource, MemoryStream};

    #[test]
    fn binding_capabilities() {
        let read = IoBinding::reader(MemorySource::new(vec![1, 2, 3]));
        assert!(read.can_read());
        assert!(!read.can_write());
        assert!(!read.can_seek());

        let write = IoBinding::writer(MemorySink::new());
        assert!(!write.can_read());
        assert!(write.can_write());
        assert!(!write.can_seek());

        let seekable = IoBinding::seekable(MemoryStream::new());
        assert!(seekable.can_read());
        assert!(seekable.can_write());
        assert!(seekable.can_seek());
    }

    #[test]
    fn duplex_binding_hides_seek_capability() {
        // The variant is what counts: a seek-capable stream bound as
        // plain read-write stays non-seekable for its whole lifetime.
        let mut duplex = IoBinding::duplex(MemoryStream::with_contents(vec![1, 2, 3]));
        assert!(duplex.can_read());
        assert!(duplex.can_write());
        assert!(!duplex.can_seek());

        let mut buf = [0u8; 3];
        assert_eq!(duplex.read(&mut buf).unwrap(), 3);
        assert_eq!(duplex.write(&[4, 5]).unwrap(), 2);
        assert_eq!(duplex.byte_len(), None);
        assert!(duplex.seek(SeekFrom::Start(0)).unwrap_err().is_unsupported());
    }

    #[test]
    fn wrong_direction_is_unsupported() {
        let mut read = IoBinding::reader(MemorySource::new(vec![1, 2, 3]));
        assert!(read.write(&[0]).unwrap_err().is_unsupported());
        assert!(read.seek(SeekFrom::Start(0)).unwrap_err().is_unsupported());
        assert_eq!(read.byte_len(), None);

        let mut write = IoBinding::writer(MemorySink::new());
        assert!(write.read(&mut [0u8; 4]).unwrap_err().is_unsupported());
    }

    #[test]
    fn mode_directions() {
        assert!(IoMode::Read.allows_read());
        assert!(!IoMode::Read.allows_write());
        assert!(IoMode::Write.allows_write());
        assert!(!IoMode::Write.allows_read());
        assert!(IoMode::ReadWrite.allows_read());
        assert!(IoMode::ReadWrite.allows_write());
    }

    #[test]
    fn attach_options_builder() {
        let options = AttachOptions::read().with_buffer_size(4096);
        assert_eq!(options.buffer_size, 4096);
        assert_eq!(options.mode, IoMode::Read);
        assert_eq!(AttachOptions::write().mode, IoMode::Write);
        assert_eq!(AttachOptions::read_write().mode, IoMode::ReadWrite);
    }
}
