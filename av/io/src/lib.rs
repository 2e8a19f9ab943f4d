/*!
    Caller-driven I/O for the av crate family.

    FFmpeg normally pulls and pushes container bytes through its own file or
    network protocols. This crate replaces that path: a caller supplies the
    byte stream — an in-memory buffer, a network-backed reader, anything that
    can implement the stream traits — and FFmpeg's demuxer or muxer is wired
    to it through an `AVIOContext` whose callbacks land back here.

    # How it fits together

    - [`IoBinding`] - a caller-supplied stream, shaped as one of four
      capability variants (read-only, write-only, read-write,
      read-write-seekable), resolved once at attach time
    - [`IoRegistry`] - owns the set of live bindings, keyed by
      [`StreamHandle`]; safe to use from any thread, including threads
      FFmpeg spawns internally
    - [`IoContext`] - the attached native context; install its pointer as a
      format context's `pb` before opening, and keep it alive until the
      format context is gone

    # Example

    ```ignore
    use av_io::{AttachOptions, IoBinding, IoRegistry, MemorySource};

    let registry = IoRegistry::new();
    let binding = IoBinding::reader(MemorySource::new(container_bytes));
    let io = registry.attach(binding, AttachOptions::read())?;
    // hand io.as_mut_ptr() to the demuxer, keep `io` alive until it closes
    ```

    # Failure behavior at the native boundary

    Every callback failure is reported to FFmpeg through its own negative
    status codes (`AVERROR_EOF`, `AVERROR(EIO)`, `AVERROR(ENOSYS)`,
    `AVERROR(EINVAL)`). A callback arriving after detach finds no registry
    entry and reports end-of-stream (read), zero bytes accepted (write), or
    unsupported (seek) — it never faults the native call stack, and panics
    in caller-supplied stream code are caught before they can unwind into it.
*/

mod binding;
mod bridge;
mod handle;
mod memory;
mod registry;
mod status;

pub use binding::{
    AttachOptions, DuplexStream, InputStream, IoBinding, IoMode, OutputStream, RandomAccess,
    SeekableStream,
};
pub use bridge::IoContext;
pub use handle::StreamHandle;
pub use memory::{MemorySink, MemorySource, MemoryStream};
pub use registry::IoRegistry;
pub use status::{check_ffmpeg, strerror};
