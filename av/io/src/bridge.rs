/*!
    Native callback trampolines and the attached I/O context.

    FFmpeg hands every callback the `opaque` pointer it was given at
    `avio_alloc_context` time. Here that pointer is a per-attachment cell
    holding a weak reference to the registry plus the stream handle; the
    binding itself is always recovered through the registry lookup, so a
    callback racing a detach resolves to a miss instead of touching freed
    caller state.
*/

use std::ffi::{c_int, c_void};
use std::io::SeekFrom;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use av_types::{Error, Result};
use ffmpeg_next::ffi;

use crate::binding::{AttachOptions, IoBinding};
use crate::handle::StreamHandle;
use crate::registry::{IoRegistry, RegistryState};
use crate::status::{error_to_averror, strerror};

// avio.h seek flags; the ffi constants carry an unsigned type.
const AVSEEK_SIZE: c_int = 0x10000;
const AVSEEK_FORCE: c_int = 0x20000;

/**
    Per-attachment state behind the `opaque` pointer.

    Owned by the [`IoContext`] and freed only after the native context is,
    so FFmpeg can never invoke a callback on a dangling cell.
*/
pub(crate) struct BridgeCell {
    pub(crate) registry: Weak<RegistryState>,
    pub(crate) handle: StreamHandle,
}

impl BridgeCell {
    /// Recover the cell and resolve its binding, if still registered.
    ///
    /// # Safety
    ///
    /// `opaque` must be the cell pointer installed at attach time, or null.
    unsafe fn resolve(opaque: *mut c_void) -> Option<crate::registry::SharedBinding> {
        if opaque.is_null() {
            return None;
        }
        let cell = unsafe { &*(opaque as *const BridgeCell) };
        cell.registry.upgrade()?.lookup(cell.handle)
    }
}

/**
    Read callback invoked by FFmpeg whenever the demuxer wants input bytes.

    A registry miss (detached handle, dropped registry) reports end of
    stream. A short read is success; zero available bytes are reported as
    `AVERROR_EOF`, never as a zero-byte success that would let the native
    layer poll forever.
*/
pub(crate) unsafe extern "C" fn read_trampoline(
    opaque: *mut c_void,
    buf: *mut u8,
    buf_size: c_int,
) -> c_int {
    panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        read_impl(opaque, buf, buf_size)
    }))
    .unwrap_or(ffi::AVERROR(ffi::EIO))
}

unsafe fn read_impl(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    if buf.is_null() || buf_size < 0 {
        return ffi::AVERROR(ffi::EINVAL);
    }
    if buf_size == 0 {
        return 0;
    }
    let Some(entry) = (unsafe { BridgeCell::resolve(opaque) }) else {
        return ffi::AVERROR_EOF;
    };

    // SAFETY: FFmpeg guarantees buf is valid for buf_size bytes.
    let out = unsafe { std::slice::from_raw_parts_mut(buf, buf_size as usize) };
    match entry.lock().read(out) {
        Ok(0) => ffi::AVERROR_EOF,
        Ok(n) => n as c_int,
        Err(e) => {
            let code = error_to_averror(&e);
            if code != ffi::AVERROR_EOF {
                tracing::warn!("read callback failed: {e}");
            }
            code
        }
    }
}

/**
    Write callback invoked by FFmpeg whenever the muxer emits output bytes.

    A registry miss drops the bytes and reports zero accepted. A binding
    accepting fewer bytes than offered is a write error — the bytes FFmpeg
    handed over cannot be silently truncated.
*/
pub(crate) unsafe extern "C" fn write_trampoline(
    opaque: *mut c_void,
    buf: *mut u8,
    buf_size: c_int,
) -> c_int {
    panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        write_impl(opaque, buf, buf_size)
    }))
    .unwrap_or(ffi::AVERROR(ffi::EIO))
}

unsafe fn write_impl(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    if buf_size < 0 || (buf.is_null() && buf_size > 0) {
        return ffi::AVERROR(ffi::EINVAL);
    }
    let Some(entry) = (unsafe { BridgeCell::resolve(opaque) }) else {
        return 0;
    };

    // SAFETY: FFmpeg guarantees buf is valid for buf_size bytes.
    let data = if buf_size == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(buf.cast_const(), buf_size as usize) }
    };
    match entry.lock().write(data) {
        Ok(n) if n == data.len() => n as c_int,
        Ok(n) => {
            tracing::warn!(
                accepted = n,
                offered = data.len(),
                "write callback accepted a partial buffer"
            );
            ffi::AVERROR(ffi::EIO)
        }
        Err(e) => {
            tracing::warn!("write callback failed: {e}");
            error_to_averror(&e)
        }
    }
}

/**
    Seek callback, wired only for seek-capable bindings.

    `AVSEEK_SIZE` answers the total stream size without moving the
    position; bindings that do not know their size report the operation as
    unsupported and leave the rest to the native layer.
*/
pub(crate) unsafe extern "C" fn seek_trampoline(
    opaque: *mut c_void,
    offset: i64,
    whence: c_int,
) -> i64 {
    panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        seek_impl(opaque, offset, whence)
    }))
    .unwrap_or(i64::from(ffi::AVERROR(ffi::EIO)))
}

unsafe fn seek_impl(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    let Some(entry) = (unsafe { BridgeCell::resolve(opaque) }) else {
        return i64::from(ffi::AVERROR(ffi::ENOSYS));
    };

    let whence = whence & !AVSEEK_FORCE;
    if whence == AVSEEK_SIZE {
        return match entry.lock().byte_len() {
            Some(len) => len as i64,
            None => i64::from(ffi::AVERROR(ffi::ENOSYS)),
        };
    }

    let pos = match whence {
        0 if offset < 0 => return i64::from(ffi::AVERROR(ffi::EINVAL)),
        0 => SeekFrom::Start(offset as u64),
        1 => SeekFrom::Current(offset),
        2 => SeekFrom::End(offset),
        _ => return i64::from(ffi::AVERROR(ffi::EINVAL)),
    };
    match entry.lock().seek(pos) {
        Ok(new_pos) => new_pos as i64,
        Err(e) => {
            if !e.is_unsupported() {
                tracing::warn!("seek callback failed: {e}");
            }
            i64::from(error_to_averror(&e))
        }
    }
}

type ReadFn = unsafe extern "C" fn(*mut c_void, *mut u8, c_int) -> c_int;
type WriteFn = unsafe extern "C" fn(*mut c_void, *mut u8, c_int) -> c_int;
type SeekFn = unsafe extern "C" fn(*mut c_void, i64, c_int) -> i64;

impl IoRegistry {
    /**
        Register `binding` and allocate a native I/O context wired to it.

        The callback slots of the returned context follow the attach
        contract: read is wired iff `options.mode` enables reading, write
        iff it enables writing, seek iff the binding declares seek support.
        A mode the binding cannot serve is rejected up front.

        The returned [`IoContext`] must outlive the format context it is
        installed into; dropping it detaches the binding and frees the
        native context.
    */
    pub fn attach(&self, binding: IoBinding, options: AttachOptions) -> Result<IoContext> {
        if options.buffer_size == 0 {
            return Err(Error::invalid_data("scratch buffer size must be nonzero"));
        }
        let mode = options.mode;
        if mode.allows_read() && !binding.can_read() {
            return Err(Error::unsupported("read mode on a non-readable binding"));
        }
        if mode.allows_write() && !binding.can_write() {
            return Err(Error::unsupported("write mode on a non-writable binding"));
        }

        let wire_seek = binding.can_seek();
        let handle = self.state.bind(binding);
        let cell = Box::into_raw(Box::new(BridgeCell {
            registry: Arc::downgrade(&self.state),
            handle,
        }));

        // SAFETY: scratch buffer ownership transfers to the AVIOContext;
        // both are released together in IoContext::drop.
        let ctx = unsafe {
            let buffer = ffi::av_malloc(options.buffer_size) as *mut u8;
            if buffer.is_null() {
                self.state.remove(handle);
                drop(Box::from_raw(cell));
                let code = ffi::AVERROR(ffi::ENOMEM);
                return Err(Error::ffmpeg("av_malloc", code, strerror(code)));
            }

            let read_cb: Option<ReadFn> = mode.allows_read().then_some(read_trampoline as ReadFn);
            let write_cb: Option<WriteFn> =
                mode.allows_write().then_some(write_trampoline as WriteFn);
            let seek_cb: Option<SeekFn> = wire_seek.then_some(seek_trampoline as SeekFn);

            let ctx = ffi::avio_alloc_context(
                buffer.cast(),
                options.buffer_size as c_int,
                c_int::from(mode.allows_write()),
                cell as *mut c_void,
                read_cb,
                write_cb,
                seek_cb,
            );
            if ctx.is_null() {
                ffi::av_free(buffer.cast());
                self.state.remove(handle);
                drop(Box::from_raw(cell));
                let code = ffi::AVERROR(ffi::ENOMEM);
                return Err(Error::ffmpeg("avio_alloc_context", code, strerror(code)));
            }
            ctx
        };

        tracing::debug!(
            %handle,
            buffer_size = options.buffer_size,
            ?mode,
            seekable = wire_seek,
            "custom I/O context attached"
        );

        Ok(IoContext {
            ctx,
            cell,
            handle,
            registry: Arc::downgrade(&self.state),
        })
    }
}

/**
    An attached native I/O context.

    Install [`IoContext::as_mut_ptr`] as a format context's `pb` (together
    with `AVFMT_FLAG_CUSTOM_IO`) before opening it, and keep this value
    alive until the format context has been closed. Dropping it detaches
    the binding from the registry and frees the native context and its
    scratch buffer.
*/
pub struct IoContext {
    ctx: *mut ffi::AVIOContext,
    cell: *mut BridgeCell,
    handle: StreamHandle,
    registry: Weak<RegistryState>,
}

// SAFETY: the raw pointers are owned exclusively by this value; FFmpeg
// accesses them only while the owning format context is alive, and all
// shared state behind them is lock-protected.
unsafe impl Send for IoContext {}

impl IoContext {
    /**
        The handle this context is registered under.
    */
    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    /**
        Pointer to the native context, for installation into a format
        context's `pb` field.
    */
    pub fn as_mut_ptr(&mut self) -> *mut ffi::AVIOContext {
        self.ctx
    }
}

impl Drop for IoContext {
    fn drop(&mut self) {
        // Detach first so late callbacks resolve to a miss, then free the
        // native context. FFmpeg may have replaced the scratch buffer, so
        // free whatever the context currently points at.
        if let Some(state) = self.registry.upgrade() {
            state.remove(self.handle);
        }
        unsafe {
            if !self.ctx.is_null() {
                ffi::av_freep(std::ptr::addr_of_mut!((*self.ctx).buffer).cast());
                ffi::avio_context_free(&mut self.ctx);
            }
            drop(Box::from_raw(self.cell));
        }
        tracing::debug!(handle = %self.handle, "custom I/O context released");
    }
}

impl std::fmt::Debug for IoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoContext")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::OutputStream;
    use crate::memory::{MemorySink, MemorySource, MemoryStream};

    fn make_cell(registry: &IoRegistry, binding: IoBinding) -> (StreamHandle, Box<BridgeCell>) {
        let handle = registry.state.bind(binding);
        let cell = Box::new(BridgeCell {
            registry: Arc::downgrade(&registry.state),
            handle,
        });
        (handle, cell)
    }

    fn opaque(cell: &mut BridgeCell) -> *mut c_void {
        cell as *mut BridgeCell as *mut c_void
    }

    #[test]
    fn chunked_reads_then_eof() {
        let registry = IoRegistry::new();
        let data: Vec<u8> = (0u8..10).collect();
        let (_, mut cell) = make_cell(&registry, IoBinding::reader(MemorySource::new(data)));

        let mut buf = [0u8; 4];
        let counts: Vec<c_int> = (0..4)
            .map(|_| unsafe { read_trampoline(opaque(&mut cell), buf.as_mut_ptr(), 4) })
            .collect();
        assert_eq!(counts[0], 4);
        assert_eq!(counts[1], 4);
        assert_eq!(counts[2], 2);
        assert_eq!(counts[3], ffi::AVERROR_EOF);
    }

    #[test]
    fn short_read_reports_what_is_available() {
        let registry = IoRegistry::new();
        let (_, mut cell) = make_cell(&registry, IoBinding::reader(MemorySource::new(vec![1, 2, 3])));

        let mut buf = [0u8; 8];
        let n = unsafe { read_trampoline(opaque(&mut cell), buf.as_mut_ptr(), 8) };
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn read_after_detach_is_eof() {
        let registry = IoRegistry::new();
        let (handle, mut cell) =
            make_cell(&registry, IoBinding::reader(MemorySource::new(vec![1, 2, 3])));
        registry.detach(handle).unwrap();

        let mut buf = [0u8; 4];
        let n = unsafe { read_trampoline(opaque(&mut cell), buf.as_mut_ptr(), 4) };
        assert_eq!(n, ffi::AVERROR_EOF);
    }

    #[test]
    fn read_after_registry_drop_is_eof() {
        let registry = IoRegistry::new();
        let (_, mut cell) = make_cell(&registry, IoBinding::reader(MemorySource::new(vec![1])));
        drop(registry);

        let mut buf = [0u8; 4];
        let n = unsafe { read_trampoline(opaque(&mut cell), buf.as_mut_ptr(), 4) };
        assert_eq!(n, ffi::AVERROR_EOF);
    }

    #[test]
    fn writes_accumulate_and_zero_length_is_a_noop() {
        let registry = IoRegistry::new();
        let sink = MemorySink::new();
        let tap = sink.clone();
        let (_, mut cell) = make_cell(&registry, IoBinding::writer(sink));

        let first = vec![0xAAu8; 100];
        let second = vec![0xBBu8; 50];
        unsafe {
            assert_eq!(write_trampoline(opaque(&mut cell), first.as_ptr().cast_mut(), 100), 100);
            assert_eq!(write_trampoline(opaque(&mut cell), second.as_ptr().cast_mut(), 50), 50);
            assert_eq!(write_trampoline(opaque(&mut cell), first.as_ptr().cast_mut(), 0), 0);
        }
        assert_eq!(tap.len(), 150);
    }

    #[test]
    fn write_after_detach_is_dropped() {
        let registry = IoRegistry::new();
        let sink = MemorySink::new();
        let tap = sink.clone();
        let (handle, mut cell) = make_cell(&registry, IoBinding::writer(sink));
        registry.detach(handle).unwrap();

        let data = [1u8, 2, 3];
        let n = unsafe { write_trampoline(opaque(&mut cell), data.as_ptr().cast_mut(), 3) };
        assert_eq!(n, 0);
        assert!(tap.is_empty());
    }

    #[test]
    fn partial_write_surfaces_an_error() {
        struct Stingy;
        impl OutputStream for Stingy {
            fn write(&mut self, data: &[u8]) -> Result<usize> {
                Ok(data.len() / 2)
            }
        }

        let registry = IoRegistry::new();
        let (_, mut cell) = make_cell(&registry, IoBinding::writer(Stingy));

        let data = [0u8; 64];
        let n = unsafe { write_trampoline(opaque(&mut cell), data.as_ptr().cast_mut(), 64) };
        assert_eq!(n, ffi::AVERROR(ffi::EIO));
    }

    #[test]
    fn panicking_stream_is_contained() {
        struct Exploding;
        impl OutputStream for Exploding {
            fn write(&mut self, _data: &[u8]) -> Result<usize> {
                panic!("stream blew up");
            }
        }

        let registry = IoRegistry::new();
        let (_, mut cell) = make_cell(&registry, IoBinding::writer(Exploding));

        let data = [0u8; 8];
        let n = unsafe { write_trampoline(opaque(&mut cell), data.as_ptr().cast_mut(), 8) };
        assert_eq!(n, ffi::AVERROR(ffi::EIO));
    }

    #[test]
    fn size_query_does_not_move_the_position() {
        let registry = IoRegistry::new();
        let stream = MemoryStream::with_contents((0u8..10).collect());
        let (_, mut cell) = make_cell(&registry, IoBinding::seekable(stream));

        let size = unsafe { seek_trampoline(opaque(&mut cell), 0, AVSEEK_SIZE) };
        assert_eq!(size, 10);

        let mut buf = [0u8; 4];
        let n = unsafe { read_trampoline(opaque(&mut cell), buf.as_mut_ptr(), 4) };
        assert_eq!(n, 4);
        assert_eq!(&buf, &[0, 1, 2, 3]);
    }

    #[test]
    fn size_query_without_a_known_size_is_unsupported() {
        use crate::binding::{InputStream, RandomAccess};

        // A seekable stream that cannot answer the size query, e.g. a
        // forward-readable pipe with limited rewind.
        struct SizelessStream {
            pos: u64,
        }
        impl InputStream for SizelessStream {
            fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
                Ok(0)
            }
        }
        impl crate::binding::OutputStream for SizelessStream {
            fn write(&mut self, data: &[u8]) -> Result<usize> {
                Ok(data.len())
            }
        }
        impl RandomAccess for SizelessStream {
            fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
                if let SeekFrom::Start(p) = pos {
                    self.pos = p;
                }
                Ok(self.pos)
            }
            fn byte_len(&self) -> Option<u64> {
                None
            }
        }

        let registry = IoRegistry::new();
        let (_, mut cell) =
            make_cell(&registry, IoBinding::seekable(SizelessStream { pos: 0 }));

        unsafe {
            assert_eq!(
                seek_trampoline(opaque(&mut cell), 0, AVSEEK_SIZE),
                i64::from(ffi::AVERROR(ffi::ENOSYS))
            );
            // Ordinary seeks still work.
            assert_eq!(seek_trampoline(opaque(&mut cell), 16, 0), 16);
        }
    }

    #[test]
    fn seek_whence_variants() {
        let registry = IoRegistry::new();
        let stream = MemoryStream::with_contents(vec![0u8; 100]);
        let (_, mut cell) = make_cell(&registry, IoBinding::seekable(stream));

        unsafe {
            assert_eq!(seek_trampoline(opaque(&mut cell), 40, 0), 40);
            assert_eq!(seek_trampoline(opaque(&mut cell), 10, 1), 50);
            assert_eq!(seek_trampoline(opaque(&mut cell), -20, 2), 80);
            // The force bit is transport advice, not a whence value.
            assert_eq!(seek_trampoline(opaque(&mut cell), 5, AVSEEK_FORCE), 5);
        }
    }

    #[test]
    fn seek_rejects_bad_requests() {
        let registry = IoRegistry::new();
        let stream = MemoryStream::with_contents(vec![0u8; 10]);
        let (_, mut cell) = make_cell(&registry, IoBinding::seekable(stream));

        unsafe {
            assert_eq!(
                seek_trampoline(opaque(&mut cell), -1, 0),
                i64::from(ffi::AVERROR(ffi::EINVAL))
            );
            assert_eq!(
                seek_trampoline(opaque(&mut cell), 0, 9),
                i64::from(ffi::AVERROR(ffi::EINVAL))
            );
        }
    }

    #[test]
    fn seek_on_non_seekable_binding_is_unsupported() {
        let registry = IoRegistry::new();
        let (_, mut cell) = make_cell(&registry, IoBinding::reader(MemorySource::new(vec![1])));

        let n = unsafe { seek_trampoline(opaque(&mut cell), 0, 0) };
        assert_eq!(n, i64::from(ffi::AVERROR(ffi::ENOSYS)));
    }

    #[test]
    fn seek_after_detach_is_unsupported() {
        let registry = IoRegistry::new();
        let (handle, mut cell) =
            make_cell(&registry, IoBinding::seekable(MemoryStream::new()));
        registry.detach(handle).unwrap();

        let n = unsafe { seek_trampoline(opaque(&mut cell), 0, 0) };
        assert_eq!(n, i64::from(ffi::AVERROR(ffi::ENOSYS)));
    }

    #[test]
    fn attach_rejects_mode_the_binding_cannot_serve() {
        let registry = IoRegistry::new();

        let err = registry
            .attach(
                IoBinding::reader(MemorySource::new(vec![1])),
                AttachOptions::write(),
            )
            .unwrap_err();
        assert!(err.is_unsupported());
        assert!(registry.is_empty());

        let err = registry
            .attach(IoBinding::writer(MemorySink::new()), AttachOptions::read())
            .unwrap_err();
        assert!(err.is_unsupported());
        assert!(registry.is_empty());
    }

    #[test]
    fn attach_rejects_zero_buffer() {
        let registry = IoRegistry::new();
        let err = registry
            .attach(
                IoBinding::reader(MemorySource::new(vec![1])),
                AttachOptions::read().with_buffer_size(0),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData { .. }));
    }

    #[test]
    fn concurrent_attaches_are_independent() {
        let registry = IoRegistry::new();

        let contexts: Vec<IoContext> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8u8)
                .map(|i| {
                    let registry = &registry;
                    scope.spawn(move || {
                        registry
                            .attach(
                                IoBinding::reader(MemorySource::new(vec![i; 4])),
                                AttachOptions::read().with_buffer_size(1024),
                            )
                            .expect("concurrent attach should succeed")
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(registry.len(), 8);
        let mut handles: Vec<_> = contexts.iter().map(|c| c.handle()).collect();
        handles.sort();
        handles.dedup();
        assert_eq!(handles.len(), 8);
        for handle in &handles {
            assert!(registry.contains(*handle));
        }

        drop(contexts);
        assert!(registry.is_empty());
    }

    #[test]
    fn callback_slots_follow_mode_and_capability() {
        let registry = IoRegistry::new();

        let mut writer = registry
            .attach(
                IoBinding::seekable(MemoryStream::new()),
                AttachOptions::write(),
            )
            .unwrap();
        unsafe {
            let ctx = &*writer.as_mut_ptr();
            assert!(ctx.read_packet.is_none());
            assert!(ctx.write_packet.is_some());
            assert!(ctx.seek.is_some());
            assert_eq!(ctx.write_flag, 1);
        }

        let mut reader = registry
            .attach(
                IoBinding::reader(MemorySource::new(vec![1])),
                AttachOptions::read(),
            )
            .unwrap();
        unsafe {
            let ctx = &*reader.as_mut_ptr();
            assert!(ctx.read_packet.is_some());
            assert!(ctx.write_packet.is_none());
            assert!(ctx.seek.is_none());
            assert_eq!(ctx.write_flag, 0);
        }
    }

    #[test]
    fn attach_registers_and_drop_detaches() {
        let registry = IoRegistry::new();
        let io = registry
            .attach(
                IoBinding::reader(MemorySource::new(vec![1, 2, 3])),
                AttachOptions::read().with_buffer_size(4096),
            )
            .expect("attach should succeed");

        let handle = io.handle();
        assert!(registry.contains(handle));
        assert_eq!(registry.len(), 1);

        drop(io);
        assert!(!registry.contains(handle));
        assert!(registry.is_empty());
    }
}
