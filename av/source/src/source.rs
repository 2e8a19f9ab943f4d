/*!
    Container input, from files or caller-supplied streams.
*/

use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr;
use std::time::Duration;

use ffmpeg_next::ffi;
use ffmpeg_next::packet::Mut as PacketMut;

use av_io::{AttachOptions, IoBinding, IoContext, IoRegistry, check_ffmpeg};
use av_types::{Error, Result};

/**
    One open input container.

    Wraps an `AVFormatContext` opened for reading, positioned on its best
    audio stream. When opened over a custom binding, the attached I/O
    context is kept alive here and released only after the format context
    has been closed.
*/
pub struct Source {
    fmt_ctx: *mut ffi::AVFormatContext,
    // Dropped after the format context is closed; order matters.
    io: Option<IoContext>,
    audio_stream: usize,
}

// SAFETY: all FFmpeg calls on the context happen through &mut self; the
// raw pointer is never shared outside this value.
unsafe impl Send for Source {}

impl Source {
    /**
        Open a container from a file path.
    */
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let c_path = to_cstring(
            path.to_str()
                .ok_or_else(|| Error::invalid_data("non-UTF-8 path"))?,
        )?;

        let mut fmt_ctx: *mut ffi::AVFormatContext = ptr::null_mut();
        let ret =
            unsafe { ffi::avformat_open_input(&mut fmt_ctx, c_path.as_ptr(), ptr::null(), ptr::null_mut()) };
        check_ffmpeg(ret, "avformat_open_input")?;

        let audio_stream = prepare(&mut fmt_ctx)?;
        tracing::info!(path = %path.display(), audio_stream, "input opened");

        Ok(Self {
            fmt_ctx,
            io: None,
            audio_stream,
        })
    }

    /**
        Open a container whose bytes come from a caller-supplied binding.

        The binding is attached to `registry` for the lifetime of this
        source; `options.mode` must enable reading.
    */
    pub fn from_binding(
        registry: &IoRegistry,
        binding: IoBinding,
        options: AttachOptions,
    ) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let mut io = registry.attach(binding, options)?;

        let mut fmt_ctx = unsafe { ffi::avformat_alloc_context() };
        if fmt_ctx.is_null() {
            let code = ffi::AVERROR(ffi::ENOMEM);
            return Err(Error::ffmpeg("avformat_alloc_context", code, av_io::strerror(code)));
        }

        // The context does not own the I/O context; AVFMT_FLAG_CUSTOM_IO
        // keeps avformat_close_input away from it.
        unsafe {
            (*fmt_ctx).pb = io.as_mut_ptr();
            (*fmt_ctx).flags |= ffi::AVFMT_FLAG_CUSTOM_IO;
        }

        let ret =
            unsafe { ffi::avformat_open_input(&mut fmt_ctx, c"".as_ptr(), ptr::null(), ptr::null_mut()) };
        // On failure the context is already freed; the attach is undone
        // when `io` drops.
        check_ffmpeg(ret, "avformat_open_input")?;

        let audio_stream = prepare(&mut fmt_ctx)?;
        tracing::info!(handle = %io.handle(), audio_stream, "custom input opened");

        Ok(Self {
            fmt_ctx,
            io: Some(io),
            audio_stream,
        })
    }

    /**
        Short name of the detected container format.
    */
    pub fn format_name(&self) -> String {
        unsafe {
            let iformat = (*self.fmt_ctx).iformat;
            if iformat.is_null() || (*iformat).name.is_null() {
                return "unknown".to_string();
            }
            CStr::from_ptr((*iformat).name)
                .to_string_lossy()
                .into_owned()
        }
    }

    /**
        Number of streams in the container.
    */
    pub fn stream_count(&self) -> usize {
        unsafe { (*self.fmt_ctx).nb_streams as usize }
    }

    /**
        Container duration, if known.
    */
    pub fn duration(&self) -> Option<Duration> {
        let raw = unsafe { (*self.fmt_ctx).duration };
        // AV_TIME_BASE units are microseconds.
        (raw > 0).then(|| Duration::from_micros(raw as u64))
    }

    /**
        Index of the selected audio stream.
    */
    pub fn audio_stream_index(&self) -> usize {
        self.audio_stream
    }

    /**
        Time base of the selected audio stream.
    */
    pub fn audio_time_base(&self) -> ffmpeg_next::Rational {
        unsafe { (*self.audio_stream_ptr()).time_base }.into()
    }

    /**
        Name of the audio stream's codec.
    */
    pub fn audio_codec_name(&self) -> String {
        unsafe {
            let codec_id = (*(*self.audio_stream_ptr()).codecpar).codec_id;
            CStr::from_ptr(ffi::avcodec_get_name(codec_id))
                .to_string_lossy()
                .into_owned()
        }
    }

    /**
        Copy of the audio stream's codec parameters, for decoder setup.
    */
    pub fn audio_codec_parameters(&self) -> Result<ffmpeg_next::codec::Parameters> {
        let mut parameters = ffmpeg_next::codec::Parameters::new();
        let ret = unsafe {
            ffi::avcodec_parameters_copy(
                parameters.as_mut_ptr(),
                (*self.audio_stream_ptr()).codecpar,
            )
        };
        check_ffmpeg(ret, "avcodec_parameters_copy")?;
        Ok(parameters)
    }

    /**
        Read the next packet of the audio stream.

        Packets belonging to other streams are skipped. Returns `Ok(None)`
        at end of stream.
    */
    pub fn read_packet(&mut self) -> Result<Option<ffmpeg_next::Packet>> {
        let mut packet = ffmpeg_next::Packet::empty();
        loop {
            let ret = unsafe { ffi::av_read_frame(self.fmt_ctx, packet.as_mut_ptr()) };
            if ret == ffi::AVERROR_EOF {
                return Ok(None);
            }
            check_ffmpeg(ret, "av_read_frame")?;

            if packet.stream() == self.audio_stream {
                return Ok(Some(packet));
            }
            unsafe { ffi::av_packet_unref(packet.as_mut_ptr()) };
        }
    }

    /**
        Dump the container layout to the log, the way `ffprobe` would.
    */
    pub fn dump(&self, label: &str) {
        if let Ok(c_label) = CString::new(label) {
            unsafe { ffi::av_dump_format(self.fmt_ctx, 0, c_label.as_ptr(), 0) };
        }
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        unsafe {
            if !self.fmt_ctx.is_null() {
                ffi::avformat_close_input(&mut self.fmt_ctx);
            }
        }
        // self.io drops after this body, once the format context is gone.
        tracing::debug!("input closed");
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("format", &self.format_name())
            .field("streams", &self.stream_count())
            .field("audio_stream", &self.audio_stream)
            .field("custom_io", &self.io.is_some())
            .finish()
    }
}

impl Source {
    fn audio_stream_ptr(&self) -> *mut ffi::AVStream {
        unsafe { *(*self.fmt_ctx).streams.add(self.audio_stream) }
    }
}

/**
    Probe the streams of a freshly opened context and pick the best audio
    stream. Closes the context on failure.
*/
fn prepare(fmt_ctx: &mut *mut ffi::AVFormatContext) -> Result<usize> {
    let ret = unsafe { ffi::avformat_find_stream_info(*fmt_ctx, ptr::null_mut()) };
    if ret < 0 {
        unsafe { ffi::avformat_close_input(fmt_ctx) };
        check_ffmpeg(ret, "avformat_find_stream_info")?;
    }

    let stream_index = unsafe {
        ffi::av_find_best_stream(
            *fmt_ctx,
            ffi::AVMediaType::AVMEDIA_TYPE_AUDIO,
            -1,
            -1,
            ptr::null_mut(),
            0,
        )
    };
    if stream_index < 0 {
        unsafe { ffi::avformat_close_input(fmt_ctx) };
        return Err(Error::invalid_data("no audio stream in input"));
    }

    Ok(stream_index as usize)
}

fn to_cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| Error::invalid_data("path contains a NUL byte"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use av_io::MemorySource;

    #[test]
    fn garbage_bytes_are_rejected_not_crashed() {
        let registry = IoRegistry::new();
        let binding = IoBinding::reader(MemorySource::new(vec![0u8; 256]));
        let result = Source::from_binding(&registry, binding, AttachOptions::read());
        assert!(result.is_err());
        // The failed open must not leak its registry entry.
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = Source::open("/nonexistent/path/to/nothing.mp3");
        assert!(result.is_err());
    }

    #[test]
    fn nul_in_path_is_rejected() {
        assert!(to_cstring("bad\0path").is_err());
        assert!(to_cstring("fine").is_ok());
    }
}
