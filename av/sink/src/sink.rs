/*!
    Container muxer, writing to files or caller-supplied streams.
*/

use std::ffi::{CString, c_int};
use std::path::Path;
use std::ptr;

use ffmpeg_next::{ffi, packet::Mut as PacketMut};

use av_io::{AttachOptions, IoBinding, IoContext, IoRegistry, check_ffmpeg, strerror};
use av_types::{Error, Result};

use crate::config::ContainerFormat;
use crate::encode::AudioEncoder;

/**
    One open output container.

    Wraps an `AVFormatContext` opened for writing. The lifecycle is
    explicit: add the stream, `write_header`, write packets, `finish`.
    When writing through a custom binding, the attached I/O context is kept
    alive here and released after the format context is freed.
*/
pub struct Sink {
    fmt_ctx: *mut ffi::AVFormatContext,
    // Dropped after the format context is freed; order matters.
    io: Option<IoContext>,
    /// An avio handle we opened ourselves and must close.
    file_backed: bool,
    stream_index: usize,
    stream_time_base: ffi::AVRational,
    header_written: bool,
    trailer_written: bool,
}

// SAFETY: all FFmpeg calls on the context happen through &mut self; the
// raw pointer is never shared outside this value.
unsafe impl Send for Sink {}

impl Sink {
    /**
        Create an output container at `path`, format guessed from the
        extension.
    */
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let c_path = to_cstring(
            path.to_str()
                .ok_or_else(|| Error::invalid_data("non-UTF-8 path"))?,
        )?;

        let mut fmt_ctx: *mut ffi::AVFormatContext = ptr::null_mut();
        let ret = unsafe {
            ffi::avformat_alloc_output_context2(
                &mut fmt_ctx,
                ptr::null(),
                ptr::null(),
                c_path.as_ptr(),
            )
        };
        check_ffmpeg(ret, "avformat_alloc_output_context2")?;
        if fmt_ctx.is_null() {
            return Err(Error::invalid_data(format!(
                "no container format for {}",
                path.display()
            )));
        }

        let mut file_backed = false;
        unsafe {
            if (*(*fmt_ctx).oformat).flags & ffi::AVFMT_NOFILE == 0 {
                let ret =
                    ffi::avio_open(&mut (*fmt_ctx).pb, c_path.as_ptr(), ffi::AVIO_FLAG_WRITE);
                if ret < 0 {
                    ffi::avformat_free_context(fmt_ctx);
                    check_ffmpeg(ret, "avio_open")?;
                }
                file_backed = true;
            }
        }

        tracing::info!(path = %path.display(), "output opened");
        Ok(Self::wrap(fmt_ctx, None, file_backed))
    }

    /**
        Create an output container that writes through a caller-supplied
        binding.

        `options.mode` must enable writing, and `format` decides the muxer.
        Formats that patch their headers after the fact ([`ContainerFormat::needs_seek`])
        want a seekable binding; with a non-seekable one the muxer degrades
        or fails on its own terms.
    */
    pub fn from_binding(
        registry: &IoRegistry,
        binding: IoBinding,
        options: AttachOptions,
        format: ContainerFormat,
    ) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let mut io = registry.attach(binding, options)?;
        let c_format = to_cstring(format.ffmpeg_format_name())?;

        let mut fmt_ctx: *mut ffi::AVFormatContext = ptr::null_mut();
        let ret = unsafe {
            ffi::avformat_alloc_output_context2(
                &mut fmt_ctx,
                ptr::null(),
                c_format.as_ptr(),
                ptr::null(),
            )
        };
        check_ffmpeg(ret, "avformat_alloc_output_context2")?;
        if fmt_ctx.is_null() {
            return Err(Error::invalid_data(format!(
                "no muxer for format {:?}",
                format
            )));
        }

        unsafe {
            (*fmt_ctx).pb = io.as_mut_ptr();
            (*fmt_ctx).flags |= ffi::AVFMT_FLAG_CUSTOM_IO;
        }

        tracing::info!(handle = %io.handle(), ?format, "custom output opened");
        Ok(Self::wrap(fmt_ctx, Some(io), false))
    }

    fn wrap(fmt_ctx: *mut ffi::AVFormatContext, io: Option<IoContext>, file_backed: bool) -> Self {
        Self {
            fmt_ctx,
            io,
            file_backed,
            stream_index: 0,
            stream_time_base: ffi::AVRational { num: 0, den: 1 },
            header_written: false,
            trailer_written: false,
        }
    }

    /**
        Returns true if the container wants codec parameters out-of-band.

        Pass the answer to [`AudioEncoder::new`] so the encoder emits a
        global header instead of in-band parameter sets.
    */
    pub fn needs_global_header(&self) -> bool {
        unsafe { (*(*self.fmt_ctx).oformat).flags & ffi::AVFMT_GLOBALHEADER != 0 }
    }

    /**
        Add the audio stream carrying this encoder's output.
    */
    pub fn add_audio_stream(&mut self, encoder: &AudioEncoder) -> Result<()> {
        unsafe {
            let stream = ffi::avformat_new_stream(self.fmt_ctx, ptr::null());
            if stream.is_null() {
                let code = ffi::AVERROR(ffi::ENOMEM);
                return Err(Error::ffmpeg("avformat_new_stream", code, strerror(code)));
            }

            let ret = ffi::avcodec_parameters_from_context((*stream).codecpar, encoder.as_ptr());
            check_ffmpeg(ret, "avcodec_parameters_from_context")?;

            (*stream).time_base = ffi::AVRational {
                num: 1,
                den: encoder.sample_rate(),
            };
            self.stream_index = (*stream).index as usize;
        }
        Ok(())
    }

    /**
        Write the container header.
    */
    pub fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        let ret = unsafe { ffi::avformat_write_header(self.fmt_ctx, ptr::null_mut()) };
        check_ffmpeg(ret, "avformat_write_header")?;

        // The muxer may adjust the stream time base during init.
        self.stream_time_base = unsafe { (*self.stream_ptr()).time_base };
        self.header_written = true;

        tracing::debug!(
            time_base_num = self.stream_time_base.num,
            time_base_den = self.stream_time_base.den,
            "container header written"
        );
        Ok(())
    }

    /**
        Write one encoded packet.

        `src_time_base` is the time base the packet's timestamps are in
        (the encoder's); they are rescaled to the stream time base here.
    */
    pub fn write(
        &mut self,
        packet: &mut ffmpeg_next::Packet,
        src_time_base: ffmpeg_next::Rational,
    ) -> Result<()> {
        if !self.header_written {
            return Err(Error::invalid_data("write before container header"));
        }
        unsafe {
            let pkt = packet.as_mut_ptr();
            (*pkt).stream_index = self.stream_index as c_int;
            ffi::av_packet_rescale_ts(pkt, src_time_base.into(), self.stream_time_base);
            let ret = ffi::av_interleaved_write_frame(self.fmt_ctx, pkt);
            check_ffmpeg(ret, "av_interleaved_write_frame")?;
        }
        Ok(())
    }

    /**
        Write the container trailer and flush the output.

        Without this the container is left unfinished; see the crate docs.
    */
    pub fn finish(&mut self) -> Result<()> {
        if !self.header_written || self.trailer_written {
            return Ok(());
        }
        let ret = unsafe { ffi::av_write_trailer(self.fmt_ctx) };
        check_ffmpeg(ret, "av_write_trailer")?;
        self.trailer_written = true;
        tracing::info!("container finalized");
        Ok(())
    }

    fn stream_ptr(&self) -> *mut ffi::AVStream {
        unsafe { *(*self.fmt_ctx).streams.add(self.stream_index) }
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        if self.header_written && !self.trailer_written {
            tracing::warn!("sink dropped without finish(); container trailer missing");
        }
        unsafe {
            if !self.fmt_ctx.is_null() {
                if self.file_backed && !(*self.fmt_ctx).pb.is_null() {
                    ffi::avio_closep(&mut (*self.fmt_ctx).pb);
                }
                ffi::avformat_free_context(self.fmt_ctx);
                self.fmt_ctx = ptr::null_mut();
            }
        }
        // self.io drops after this body, once the format context is gone.
        tracing::debug!("output closed");
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("custom_io", &self.io.is_some())
            .field("header_written", &self.header_written)
            .field("trailer_written", &self.trailer_written)
            .finish()
    }
}

fn to_cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| Error::invalid_data("string contains a NUL byte"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use av_io::MemoryStream;
    use av_types::ChannelLayout;
    use ffmpeg_next::frame::Audio as AudioFrame;

    use crate::config::EncoderConfig;

    fn silent_fltp(samples: usize, channels: i32, rate: i32) -> AudioFrame {
        let mut frame = AudioFrame::empty();
        unsafe {
            let ptr = frame.as_mut_ptr();
            (*ptr).nb_samples = samples as i32;
            (*ptr).sample_rate = rate;
            (*ptr).format = ffi::AVSampleFormat::AV_SAMPLE_FMT_FLTP as i32;
            ffi::av_channel_layout_default(&mut (*ptr).ch_layout, channels);
            assert!(ffi::av_frame_get_buffer(ptr, 0) >= 0);
            ffi::av_samples_set_silence(
                (*ptr).extended_data,
                0,
                samples as i32,
                channels,
                ffi::AVSampleFormat::AV_SAMPLE_FMT_FLTP,
            );
        }
        frame
    }

    /// Encode a short burst of silence into an in-memory MP4.
    #[test]
    fn muxes_into_a_memory_stream() {
        let registry = IoRegistry::new();
        let stream = MemoryStream::new();
        let tap = stream.clone();

        let mut sink = Sink::from_binding(
            &registry,
            IoBinding::seekable(stream),
            AttachOptions::write(),
            ContainerFormat::Mp4,
        )
        .unwrap();

        let config = EncoderConfig::new(44_100).with_channel_layout(ChannelLayout::Stereo);
        let mut encoder = AudioEncoder::new(&config, sink.needs_global_header()).unwrap();
        sink.add_audio_stream(&encoder).unwrap();
        sink.write_header().unwrap();

        for _ in 0..16 {
            let mut frame = silent_fltp(encoder.frame_size(), 2, 44_100);
            for mut packet in encoder.encode(&mut frame).unwrap() {
                sink.write(&mut packet, encoder.time_base()).unwrap();
            }
        }
        for mut packet in encoder.flush().unwrap() {
            sink.write(&mut packet, encoder.time_base()).unwrap();
        }
        sink.finish().unwrap();
        drop(sink);

        let bytes = tap.contents();
        assert!(!bytes.is_empty(), "muxer wrote nothing");
        // MP4 files start with an ftyp box shortly after the size field.
        assert_eq!(&bytes[4..8], b"ftyp");
        assert!(registry.is_empty(), "sink teardown must detach its binding");
    }

    #[test]
    fn write_before_header_is_rejected() {
        let registry = IoRegistry::new();
        let mut sink = Sink::from_binding(
            &registry,
            IoBinding::seekable(MemoryStream::new()),
            AttachOptions::write(),
            ContainerFormat::Adts,
        )
        .unwrap();

        let mut packet = ffmpeg_next::Packet::empty();
        assert!(sink.write(&mut packet, (1, 44_100).into()).is_err());
    }
}
