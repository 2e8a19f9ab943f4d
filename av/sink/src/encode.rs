/*!
    AAC audio encoder.
*/

use std::ffi::c_int;
use std::ptr;

use ffmpeg_next::{ffi, frame::Audio as AudioFrame, packet::Mut as PacketMut};

use av_io::{check_ffmpeg, strerror};
use av_types::{Error, Result};

use crate::config::EncoderConfig;

/**
    Audio encoder producing AAC packets.

    Frames must arrive in the encoder's input format (planar float, see
    [`AudioEncoder::sample_format`]) and carry exactly
    [`AudioEncoder::frame_size`] samples — except the last one, which may
    be shorter. Presentation timestamps are stamped here, counted in
    samples, so callers only deliver frames in order.
*/
pub struct AudioEncoder {
    ctx: *mut ffi::AVCodecContext,
    next_pts: i64,
}

// SAFETY: the codec context is owned exclusively by this value and only
// used through &mut self.
unsafe impl Send for AudioEncoder {}

impl AudioEncoder {
    /**
        Open an AAC encoder.

        # Arguments

        * `config` - Output rate, layout, and bit rate
        * `with_global_header` - Set when the target container wants codec
          parameters out-of-band (MP4/MKV); ask the sink via
          [`crate::Sink::needs_global_header`]
    */
    pub fn new(config: &EncoderConfig, with_global_header: bool) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let codec =
            unsafe { ffi::avcodec_find_encoder(ffi::AVCodecID::AV_CODEC_ID_AAC) };
        if codec.is_null() {
            return Err(Error::unsupported("no AAC encoder in this FFmpeg build"));
        }

        let mut ctx = unsafe { ffi::avcodec_alloc_context3(codec) };
        if ctx.is_null() {
            let code = ffi::AVERROR(ffi::ENOMEM);
            return Err(Error::ffmpeg("avcodec_alloc_context3", code, strerror(code)));
        }

        unsafe {
            ffi::av_channel_layout_default(
                &mut (*ctx).ch_layout,
                c_int::from(config.channel_layout.channels()),
            );
            (*ctx).sample_rate = config.sample_rate as c_int;
            // The native AAC encoder takes planar float input only.
            (*ctx).sample_fmt = ffi::AVSampleFormat::AV_SAMPLE_FMT_FLTP;
            (*ctx).bit_rate = config.bit_rate as i64;
            (*ctx).time_base = ffi::AVRational {
                num: 1,
                den: config.sample_rate as c_int,
            };
            // The native AAC encoder is still gated behind the
            // experimental compliance level.
            (*ctx).strict_std_compliance = ffi::FF_COMPLIANCE_EXPERIMENTAL;
            if with_global_header {
                (*ctx).flags |= ffi::AV_CODEC_FLAG_GLOBAL_HEADER as c_int;
            }

            let ret = ffi::avcodec_open2(ctx, codec, ptr::null_mut());
            if ret < 0 {
                ffi::avcodec_free_context(&mut ctx);
                check_ffmpeg(ret, "avcodec_open2")?;
            }
        }

        tracing::info!(
            sample_rate = config.sample_rate,
            channels = config.channel_layout.channels(),
            bit_rate = config.bit_rate,
            "AAC encoder opened"
        );

        Ok(Self { ctx, next_pts: 0 })
    }

    /**
        Number of samples the encoder wants per frame.
    */
    pub fn frame_size(&self) -> usize {
        let size = unsafe { (*self.ctx).frame_size };
        size.max(1) as usize
    }

    /**
        Output sample rate.
    */
    pub fn sample_rate(&self) -> i32 {
        unsafe { (*self.ctx).sample_rate }
    }

    /**
        Number of output channels.
    */
    pub fn channels(&self) -> i32 {
        unsafe { (*self.ctx).ch_layout.nb_channels }
    }

    /**
        The sample format frames must arrive in.
    */
    pub fn sample_format(&self) -> ffi::AVSampleFormat {
        unsafe { (*self.ctx).sample_fmt }
    }

    /**
        Time base of the packets this encoder produces (1/sample_rate).
    */
    pub fn time_base(&self) -> ffmpeg_next::Rational {
        unsafe { (*self.ctx).time_base }.into()
    }

    pub(crate) fn as_ptr(&self) -> *const ffi::AVCodecContext {
        self.ctx
    }

    /**
        Encode one frame, returning any packets that became ready.

        The frame's timestamp is assigned here from the running sample
        count.
    */
    pub fn encode(&mut self, frame: &mut AudioFrame) -> Result<Vec<ffmpeg_next::Packet>> {
        if frame.samples() == 0 {
            return Ok(Vec::new());
        }
        frame.set_pts(Some(self.next_pts));
        self.next_pts += frame.samples() as i64;

        let ret = unsafe { ffi::avcodec_send_frame(self.ctx, frame.as_ptr()) };
        check_ffmpeg(ret, "avcodec_send_frame")?;
        self.receive_packets()
    }

    /**
        Drain the encoder at end of stream.
    */
    pub fn flush(&mut self) -> Result<Vec<ffmpeg_next::Packet>> {
        let ret = unsafe { ffi::avcodec_send_frame(self.ctx, ptr::null()) };
        if ret != ffi::AVERROR_EOF {
            check_ffmpeg(ret, "avcodec_send_frame")?;
        }
        self.receive_packets()
    }

    fn receive_packets(&mut self) -> Result<Vec<ffmpeg_next::Packet>> {
        let mut packets = Vec::new();
        loop {
            let mut packet = ffmpeg_next::Packet::empty();
            let ret = unsafe { ffi::avcodec_receive_packet(self.ctx, packet.as_mut_ptr()) };
            if ret == ffi::AVERROR(ffi::EAGAIN) || ret == ffi::AVERROR_EOF {
                break;
            }
            check_ffmpeg(ret, "avcodec_receive_packet")?;
            packets.push(packet);
        }
        Ok(packets)
    }
}

impl Drop for AudioEncoder {
    fn drop(&mut self) {
        unsafe { ffi::avcodec_free_context(&mut self.ctx) };
        tracing::debug!("AAC encoder closed");
    }
}

impl std::fmt::Debug for AudioEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEncoder")
            .field("sample_rate", &self.sample_rate())
            .field("channels", &self.channels())
            .field("frame_size", &self.frame_size())
            .field("next_pts", &self.next_pts)
            .finish_non_exhaustive()
    }
}
