/*!
    Audio decoder.
*/

use ffmpeg_next::{
    codec,
    ffi,
    frame::Audio as AudioFrame,
    packet::Ref as PacketRef,
};

use av_io::check_ffmpeg;
use av_types::{AudioParams, ChannelLayout, Error, Result, SampleFormat};

/**
    Audio decoder.

    Decodes compressed audio packets into frames. Frames are handed out in
    the codec's native sample format; use `av-transform` to bring them to
    the format the next stage wants.
*/
pub struct AudioDecoder {
    decoder: codec::decoder::Audio,
    time_base: ffmpeg_next::Rational,
}

impl AudioDecoder {
    /**
        Create a decoder from a stream's codec parameters.

        # Arguments

        * `parameters` - Codec parameters from [`crate::Source::audio_codec_parameters`]
        * `time_base` - Time base of the audio stream
    */
    pub fn new(
        parameters: codec::Parameters,
        time_base: ffmpeg_next::Rational,
    ) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let decoder_ctx = codec::context::Context::from_parameters(parameters)
            .map_err(|e| Error::codec(e.to_string()))?;

        let decoder = decoder_ctx
            .decoder()
            .audio()
            .map_err(|e| Error::codec(e.to_string()))?;

        tracing::debug!(
            rate = decoder.rate(),
            channels = decoder.channels(),
            "audio decoder opened"
        );

        Ok(Self { decoder, time_base })
    }

    /**
        Get the time base for this decoder.
    */
    pub fn time_base(&self) -> ffmpeg_next::Rational {
        self.time_base
    }

    /**
        Get the sample rate of the decoded audio.
    */
    pub fn sample_rate(&self) -> u32 {
        self.decoder.rate()
    }

    /**
        Get the number of channels.
    */
    pub fn channels(&self) -> u16 {
        self.decoder.channels() as u16
    }

    /**
        Get the native sample format of the decoded audio.
    */
    pub fn format(&self) -> ffmpeg_next::format::Sample {
        self.decoder.format()
    }

    /**
        Stream parameters in the family's vocabulary.
    */
    pub fn params(&self) -> Result<AudioParams> {
        let sample_format = sample_format_from_ffmpeg(self.format()).ok_or_else(|| {
            Error::unsupported(format!("sample format {:?}", self.format()))
        })?;
        let channel_layout = match self.channels() {
            1 => ChannelLayout::Mono,
            _ => ChannelLayout::Stereo,
        };
        Ok(AudioParams::new(
            self.sample_rate(),
            channel_layout,
            sample_format,
        ))
    }

    /**
        Decode a packet, returning decoded frames.

        May return zero, one, or multiple frames depending on codec.
    */
    pub fn decode(&mut self, packet: &ffmpeg_next::Packet) -> Result<Vec<AudioFrame>> {
        let ret = unsafe {
            ffi::avcodec_send_packet(self.decoder.as_mut_ptr(), packet.as_ptr())
        };
        check_ffmpeg(ret, "avcodec_send_packet")?;
        self.receive_frames()
    }

    /**
        Flush the decoder to get any remaining buffered frames.

        Call this at end of stream to retrieve any buffered frames.
    */
    pub fn flush(&mut self) -> Result<Vec<AudioFrame>> {
        let ret =
            unsafe { ffi::avcodec_send_packet(self.decoder.as_mut_ptr(), std::ptr::null()) };
        if ret != ffi::AVERROR_EOF {
            check_ffmpeg(ret, "avcodec_send_packet")?;
        }
        self.receive_frames()
    }

    /**
        Receive all frames the decoder has ready.
    */
    fn receive_frames(&mut self) -> Result<Vec<AudioFrame>> {
        let mut frames = Vec::new();
        loop {
            let mut frame = AudioFrame::empty();
            let ret = unsafe {
                ffi::avcodec_receive_frame(self.decoder.as_mut_ptr(), frame.as_mut_ptr())
            };
            if ret == ffi::AVERROR(ffi::EAGAIN) || ret == ffi::AVERROR_EOF {
                break;
            }
            check_ffmpeg(ret, "avcodec_receive_frame")?;
            frames.push(frame);
        }
        Ok(frames)
    }
}

/**
    Convert an FFmpeg sample format to the family's SampleFormat.
*/
fn sample_format_from_ffmpeg(format: ffmpeg_next::format::Sample) -> Option<SampleFormat> {
    use ffmpeg_next::format::Sample;

    match format {
        Sample::F32(_) => Some(SampleFormat::F32),
        Sample::F64(_) => Some(SampleFormat::F64),
        Sample::I16(_) => Some(SampleFormat::S16),
        Sample::I32(_) => Some(SampleFormat::S32),
        Sample::U8(_) => Some(SampleFormat::U8),
        _ => None,
    }
}

impl std::fmt::Debug for AudioDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDecoder")
            .field("time_base", &self.time_base)
            .field("sample_rate", &self.decoder.rate())
            .field("channels", &self.decoder.channels())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg_next::format::{Sample, sample::Type};

    #[test]
    fn sample_format_mapping() {
        assert_eq!(
            sample_format_from_ffmpeg(Sample::F32(Type::Planar)),
            Some(SampleFormat::F32)
        );
        assert_eq!(
            sample_format_from_ffmpeg(Sample::I16(Type::Packed)),
            Some(SampleFormat::S16)
        );
        assert_eq!(sample_format_from_ffmpeg(Sample::None), None);
    }
}
