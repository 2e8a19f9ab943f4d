/*!
    Audio resampler (swresample).
*/

use std::ptr;

use ffmpeg_next::{ffi, frame::Audio as AudioFrame};

use av_io::check_ffmpeg;
use av_types::Result;

use crate::format::FrameFormat;

/**
    Converts audio frames between formats, rates, and layouts.

    The converter keeps filter history between frames, so feed frames in
    order and call [`Resampler::flush`] at end of stream to drain the
    samples still buffered inside swresample.
*/
pub struct Resampler {
    ctx: *mut ffi::SwrContext,
    input: FrameFormat,
    output: FrameFormat,
}

// SAFETY: the context pointer is owned exclusively by this value and only
// used through &mut self.
unsafe impl Send for Resampler {}

impl Resampler {
    /**
        Create a resampler converting `input` frames to `output` frames.
    */
    pub fn new(input: FrameFormat, output: FrameFormat) -> Result<Self> {
        let mut ctx: *mut ffi::SwrContext = ptr::null_mut();
        unsafe {
            let mut in_layout: ffi::AVChannelLayout = std::mem::zeroed();
            let mut out_layout: ffi::AVChannelLayout = std::mem::zeroed();
            ffi::av_channel_layout_default(&mut in_layout, input.channels);
            ffi::av_channel_layout_default(&mut out_layout, output.channels);

            let ret = ffi::swr_alloc_set_opts2(
                &mut ctx,
                &mut out_layout,
                output.sample_format,
                output.sample_rate,
                &mut in_layout,
                input.sample_format,
                input.sample_rate,
                0,
                ptr::null_mut(),
            );
            check_ffmpeg(ret, "swr_alloc_set_opts2")?;

            let ret = ffi::swr_init(ctx);
            if ret < 0 {
                ffi::swr_free(&mut ctx);
                check_ffmpeg(ret, "swr_init")?;
            }
        }

        tracing::debug!(?input, ?output, "resampler opened");
        Ok(Self { ctx, input, output })
    }

    /**
        The input format this resampler was configured for.
    */
    pub fn input(&self) -> FrameFormat {
        self.input
    }

    /**
        The output format this resampler produces.
    */
    pub fn output(&self) -> FrameFormat {
        self.output
    }

    /**
        Convert one frame, returning the converted samples.

        The output frame may hold fewer or more samples than the input when
        the rates differ; remaining samples stay buffered until the next
        call or [`Resampler::flush`].
    */
    pub fn convert(&mut self, frame: &AudioFrame) -> Result<AudioFrame> {
        let expected =
            unsafe { ffi::swr_get_out_samples(self.ctx, frame.samples() as i32) };
        if expected <= 0 {
            // Not enough input to produce a sample yet; buffer it and hand
            // back an empty frame (downstream stages treat it as a no-op).
            let ret = unsafe {
                ffi::swr_convert(
                    self.ctx,
                    ptr::null_mut(),
                    0,
                    (*frame.as_ptr()).extended_data.cast(),
                    frame.samples() as i32,
                )
            };
            check_ffmpeg(ret, "swr_convert")?;
            return Ok(AudioFrame::empty());
        }

        let mut out = self.output_frame(expected)?;
        let ret = unsafe { ffi::swr_convert_frame(self.ctx, out.as_mut_ptr(), frame.as_ptr()) };
        check_ffmpeg(ret, "swr_convert_frame")?;
        Ok(out)
    }

    /**
        Drain samples still buffered inside the converter.

        Returns `None` once nothing is left.
    */
    pub fn flush(&mut self) -> Result<Option<AudioFrame>> {
        let pending = unsafe { ffi::swr_get_out_samples(self.ctx, 0) };
        if pending <= 0 {
            return Ok(None);
        }

        let mut out = self.output_frame(pending)?;
        let ret = unsafe { ffi::swr_convert_frame(self.ctx, out.as_mut_ptr(), ptr::null()) };
        check_ffmpeg(ret, "swr_convert_frame")?;
        if out.samples() == 0 {
            return Ok(None);
        }
        Ok(Some(out))
    }

    /// Allocate an output frame with room for `capacity` samples; the
    /// converter trims `nb_samples` down to what it actually produced.
    fn output_frame(&self, capacity: i32) -> Result<AudioFrame> {
        let mut out = AudioFrame::empty();
        unsafe {
            let ptr = out.as_mut_ptr();
            (*ptr).nb_samples = capacity;
            (*ptr).sample_rate = self.output.sample_rate;
            (*ptr).format = self.output.sample_format as i32;
            ffi::av_channel_layout_default(&mut (*ptr).ch_layout, self.output.channels);
            let ret = ffi::av_frame_get_buffer(ptr, 0);
            check_ffmpeg(ret, "av_frame_get_buffer")?;
        }
        Ok(out)
    }
}

impl Drop for Resampler {
    fn drop(&mut self) {
        unsafe { ffi::swr_free(&mut self.ctx) };
    }
}

impl std::fmt::Debug for Resampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resampler")
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Synthesize a silent frame of the given format.
    pub(crate) fn silent_frame(format: FrameFormat, samples: usize) -> AudioFrame {
        let mut frame = AudioFrame::empty();
        unsafe {
            let ptr = frame.as_mut_ptr();
            (*ptr).nb_samples = samples as i32;
            (*ptr).sample_rate = format.sample_rate;
            (*ptr).format = format.sample_format as i32;
            ffi::av_channel_layout_default(&mut (*ptr).ch_layout, format.channels);
            if samples > 0 {
                let ret = ffi::av_frame_get_buffer(ptr, 0);
                assert!(ret >= 0, "failed to allocate test frame");
                ffi::av_samples_set_silence(
                    (*ptr).extended_data,
                    0,
                    samples as i32,
                    format.channels,
                    format.sample_format,
                );
            }
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::silent_frame;
    use super::*;

    const S16_MONO: FrameFormat =
        FrameFormat::new(8_000, 1, ffi::AVSampleFormat::AV_SAMPLE_FMT_S16);
    const FLTP_STEREO: FrameFormat =
        FrameFormat::new(8_000, 2, ffi::AVSampleFormat::AV_SAMPLE_FMT_FLTP);

    #[test]
    fn converts_format_and_layout() {
        let mut resampler = Resampler::new(S16_MONO, FLTP_STEREO).unwrap();
        let frame = silent_frame(S16_MONO, 128);

        let out = resampler.convert(&frame).unwrap();
        assert_eq!(out.samples(), 128);
        assert_eq!(out.rate(), 8_000);
        assert_eq!(out.channels(), 2);
    }

    #[test]
    fn flush_drains_to_empty() {
        let mut resampler = Resampler::new(S16_MONO, FLTP_STEREO).unwrap();
        let frame = silent_frame(S16_MONO, 64);
        resampler.convert(&frame).unwrap();

        // Same-rate conversion buffers nothing, so flush ends immediately.
        while let Some(out) = resampler.flush().unwrap() {
            assert!(out.samples() > 0);
        }
    }
}
