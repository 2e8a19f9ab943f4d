/*!
    Audio sample FIFO.
*/

use ffmpeg_next::{ffi, frame::Audio as AudioFrame};

use av_io::check_ffmpeg;
use av_types::{Error, Result};

use crate::alloc_failed;
use crate::format::FrameFormat;

/**
    Sample buffer that re-chunks audio between pipeline stages.

    Decoders produce frames of whatever size the codec likes; encoders
    consume frames of exactly their own frame size. Push decoded (and
    converted) frames in, pop encoder-sized frames out.

    All frames passing through one FIFO must share the format it was
    created with.
*/
pub struct AudioFifo {
    fifo: *mut ffi::AVAudioFifo,
    format: FrameFormat,
}

// SAFETY: the FIFO pointer is owned exclusively by this value and only
// used through &mut self / &self on one stage at a time.
unsafe impl Send for AudioFifo {}

impl AudioFifo {
    /**
        Create a FIFO for samples of `format`.
    */
    pub fn new(format: FrameFormat) -> Result<Self> {
        let fifo = unsafe { ffi::av_audio_fifo_alloc(format.sample_format, format.channels, 1) };
        if fifo.is_null() {
            return Err(alloc_failed("av_audio_fifo_alloc"));
        }
        Ok(Self { fifo, format })
    }

    /**
        Number of samples currently buffered.
    */
    pub fn len(&self) -> usize {
        let n = unsafe { ffi::av_audio_fifo_size(self.fifo) };
        n.max(0) as usize
    }

    /**
        Returns true if no samples are buffered.
    */
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /**
        Append all samples of `frame`.
    */
    pub fn push(&mut self, frame: &AudioFrame) -> Result<()> {
        let samples = frame.samples() as i32;
        if samples == 0 {
            return Ok(());
        }

        unsafe {
            let ret = ffi::av_audio_fifo_realloc(self.fifo, ffi::av_audio_fifo_size(self.fifo) + samples);
            check_ffmpeg(ret, "av_audio_fifo_realloc")?;

            let written = ffi::av_audio_fifo_write(
                self.fifo,
                (*frame.as_ptr()).extended_data as *mut *mut std::ffi::c_void,
                samples,
            );
            if written < samples {
                return Err(Error::invalid_data("short write into audio FIFO"));
            }
        }
        Ok(())
    }

    /**
        Pop up to `max_samples` into a fresh frame.

        The returned frame holds `min(max_samples, len())` samples in the
        FIFO's format; its timestamp is unset.
    */
    pub fn pop(&mut self, max_samples: usize) -> Result<AudioFrame> {
        let take = max_samples.min(self.len()) as i32;

        let mut frame = AudioFrame::empty();
        unsafe {
            let ptr = frame.as_mut_ptr();
            (*ptr).nb_samples = take;
            (*ptr).sample_rate = self.format.sample_rate;
            (*ptr).format = self.format.sample_format as i32;
            ffi::av_channel_layout_default(&mut (*ptr).ch_layout, self.format.channels);

            let ret = ffi::av_frame_get_buffer(ptr, 0);
            check_ffmpeg(ret, "av_frame_get_buffer")?;

            let read = ffi::av_audio_fifo_read(
                self.fifo,
                (*ptr).extended_data as *mut *mut std::ffi::c_void,
                take,
            );
            if read < take {
                return Err(Error::invalid_data("short read from audio FIFO"));
            }
        }
        Ok(frame)
    }
}

impl Drop for AudioFifo {
    fn drop(&mut self) {
        unsafe { ffi::av_audio_fifo_free(self.fifo) };
    }
}

impl std::fmt::Debug for AudioFifo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFifo")
            .field("format", &self.format)
            .field("buffered", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resample::test_support::silent_frame;

    const FLTP_STEREO: FrameFormat =
        FrameFormat::new(48_000, 2, ffi::AVSampleFormat::AV_SAMPLE_FMT_FLTP);

    #[test]
    fn rechunks_to_requested_sizes() {
        let mut fifo = AudioFifo::new(FLTP_STEREO).unwrap();
        assert!(fifo.is_empty());

        fifo.push(&silent_frame(FLTP_STEREO, 1000)).unwrap();
        fifo.push(&silent_frame(FLTP_STEREO, 500)).unwrap();
        assert_eq!(fifo.len(), 1500);

        let frame = fifo.pop(1024).unwrap();
        assert_eq!(frame.samples(), 1024);
        assert_eq!(fifo.len(), 476);

        // A final partial chunk drains the rest.
        let frame = fifo.pop(1024).unwrap();
        assert_eq!(frame.samples(), 476);
        assert!(fifo.is_empty());
    }

    #[test]
    fn zero_sample_frames_are_noops() {
        let mut fifo = AudioFifo::new(FLTP_STEREO).unwrap();
        fifo.push(&silent_frame(FLTP_STEREO, 0)).unwrap();
        assert!(fifo.is_empty());
    }
}
