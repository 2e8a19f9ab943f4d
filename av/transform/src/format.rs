/*!
    Raw-level audio format descriptor.
*/

use std::ffi::CStr;

use ffmpeg_next::{ffi, frame::Audio as AudioFrame};

/**
    The exact wire format of audio frames at one point in a pipeline.

    Unlike `av_types::AudioParams`, this carries the native sample format
    (including packed/planar distinction), which is what swresample,
    the FIFO, and filter graphs negotiate on.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameFormat {
    /// Samples per second.
    pub sample_rate: i32,
    /// Number of channels.
    pub channels: i32,
    /// Native sample format.
    pub sample_format: ffi::AVSampleFormat,
}

impl FrameFormat {
    /**
        Create a format descriptor.
    */
    pub const fn new(sample_rate: i32, channels: i32, sample_format: ffi::AVSampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /**
        The format of an existing frame.
    */
    pub fn of_frame(frame: &AudioFrame) -> Self {
        Self {
            sample_rate: frame.rate() as i32,
            channels: frame.channels() as i32,
            sample_format: frame.format().into(),
        }
    }

    /**
        FFmpeg's name for the sample format (e.g. `"fltp"`), as used in
        filter arguments.
    */
    pub fn sample_format_name(&self) -> &'static str {
        unsafe {
            let name = ffi::av_get_sample_fmt_name(self.sample_format);
            if name.is_null() {
                return "none";
            }
            CStr::from_ptr(name).to_str().unwrap_or("none")
        }
    }

    /**
        Channel layout name for filter arguments.

        Mirrors the mono/stereo vocabulary the rest of the family speaks.
    */
    pub fn channel_layout_name(&self) -> &'static str {
        match self.channels {
            1 => "mono",
            _ => "stereo",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_format_names() {
        let fltp = FrameFormat::new(48_000, 2, ffi::AVSampleFormat::AV_SAMPLE_FMT_FLTP);
        assert_eq!(fltp.sample_format_name(), "fltp");
        assert_eq!(fltp.channel_layout_name(), "stereo");

        let s16 = FrameFormat::new(44_100, 1, ffi::AVSampleFormat::AV_SAMPLE_FMT_S16);
        assert_eq!(s16.sample_format_name(), "s16");
        assert_eq!(s16.channel_layout_name(), "mono");
    }
}
