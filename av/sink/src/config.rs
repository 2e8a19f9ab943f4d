/*!
    Output configuration types.
*/

use std::path::Path;

use av_types::ChannelLayout;

/**
    Container format for output.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContainerFormat {
    /// Raw ADTS AAC stream (no seeking required to write).
    Adts,
    /// MP4 container (most compatible; the muxer seeks back to patch it).
    Mp4,
    /// Matroska container.
    Mkv,
}

impl ContainerFormat {
    /**
        Get the FFmpeg format name for this container.
    */
    pub fn ffmpeg_format_name(&self) -> &'static str {
        match self {
            Self::Adts => "adts",
            Self::Mp4 => "mp4",
            Self::Mkv => "matroska",
        }
    }

    /**
        Get the typical file extension for audio in this container.
    */
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Adts => "aac",
            Self::Mp4 => "m4a",
            Self::Mkv => "mka",
        }
    }

    /**
        Guess a container format from a file extension.
    */
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "aac" | "adts" => Some(Self::Adts),
            "m4a" | "mp4" => Some(Self::Mp4),
            "mka" | "mkv" => Some(Self::Mkv),
            _ => None,
        }
    }

    /**
        Returns true if the muxer needs a seekable byte stream.
    */
    pub fn needs_seek(&self) -> bool {
        matches!(self, Self::Mp4 | Self::Mkv)
    }
}

/**
    Configuration for the audio encoder.
*/
#[derive(Clone, Copy, Debug)]
pub struct EncoderConfig {
    /// Output sample rate; match the source rate to avoid resampling drift.
    pub sample_rate: u32,
    /// Output channel layout.
    pub channel_layout: ChannelLayout,
    /// Output bit rate in bits per second.
    pub bit_rate: usize,
}

impl EncoderConfig {
    /// Default output bit rate in bit/s.
    pub const DEFAULT_BIT_RATE: usize = 96_000;

    /**
        Stereo AAC at the default bit rate.
    */
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channel_layout: ChannelLayout::Stereo,
            bit_rate: Self::DEFAULT_BIT_RATE,
        }
    }

    /**
        Override the bit rate.
    */
    pub fn with_bit_rate(mut self, bit_rate: usize) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    /**
        Override the channel layout.
    */
    pub fn with_channel_layout(mut self, channel_layout: ChannelLayout) -> Self {
        self.channel_layout = channel_layout;
        self
    }
}
