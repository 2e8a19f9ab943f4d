/*!
    Audio frame plumbing for the av crate family.

    Decoders hand out frames in whatever format the codec uses; encoders
    demand frames of an exact format and an exact size. This crate is the
    adapter layer in between:

    - [`Resampler`] - sample format / rate / layout conversion (swresample)
    - [`AudioFifo`] - sample buffer that re-chunks frames to the encoder's
      frame size
    - [`MixGraph`] - two-input `amix` filter graph (avfilter)
    - [`FrameFormat`] - the raw-level audio format descriptor the three of
      them speak

    # Statefulness

    All three stages are stateful. The resampler keeps filter history and
    must be [`Resampler::flush`]ed at end of stream; the FIFO carries
    samples between frames; the mix graph buffers until every input has
    contributed. None of them are meant to be shared across streams.
*/

mod fifo;
mod filter;
mod format;
mod resample;

/// Allocation error for a null return from an FFmpeg allocator.
pub(crate) fn alloc_failed(context: &str) -> av_types::Error {
    let code = ffmpeg_next::ffi::AVERROR(ffmpeg_next::ffi::ENOMEM);
    av_types::Error::ffmpeg(context, code, av_io::strerror(code))
}

pub use fifo::AudioFifo;
pub use filter::MixGraph;
pub use format::FrameFormat;
pub use resample::Resampler;
