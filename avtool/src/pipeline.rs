/*!
    Shared decode → resample → encode pipeline.
*/

use anyhow::Result;

use av_sink::{AudioEncoder, Sink};
use av_source::{AudioDecoder, Source};
use av_transform::{AudioFifo, FrameFormat, Resampler};

/**
    Counters reported when a pipeline run completes.
*/
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineStats {
    pub frames_decoded: u64,
    pub packets_written: u64,
}

/**
    Pump every audio frame of `source` through the decoder, into the
    encoder's format, and out through the sink.

    The sink must already carry the encoder's stream; the header is
    written here and the container is finalized before returning.
*/
pub fn transcode_audio(
    source: &mut Source,
    decoder: &mut AudioDecoder,
    sink: &mut Sink,
    encoder: &mut AudioEncoder,
) -> Result<PipelineStats> {
    let input_format = FrameFormat::new(
        decoder.sample_rate() as i32,
        decoder.channels() as i32,
        decoder.format().into(),
    );
    let output_format = FrameFormat::new(
        encoder.sample_rate(),
        encoder.channels(),
        encoder.sample_format(),
    );

    let mut resampler = Resampler::new(input_format, output_format)?;
    let mut fifo = AudioFifo::new(output_format)?;
    let frame_size = encoder.frame_size();
    let mut stats = PipelineStats::default();

    sink.write_header()?;

    while let Some(packet) = source.read_packet()? {
        for frame in decoder.decode(&packet)? {
            stats.frames_decoded += 1;
            fifo.push(&resampler.convert(&frame)?)?;
        }
        encode_buffered(&mut fifo, frame_size, encoder, sink, false, &mut stats)?;
    }

    // End of input: drain every stage in pipeline order.
    for frame in decoder.flush()? {
        stats.frames_decoded += 1;
        fifo.push(&resampler.convert(&frame)?)?;
    }
    while let Some(tail) = resampler.flush()? {
        fifo.push(&tail)?;
    }
    encode_buffered(&mut fifo, frame_size, encoder, sink, true, &mut stats)?;
    for mut packet in encoder.flush()? {
        sink.write(&mut packet, encoder.time_base())?;
        stats.packets_written += 1;
    }

    sink.finish()?;
    tracing::info!(
        frames = stats.frames_decoded,
        packets = stats.packets_written,
        "pipeline complete"
    );
    Ok(stats)
}

/**
    Encode full frames out of the FIFO; with `drain` set, also the final
    partial frame.
*/
fn encode_buffered(
    fifo: &mut AudioFifo,
    frame_size: usize,
    encoder: &mut AudioEncoder,
    sink: &mut Sink,
    drain: bool,
    stats: &mut PipelineStats,
) -> Result<()> {
    while fifo.len() >= frame_size || (drain && !fifo.is_empty()) {
        let mut frame = fifo.pop(frame_size)?;
        for mut packet in encoder.encode(&mut frame)? {
            sink.write(&mut packet, encoder.time_base())?;
            stats.packets_written += 1;
        }
    }
    Ok(())
}
