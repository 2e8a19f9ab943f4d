/*!
    `mix` subcommand: blend two audio files through an `amix` graph.
*/

use std::path::Path;

use anyhow::{Context, Result};

use av_sink::{AudioEncoder, EncoderConfig, Sink};
use av_source::{AudioDecoder, Source};
use av_transform::{AudioFifo, FrameFormat, MixGraph, Resampler};

struct MixInput {
    source: Source,
    decoder: AudioDecoder,
    /// Samples delivered so far; becomes the next frame's timestamp in the
    /// graph's 1/sample_rate time base.
    samples_sent: i64,
    finished: bool,
}

impl MixInput {
    fn open(path: &Path) -> Result<Self> {
        let source = Source::open(path).with_context(|| format!("opening {}", path.display()))?;
        let decoder =
            AudioDecoder::new(source.audio_codec_parameters()?, source.audio_time_base())?;
        Ok(Self {
            source,
            decoder,
            samples_sent: 0,
            finished: false,
        })
    }

    fn frame_format(&self) -> FrameFormat {
        FrameFormat::new(
            self.decoder.sample_rate() as i32,
            self.decoder.channels() as i32,
            self.decoder.format().into(),
        )
    }

    /// Push the next packet's worth of frames into graph input `index`.
    /// Marks the input finished (flushing the decoder) at end of stream.
    fn feed(&mut self, graph: &mut MixGraph, index: usize) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        match self.source.read_packet()? {
            Some(packet) => {
                for mut frame in self.decoder.decode(&packet)? {
                    self.stamp(&mut frame);
                    graph.push(index, &frame)?;
                }
            }
            None => {
                for mut frame in self.decoder.flush()? {
                    self.stamp(&mut frame);
                    graph.push(index, &frame)?;
                }
                graph.finish_input(index)?;
                self.finished = true;
                tracing::debug!(index, "mix input finished");
            }
        }
        Ok(())
    }

    /// Rewrite the frame timestamp into the graph's time base.
    fn stamp(&mut self, frame: &mut ffmpeg_next::frame::Audio) {
        frame.set_pts(Some(self.samples_sent));
        self.samples_sent += frame.samples() as i64;
    }
}

pub fn run(first: &Path, second: &Path, output: &Path) -> Result<()> {
    let mut inputs = [MixInput::open(first)?, MixInput::open(second)?];
    let mut graph = MixGraph::new(inputs[0].frame_format(), inputs[1].frame_format())?;
    let mixed_format = graph.output_format();
    tracing::info!(?mixed_format, "mix graph negotiated");

    let mut sink =
        Sink::create(output).with_context(|| format!("creating {}", output.display()))?;
    let config = EncoderConfig::new(mixed_format.sample_rate as u32);
    let mut encoder = AudioEncoder::new(&config, sink.needs_global_header())?;
    sink.add_audio_stream(&encoder)?;
    sink.write_header()?;

    let encoder_format = FrameFormat::new(
        encoder.sample_rate(),
        encoder.channels(),
        encoder.sample_format(),
    );
    let mut resampler = Resampler::new(mixed_format, encoder_format)?;
    let mut fifo = AudioFifo::new(encoder_format)?;
    let frame_size = encoder.frame_size();
    let mut packets_written = 0u64;

    // Alternate between the inputs so the graph never has to buffer one
    // entire file while waiting for the other.
    loop {
        for (index, input) in inputs.iter_mut().enumerate() {
            input.feed(&mut graph, index)?;
        }
        let drained = pump_graph(
            &mut graph,
            &mut resampler,
            &mut fifo,
            &mut encoder,
            &mut sink,
            frame_size,
            &mut packets_written,
        )?;
        if drained {
            break;
        }
    }

    // Tail: whatever the resampler and encoder still hold.
    while let Some(tail) = resampler.flush()? {
        fifo.push(&tail)?;
    }
    while !fifo.is_empty() {
        let mut frame = fifo.pop(frame_size)?;
        for mut packet in encoder.encode(&mut frame)? {
            sink.write(&mut packet, encoder.time_base())?;
            packets_written += 1;
        }
    }
    for mut packet in encoder.flush()? {
        sink.write(&mut packet, encoder.time_base())?;
        packets_written += 1;
    }
    sink.finish()?;

    println!(
        "{} + {} -> {}: {} packets",
        first.display(),
        second.display(),
        output.display(),
        packets_written
    );
    Ok(())
}

/// Pull everything the graph has ready. Returns true once the graph
/// reports end of stream.
fn pump_graph(
    graph: &mut MixGraph,
    resampler: &mut Resampler,
    fifo: &mut AudioFifo,
    encoder: &mut AudioEncoder,
    sink: &mut Sink,
    frame_size: usize,
    packets_written: &mut u64,
) -> Result<bool> {
    loop {
        match graph.pull() {
            Ok(Some(frame)) => {
                fifo.push(&resampler.convert(&frame)?)?;
                while fifo.len() >= frame_size {
                    let mut chunk = fifo.pop(frame_size)?;
                    for mut packet in encoder.encode(&mut chunk)? {
                        sink.write(&mut packet, encoder.time_base())?;
                        *packets_written += 1;
                    }
                }
            }
            Ok(None) => return Ok(false),
            Err(e) if e.is_eof() => return Ok(true),
            Err(e) => return Err(e.into()),
        }
    }
}
