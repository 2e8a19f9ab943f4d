/*!
    `transcode` subcommand: file in, AAC file out.
*/

use std::path::Path;

use anyhow::{Context, Result};

use av_sink::{AudioEncoder, EncoderConfig, Sink};
use av_source::{AudioDecoder, Source};

use crate::pipeline;

pub fn run(input: &Path, output: &Path, bit_rate: usize) -> Result<()> {
    let mut source =
        Source::open(input).with_context(|| format!("opening {}", input.display()))?;
    let mut decoder = AudioDecoder::new(source.audio_codec_parameters()?, source.audio_time_base())?;
    tracing::info!(
        codec = %source.audio_codec_name(),
        sample_rate = decoder.sample_rate(),
        channels = decoder.channels(),
        "input ready"
    );

    let mut sink =
        Sink::create(output).with_context(|| format!("creating {}", output.display()))?;
    // The input rate carries over so no rate conversion is involved.
    let config = EncoderConfig::new(decoder.sample_rate()).with_bit_rate(bit_rate);
    let mut encoder = AudioEncoder::new(&config, sink.needs_global_header())?;
    sink.add_audio_stream(&encoder)?;

    let stats = pipeline::transcode_audio(&mut source, &mut decoder, &mut sink, &mut encoder)?;
    println!(
        "{} -> {}: {} frames, {} packets",
        input.display(),
        output.display(),
        stats.frames_decoded,
        stats.packets_written
    );
    Ok(())
}
