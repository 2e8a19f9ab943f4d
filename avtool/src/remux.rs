/*!
    `remux` subcommand: the whole pipeline without touching the
    filesystem — input bytes come in through a read binding, output bytes
    leave through a seekable in-memory binding, and only the final buffer
    is persisted.
*/

use std::path::Path;

use anyhow::{Context, Result};

use av_io::{AttachOptions, IoBinding, IoRegistry, MemorySource, MemoryStream};
use av_sink::{AudioEncoder, ContainerFormat, EncoderConfig, Sink};
use av_source::{AudioDecoder, Source};

use crate::pipeline;

pub fn run(input: &Path, output: &Path) -> Result<()> {
    let bytes = std::fs::read(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let bytes_in = bytes.len();
    tracing::info!(len = bytes_in, "input loaded into memory");

    let registry = IoRegistry::new();

    let mut source = Source::from_binding(
        &registry,
        IoBinding::reader(MemorySource::new(bytes)),
        AttachOptions::read(),
    )
    .with_context(|| format!("opening {}", input.display()))?;
    let mut decoder = AudioDecoder::new(source.audio_codec_parameters()?, source.audio_time_base())?;

    let format = ContainerFormat::from_path(output).unwrap_or(ContainerFormat::Adts);
    let stream = MemoryStream::new();
    let tap = stream.clone();
    let mut sink = Sink::from_binding(
        &registry,
        IoBinding::seekable(stream),
        AttachOptions::write(),
        format,
    )?;

    let config = EncoderConfig::new(decoder.sample_rate());
    let mut encoder = AudioEncoder::new(&config, sink.needs_global_header())?;
    sink.add_audio_stream(&encoder)?;

    let stats = pipeline::transcode_audio(&mut source, &mut decoder, &mut sink, &mut encoder)?;

    // Tear the contexts down before collecting, so both bindings are
    // detached and the muxer has flushed everything it ever will.
    drop(sink);
    drop(source);
    tracing::debug!(remaining = registry.len(), "registry after teardown");

    let data = tap.contents();
    std::fs::write(output, &data)
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "{} ({} bytes) -> {} ({} bytes, {:?}): {} frames, {} packets, all in memory",
        input.display(),
        bytes_in,
        output.display(),
        data.len(),
        format,
        stats.frames_decoded,
        stats.packets_written
    );
    Ok(())
}
