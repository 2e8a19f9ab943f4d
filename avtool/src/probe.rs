/*!
    `probe` subcommand: open a file through an in-memory binding and
    describe what FFmpeg sees.
*/

use std::path::Path;

use anyhow::{Context, Result};

use av_io::{AttachOptions, IoBinding, IoRegistry, MemorySource};
use av_source::{AudioDecoder, Source};

pub fn run(input: &Path) -> Result<()> {
    let bytes = std::fs::read(input)
        .with_context(|| format!("reading {}", input.display()))?;
    tracing::info!(len = bytes.len(), "input loaded into memory");

    // The demuxer never touches the filesystem: every byte it probes goes
    // through the read callback of this binding.
    let registry = IoRegistry::new();
    let binding = IoBinding::reader(MemorySource::new(bytes));
    let source = Source::from_binding(&registry, binding, AttachOptions::read())
        .with_context(|| format!("probing {}", input.display()))?;

    source.dump(&input.display().to_string());

    println!("container: {}", source.format_name());
    println!("streams:   {}", source.stream_count());
    if let Some(duration) = source.duration() {
        println!("duration:  {:.1}s", duration.as_secs_f64());
    }
    println!(
        "audio:     {} (stream {})",
        source.audio_codec_name(),
        source.audio_stream_index()
    );

    let decoder = AudioDecoder::new(source.audio_codec_parameters()?, source.audio_time_base())?;
    match decoder.params() {
        Ok(params) => println!(
            "format:    {} Hz, {} ch, {:?}",
            params.sample_rate,
            params.channels(),
            params.sample_format
        ),
        Err(_) => println!(
            "format:    {} Hz, {} ch",
            decoder.sample_rate(),
            decoder.channels()
        ),
    }

    Ok(())
}
