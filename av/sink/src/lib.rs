/*!
    Container output and audio encoding for the av crate family.

    This crate is the output end of the pipeline: an [`AudioEncoder`] turns
    raw frames into compressed packets, and a [`Sink`] writes those packets
    into a container — a file on disk, or any caller-supplied byte stream
    through the `av-io` bridge.

    # Basic Usage

    ```ignore
    use av_sink::{AudioEncoder, EncoderConfig, Sink};

    let mut sink = Sink::create("output.m4a")?;
    let mut encoder = AudioEncoder::new(
        &EncoderConfig::new(48_000),
        sink.needs_global_header(),
    )?;
    sink.add_audio_stream(&encoder)?;
    sink.write_header()?;

    for mut frame in frames {
        for mut packet in encoder.encode(&mut frame)? {
            sink.write(&mut packet, encoder.time_base())?;
        }
    }
    for mut packet in encoder.flush()? {
        sink.write(&mut packet, encoder.time_base())?;
    }

    // Finalize the container (critical!)
    sink.finish()?;
    ```

    # Finalization

    Always call `finish()` to write the container trailer. Without it,
    duration may be unknown to players, seeking may not work, and some
    demuxers will reject the file outright.

    # In-memory output

    ```ignore
    use av_io::{AttachOptions, IoBinding, IoRegistry, MemoryStream};
    use av_sink::{ContainerFormat, Sink};

    let registry = IoRegistry::new();
    let stream = MemoryStream::new();
    let tap = stream.clone();
    let mut sink = Sink::from_binding(
        &registry,
        IoBinding::seekable(stream),
        AttachOptions::write(),
        ContainerFormat::Mp4,
    )?;
    // ... mux ... then read the bytes back from `tap.contents()`
    ```
*/

mod config;
mod encode;
mod sink;

pub use config::{ContainerFormat, EncoderConfig};
pub use encode::AudioEncoder;
pub use sink::Sink;
