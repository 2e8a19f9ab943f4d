/*!
    Container input for the av crate family.

    This crate is the input end of the pipeline. It opens a container —
    from a file path, or from any caller-supplied byte stream through the
    `av-io` bridge — finds the audio stream, and hands out compressed
    packets and decoded frames.

    # Example

    ```ignore
    use av_source::{AudioDecoder, Source};

    let mut source = Source::open("music.mp3")?;
    let mut decoder = AudioDecoder::new(
        source.audio_codec_parameters()?,
        source.audio_time_base(),
    )?;

    while let Some(packet) = source.read_packet()? {
        for frame in decoder.decode(&packet)? {
            // resample / filter / encode
        }
    }
    let remaining = decoder.flush()?;
    ```

    # Custom input

    ```ignore
    use av_io::{AttachOptions, IoBinding, IoRegistry, MemorySource};

    let registry = IoRegistry::new();
    let binding = IoBinding::reader(MemorySource::new(bytes));
    let mut source = Source::from_binding(&registry, binding, AttachOptions::read())?;
    ```
*/

mod decode;
mod source;

pub use decode::AudioDecoder;
pub use source::Source;
