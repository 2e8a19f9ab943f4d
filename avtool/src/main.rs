use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod mix;
mod pipeline;
mod probe;
mod remux;
mod transcode;

#[derive(Parser, Debug)]
#[command(name = "avtool")]
#[command(about = "Audio transcoding toolkit built on caller-driven FFmpeg I/O")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect a media file, feeding it through an in-memory I/O binding
    Probe {
        /// Input media file
        input: PathBuf,
    },

    /// Transcode an audio file to AAC
    Transcode {
        /// Input media file
        input: PathBuf,
        /// Output file (.aac, .m4a, .mka)
        output: PathBuf,
        /// Output bit rate in bit/s
        #[arg(long, default_value_t = 96_000)]
        bit_rate: usize,
    },

    /// Mix two audio files into one AAC stream
    Mix {
        /// First input file
        first: PathBuf,
        /// Second input file
        second: PathBuf,
        /// Output file (.aac, .m4a, .mka)
        output: PathBuf,
    },

    /// Transcode entirely in memory, persisting the bytes at the end
    Remux {
        /// Input media file
        input: PathBuf,
        /// Output file (.aac, .m4a, .mka)
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Probe { input } => probe::run(&input),
        Command::Transcode {
            input,
            output,
            bit_rate,
        } => transcode::run(&input, &output, bit_rate),
        Command::Mix {
            first,
            second,
            output,
        } => mix::run(&first, &second, &output),
        Command::Remux { input, output } => remux::run(&input, &output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn transcode_has_a_default_bit_rate() {
        let cli = Cli::parse_from(["avtool", "transcode", "in.mp3", "out.m4a"]);
        match cli.command {
            Command::Transcode { bit_rate, .. } => assert_eq!(bit_rate, 96_000),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
