use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ffpilot")]
#[command(author, version, about = "Probe media and drive ffmpeg transcodes with live progress")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe a media file and display information
    Probe {
        /// File or URL to probe
        #[arg(required = true)]
        input: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transcode a file or stream with ffmpeg
    Transcode {
        /// Input file or URL, or "-" to read from stdin
        #[arg(required = true)]
        input: String,

        /// Output file, or "-" to write to stdout
        #[arg(required = true)]
        output: String,

        /// Output container format (required when writing to stdout)
        #[arg(short, long)]
        format: Option<String>,

        /// Extra ffmpeg options placed before the input (repeatable)
        #[arg(long = "input-arg", value_name = "ARG", allow_hyphen_values = true)]
        input_args: Vec<String>,

        /// Do not report progress
        #[arg(short, long)]
        quiet: bool,

        /// Stop after this many seconds, killing ffmpeg if it does not exit
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Print the ffmpeg command without running it
        #[arg(long)]
        dry_run: bool,

        /// Extra ffmpeg options placed after the input, e.g. `-- -c:v libx264`
        #[arg(last = true, value_name = "FFMPEG_ARGS")]
        ffmpeg_args: Vec<String>,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
