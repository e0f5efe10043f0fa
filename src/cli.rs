use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hlsforge")]
#[command(author, version, about = "HLS transcoding daemon for self-hosted media libraries")]
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
    /// Run the transcoding daemon: scan the library, watch for changes,
    /// and keep the worker pool busy
    Run,

    /// Print the HLS layout a source file would produce, without encoding
    Layout {
        /// Source path relative to the media directory
        #[arg(required = true)]
        source: String,

        /// Treat the source as an episode instead of a movie
        #[arg(long)]
        episode: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Display version information
    Version,
}
