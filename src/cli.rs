//! Command line interface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Relay live transcripts into a Gemini Live interpreter and play the speech
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Overrides for one run
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Transcript session to follow
    #[arg(short, long)]
    pub session: Option<String>,

    /// Target language code (see `languages`)
    #[arg(short, long)]
    pub language: Option<String>,

    /// Prebuilt voice (see `voices`)
    #[arg(long)]
    pub voice: Option<String>,

    /// Output device name (see `devices`)
    #[arg(short, long)]
    pub device: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the transcript store and relay every new transcript
    Run(SessionArgs),

    /// Relay one piece of text and exit when it has been spoken
    Speak {
        text: String,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Manage shared credentials
    #[command(subcommand)]
    Keys(KeysCommand),

    /// List target languages
    Languages,

    /// List prebuilt voices
    Voices,

    /// List audio output devices
    Devices,

    /// Manage the config file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    /// Show known credentials (masked)
    List,

    /// Store a credential in the transcript store
    Add { token: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write the default config (keeps an existing file unless --force)
    Init {
        #[arg(long)]
        force: bool,
    },

    /// Print the config file location
    Path,
}
