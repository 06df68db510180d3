use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parent Console Gate
///
/// Guards the parent console of a companion robot behind a PIN, enforces
/// bedtime-style time locks, and checks child conversations for moments that
/// call for a redirection.
#[derive(Parser, Debug)]
#[command(name = "parent-gate")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (defaults to the platform location)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example configuration file
    Init {
        /// Output path (defaults to --config or the platform location)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Enroll the parent PIN with a recovery question
    SetPin {
        /// Recovery question shown when the PIN is forgotten
        #[arg(long)]
        question: String,

        /// Answer to the recovery question
        #[arg(long)]
        answer: String,

        /// Replace an already enrolled PIN
        #[arg(long)]
        force: bool,
    },
    /// Replace a forgotten PIN using the recovery answer
    ResetPin {
        /// Answer to the recovery question (prompted if omitted)
        #[arg(long)]
        answer: Option<String>,
    },
    /// Show mode, time lock and lockout status
    Status,
    /// Switch to the parent console
    Unlock,
    /// Switch back to child mode
    Lock,
    /// Suspend time locks and unlock the parent console
    Emergency {
        /// Override length in minutes (defaults to the configured value)
        #[arg(long)]
        minutes: Option<u64>,
    },
    /// Classify a conversation transcript and show suggested redirections
    Classify {
        /// Transcript file, one turn per line ("user: ..." or "system: ...").
        /// Reads stdin when omitted.
        file: Option<PathBuf>,
    },
}
