use clap::{Parser, Subcommand};
use std::path::PathBuf;

use topicseal_core::core_identity::CURRENT_IDENTITY_VERSION;

#[derive(Parser, Debug)]
#[command(name = "topicseal")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    pub json_logs: bool,

    /// TOML configuration file; TOPICSEAL_* environment variables otherwise
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage identity exports
    Identity {
        #[command(subcommand)]
        command: IdentityCommand,
    },

    /// Manage topics
    Topic {
        #[command(subcommand)]
        command: TopicCommand,
    },

    /// Store a wrapped topic key for a user and add them as participant
    Grant {
        /// Database path (defaults to store.database_path)
        #[arg(long)]
        db: Option<String>,
        #[arg(long)]
        topic: i64,
        #[arg(long)]
        user: i64,
        /// Topic key wrapped for the user
        #[arg(long)]
        key: String,
    },

    /// Remove a user's key and participant record
    Revoke {
        #[arg(long)]
        db: Option<String>,
        #[arg(long)]
        topic: i64,
        #[arg(long)]
        user: i64,
    },

    /// Align participant records with key records
    Reconcile {
        #[arg(long)]
        db: Option<String>,
        /// Keep running a pass every reconciler.interval until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum IdentityCommand {
    /// Generate an identity and write its passphrase-protected export.
    ///
    /// The passphrase is read from TOPICSEAL_PASSPHRASE.
    Generate {
        #[arg(long)]
        out: String,
        #[arg(long, default_value_t = CURRENT_IDENTITY_VERSION)]
        identity_version: u32,
    },

    /// Print the version and public identity of an export
    Inspect { file: String },
}

#[derive(Subcommand, Debug)]
pub enum TopicCommand {
    /// Create a topic and print its id
    Create {
        #[arg(long)]
        db: Option<String>,
        #[arg(long)]
        title: String,
        /// Create the topic unencrypted
        #[arg(long)]
        plain: bool,
    },
}
