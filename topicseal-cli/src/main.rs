use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use topicseal_cli::cli::{Args, Command, IdentityCommand, TopicCommand};
use topicseal_cli::commands::{self, PASSPHRASE_VAR};
use topicseal_core::config::Config;
use topicseal_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use topicseal_core::{TopicId, UserId};

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.to_lowercase();
    }
    config.logging.json_format |= args.json_logs;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    // Parse log level
    let log_config = LogConfig::try_from(&config.logging).unwrap_or_else(|e| {
        eprintln!("{}, using 'info'", e);
        LogConfig::new(LogLevel::Info).json_format(config.logging.json_format)
    });
    init_logging_with_config(log_config)?;
    topicseal_core::metrics::init_metrics();

    match args.command {
        Command::Identity { command } => match command {
            IdentityCommand::Generate { out, identity_version } => {
                let passphrase = std::env::var(PASSPHRASE_VAR)
                    .with_context(|| format!("{} is not set", PASSPHRASE_VAR))?;
                let out = commands::expand_path(&out)?;
                let summary = commands::generate_identity(&out, identity_version, &passphrase)?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            IdentityCommand::Inspect { file } => {
                let summary = commands::inspect_identity(&commands::expand_path(&file)?)?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        },
        Command::Topic { command } => match command {
            TopicCommand::Create { db, title, plain } => {
                let store = commands::open_store(db.as_deref(), &config)?;
                let topic = commands::create_topic(&store, &title, !plain).await?;
                println!("{}", topic);
            }
        },
        Command::Grant { db, topic, user, key } => {
            let store = Arc::new(commands::open_store(db.as_deref(), &config)?);
            commands::grant(store, TopicId(topic), UserId(user), key).await?;
        }
        Command::Revoke { db, topic, user } => {
            let store = Arc::new(commands::open_store(db.as_deref(), &config)?);
            if !commands::revoke(store, TopicId(topic), UserId(user)).await? {
                warn!(topic, user, "User had no access to revoke");
            }
        }
        Command::Reconcile { db, watch } => {
            let store = Arc::new(commands::open_store(db.as_deref(), &config)?);
            if watch {
                commands::reconcile_watch(store, &config.reconciler).await?;
            } else {
                let summary = commands::reconcile_once(store, &config.reconciler).await;
                println!(
                    "topics={} added={} removed={} failures={}",
                    summary.topics, summary.added, summary.removed, summary.failures
                );
            }
        }
    }

    info!("topicseal finished");
    Ok(())
}
