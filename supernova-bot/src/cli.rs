use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use supernova_core::{CancellationToken, Config, ProviderId};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    bot::{Bot, IncomingMessage, StdoutSink},
    store::{AuthorizationStore, SqliteStore},
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "supernova", version, about = "Weather and chat bot")]
pub struct Cli {
    /// Load environment overrides from this file instead of `./.env`.
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name: "accuweather" or "openai".
        provider: String,
    },

    /// Apply or revert database migrations.
    Migrate {
        #[arg(long, value_enum, default_value_t = Direction::Up)]
        direction: Direction,
    },

    /// Promote a user so they can use /weather and /chat.
    Allow {
        user_id: i64,
    },

    /// Read chat messages from stdin and answer them on stdout.
    Run {
        /// Id of the user typing the messages.
        #[arg(long)]
        user_id: i64,

        /// Chat the replies go to; defaults to the user id.
        #[arg(long)]
        chat_id: Option<i64>,
    },
}

impl Cli {
    /// Load `.env`-style overrides into the process environment.
    pub fn load_env(&self) -> Result<()> {
        match &self.env_file {
            Some(path) => {
                dotenvy::from_path(path)
                    .with_context(|| format!("Failed to load env file: {}", path.display()))?;
            }
            None => {
                // A missing ./.env is normal.
                let _ = dotenvy::dotenv();
            }
        }
        Ok(())
    }

    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Migrate { direction } => migrate(direction),
            Command::Allow { user_id } => allow(user_id),
            Command::Run { user_id, chat_id } => run_bot(user_id, chat_id.unwrap_or(user_id)).await,
        }
    }
}

fn configure(provider: &str) -> Result<()> {
    let id = ProviderId::try_from(provider)?;

    // File contents only; env overrides must not be persisted.
    let mut config = Config::load()?;

    let api_key = inquire::Password::new(&format!("{id} API key:"))
        .without_confirmation()
        .with_help_message(&format!("Leave empty to keep using {}", id.api_key_env()))
        .prompt()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        println!("No key entered; configuration unchanged.");
        return Ok(());
    }

    config.upsert_provider_api_key(id, api_key.trim().to_string());
    config.save()?;

    println!("Saved {id} API key to {}", Config::config_file_path()?.display());
    Ok(())
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = config.database_file_path()?;
    tracing::debug!(path = %path.display(), "opening database");
    SqliteStore::open(&path)
}

fn migrate(direction: Direction) -> Result<()> {
    let config = Config::load_with_env()?;
    let store = open_store(&config)?;

    match direction {
        Direction::Up => {
            tracing::info!("running migrations up");
            let applied = store.migrate_up().context("Error running migration UP")?;
            tracing::info!(applied, version = store.schema_version()?, "migration up completed");
        }
        Direction::Down => {
            tracing::info!("running migrations down");
            let reverted = store.migrate_down().context("Error running migration DOWN")?;
            tracing::info!(reverted, "migration down completed");
        }
    }

    Ok(())
}

fn allow(user_id: i64) -> Result<()> {
    let config = Config::load_with_env()?;
    let store = open_store(&config)?;
    store.migrate_up()?;
    store.allow(user_id)?;

    println!("User with ID {user_id} has been allowed to use promoted commands");
    Ok(())
}

async fn run_bot(user_id: i64, chat_id: i64) -> Result<()> {
    let config = Config::load_with_env()?;
    let store = open_store(&config)?;
    let applied = store.migrate_up()?;
    if applied > 0 {
        tracing::info!(applied, "database schema upgraded");
    }

    let bot = Bot::from_config(&config, Arc::new(store));
    let sink = StdoutSink;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            on_signal.cancel();
        }
    });

    tracing::info!(user_id, chat_id, "bot running; reading messages from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read from stdin")?,
        };
        let Some(text) = line else { break };
        if text.trim().is_empty() {
            continue;
        }

        let message = IncomingMessage { chat_id, user_id, text };
        bot.handle(&message, &sink, &cancel).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_requires_user_id() {
        assert!(Cli::try_parse_from(["supernova", "run"]).is_err());

        let cli = Cli::try_parse_from(["supernova", "run", "--user-id", "42"]).unwrap();
        assert!(matches!(cli.command, Command::Run { user_id: 42, chat_id: None }));
    }

    #[test]
    fn migrate_defaults_to_up() {
        let cli = Cli::try_parse_from(["supernova", "migrate"]).unwrap();
        assert!(matches!(cli.command, Command::Migrate { direction: Direction::Up }));

        let cli = Cli::try_parse_from(["supernova", "migrate", "--direction", "down"]).unwrap();
        assert!(matches!(cli.command, Command::Migrate { direction: Direction::Down }));
    }

    #[test]
    fn env_file_is_global() {
        let cli =
            Cli::try_parse_from(["supernova", "allow", "7", "--env-file", "deploy/.env"]).unwrap();
        assert_eq!(cli.env_file, Some(PathBuf::from("deploy/.env")));
        assert!(matches!(cli.command, Command::Allow { user_id: 7 }));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
