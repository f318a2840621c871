//! Noob channel bot binary.
//!
//! # Usage
//!
//! ```bash
//! # Serve join requests with a self-signed certificate (development)
//! noob-channel-bot --bind 0.0.0.0:4433 --log-path -
//!
//! # Production TLS and a config file
//! noob-channel-bot --config bot.toml --cert cert.pem --key key.pem
//!
//! # Inspect state (bot must be stopped)
//! noob-channel-bot status
//! noob-channel-bot channels
//! ```

#![allow(clippy::disallowed_types, reason = "Serializing log file writes")]

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::PathBuf,
    sync::Mutex,
};

use clap::{Parser, Subcommand};
use noob_channel_bot::{Bot, BotConfig, list_channels, read_status};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Noob channel bot
#[derive(Parser, Debug)]
#[command(name = "noob-channel-bot")]
#[command(about = "Hands out capacity-bounded noob channels and rotates them when full")]
#[command(version)]
struct Args {
    /// TOML config file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Address to bind to
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long, global = true)]
    cert: Option<PathBuf>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long, global = true)]
    key: Option<PathBuf>,

    /// Rotation state database
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    /// Directory receiving per-channel admin credentials
    #[arg(long, global = true)]
    admin_keys: Option<PathBuf>,

    /// Where to write the bot's contact JSON
    #[arg(long, global = true)]
    contact_output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log file, "-" for stdout
    #[arg(long, global = true)]
    log_path: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Serve join requests (default)
    Run,
    /// List channels in the admin vault
    Channels,
    /// Print persisted rotation counters
    Status,
}

impl Args {
    fn into_config(self) -> Result<(BotConfig, Command), noob_channel_bot::ConfigError> {
        let mut config = match &self.config {
            Some(path) => BotConfig::from_file(path)?,
            None => BotConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(cert) = self.cert {
            config.cert_path = Some(cert);
        }
        if let Some(key) = self.key {
            config.key_path = Some(key);
        }
        if let Some(storage) = self.storage {
            config.storage_path = storage;
        }
        if let Some(admin_keys) = self.admin_keys {
            config.admin_keys = admin_keys;
        }
        if let Some(contact_output) = self.contact_output {
            config.contact_output = contact_output;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        if let Some(log_path) = self.log_path {
            config.log_path = log_path;
        }

        Ok((config, self.command.unwrap_or(Command::Run)))
    }
}

fn init_logging(config: &BotConfig) -> io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_path == "-" {
        tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
        return Ok(());
    }

    let path = PathBuf::from(&config.log_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(filter)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (config, command) = Args::parse().into_config()?;

    match command {
        Command::Run => {
            init_logging(&config)?;
            tracing::info!("Noob channel bot starting");

            if config.cert_path.is_none() || config.key_path.is_none() {
                tracing::warn!("No TLS certificate provided - using self-signed certificate");
            }

            let bot = Bot::open(config).await?;
            tracing::info!("Listening on {}", bot.local_addr()?);
            bot.run().await?;
        },
        Command::Channels => {
            let mut stdout = io::stdout().lock();
            for codename in list_channels(&config)? {
                writeln!(stdout, "{codename}")?;
            }
        },
        Command::Status => {
            let mut stdout = io::stdout().lock();
            match read_status(&config)? {
                Some(status) => {
                    writeln!(stdout, "channel sequence: {}", status.channel_sequence)?;
                    writeln!(stdout, "occupancy:        {}", status.occupancy)?;
                    let channel =
                        status.current_channel.map_or_else(|| "none".to_string(), |c| c.name);
                    writeln!(stdout, "current channel:  {channel}")?;
                },
                None => {
                    writeln!(stdout, "no rotation state at {}", config.storage_path.display())?;
                },
            }
        },
    }

    Ok(())
}
