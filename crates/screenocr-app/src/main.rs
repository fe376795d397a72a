use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use screenocr_config::{Config, HotkeyBinding, Paths};

use crate::lifecycle::{LockError, LockRecord};
use crate::supervisor::Supervisor;

pub mod controller;
pub mod coordinator;
pub mod lifecycle;
pub mod listener;
pub mod logging;
pub mod state;
pub mod status;
pub mod supervisor;

#[cfg(test)]
mod tests;

#[derive(Parser)]
#[command(
    name = "screenocr",
    version,
    about = "Press a hotkey, drag over the screen, get the text on the clipboard"
)]
struct Cli {
    /// Config file (defaults to the XDG config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the background hotkey daemon
    #[command(subcommand)]
    Daemon(DaemonCommand),
    /// Run a single capture cycle now
    Trigger,
}

#[derive(Subcommand)]
enum DaemonCommand {
    /// Start listening; an optional chord such as `super+shift+t` is saved first
    Start {
        hotkey: Option<String>,
        /// Stay attached to the terminal
        #[arg(long)]
        foreground: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Print whether the daemon runs and what it has done
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<LockError>() {
                Some(lock @ (LockError::AlreadyRunning { .. } | LockError::NotRunning)) => {
                    eprintln!("{lock}");
                }
                _ => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let paths = match cli.config {
        Some(path) => Paths::with_config_file(path),
        None => Paths::discover()?,
    };

    match cli.command {
        Command::Daemon(DaemonCommand::Start { hotkey, foreground }) => {
            let config = prepare_start(&paths, hotkey.as_deref())?;
            Supervisor::new(paths, config).run(foreground).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Daemon(DaemonCommand::Stop) => {
            let config = Config::load(&paths.config_file)?;
            Supervisor::new(paths, config).stop().await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Daemon(DaemonCommand::Status) => {
            // status never fails the caller; a broken config still has a lock to report
            let config = Config::load(&paths.config_file).unwrap_or_else(|e| {
                tracing::warn!("{e}");
                Config::default()
            });
            match Supervisor::new(paths, config).status() {
                Ok(status) => println!("{status}"),
                Err(e) => println!("running: unknown ({e:#})"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Trigger => {
            let config = Config::load(&paths.config_file)?;
            let outcome = Supervisor::new(paths, config).trigger().await?;
            println!("{}", outcome.message());
            Ok(if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

/// Load the config, persisting a chord given on the command line.
/// The first start writes the defaults out so they can be edited.
/// Nothing is written while another daemon holds the lock.
fn prepare_start(paths: &Paths, hotkey: Option<&str>) -> Result<Config> {
    if let Some(holder) = LockRecord::read(&paths.state_dir)?
        && holder.is_alive()
    {
        return Err(LockError::AlreadyRunning { pid: holder.pid }.into());
    }

    let chord = hotkey.map(HotkeyBinding::parse).transpose()?;

    // saved without environment overrides
    let mut stored = Config::read(&paths.config_file)?;
    if let Some(chord) = &chord {
        stored.hotkey = chord.clone();
        stored
            .save(&paths.config_file)
            .context("Failed to save hotkey")?;
        tracing::info!("Hotkey set to {chord}");
    } else if !paths.config_file.exists() {
        stored
            .save(&paths.config_file)
            .context("Failed to write default config")?;
        tracing::info!("Wrote default config to {}", paths.config_file.display());
    }

    let mut config = Config::load(&paths.config_file)?;
    if let Some(chord) = chord {
        config.hotkey = chord;
    }
    Ok(config)
}
