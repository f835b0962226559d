//! `acs` entry point.
//!
//! `acs run` starts a terminal on mock hardware and drives it from stdin;
//! `acs check-config` validates a configuration file and prints the
//! effective settings.

mod console;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use acs_core::TerminalConfig;
use acs_hardware::mock::{MockOutputs, OutputEvent, mock_peripherals};
use acs_storage::{Database, DatabaseConfig, DeviceSettings, SqliteSettingsRepository};
use acs_terminal::Terminal;
use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use console::{ConsoleCommand, HELP, MockInputs};

/// Access-control terminal emulator.
#[derive(Parser, Debug)]
#[command(name = "acs", version, about, long_about = None)]
struct Cli {
    /// Verbose logging. Repeat for more (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the terminal against mock hardware driven from stdin.
    Run {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: PathBuf,

        /// SQLite settings database, overriding `storage.database_path`.
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Load and validate a configuration file, then print it.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

impl Commands {
    fn config_path(&self) -> &Path {
        match self {
            Commands::Run { config, .. } | Commands::CheckConfig { config } => config,
        }
    }
}

fn log_filter(verbose: u8, configured: &str) -> EnvFilter {
    match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured)),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

fn load_config(path: &Path) -> anyhow::Result<TerminalConfig> {
    let config = TerminalConfig::load(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.command.config_path()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, &config.logging.level))
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Run { database, .. } => run(config, database).await,
        Commands::CheckConfig { .. } => check_config(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn check_config(config: &TerminalConfig) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config).context("failed to render configuration")?;
    println!("{rendered}");
    println!("configuration ok");
    Ok(())
}

async fn run(config: TerminalConfig, database: Option<PathBuf>) -> anyhow::Result<()> {
    let path = match database {
        Some(path) => path.display().to_string(),
        None => config.storage.database_path.clone(),
    };
    let db = Database::new(DatabaseConfig::new(path.as_str()))
        .await
        .with_context(|| format!("failed to open settings database {path}"))?;
    let settings = DeviceSettings::new(SqliteSettingsRepository::new(db.pool().clone()));

    let (peripherals, controls) = mock_peripherals();
    let (inputs, outputs) = MockInputs::split(controls);
    let handle = Terminal::new(config, peripherals, settings)
        .start()
        .await
        .context("failed to start terminal")?;

    let (reboot_tx, mut reboot_rx) = oneshot::channel();
    let printer = tokio::spawn(print_outputs(outputs, reboot_tx));

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line.context("failed to read stdin")? {
                    Some(line) => line,
                    None => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ConsoleCommand>() {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => command.apply(&inputs).await,
                    Err(e) => println!("{e:#}\n{HELP}"),
                }
            }
            _ = &mut reboot_rx => {
                println!("terminal rebooted, exiting");
                break;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await;
    printer.abort();
    db.close().await;
    Ok(())
}

async fn print_outputs(mut outputs: MockOutputs, reboot: oneshot::Sender<()>) {
    while let Some(event) = outputs.next().await {
        match &event {
            OutputEvent::Actuator(true) => println!("actuator: engaged"),
            OutputEvent::Actuator(false) => println!("actuator: released"),
            OutputEvent::Indicator(pattern) => println!("indicator: {pattern}"),
            OutputEvent::Effect(effect) => println!("sound: {effect}"),
            OutputEvent::Tone(tone) => {
                println!("tone: {} notes, {} ms", tone.notes.len(), tone.duration_ms())
            }
            OutputEvent::FirmwareUpdate(tag) => println!("firmware update: {tag}"),
            OutputEvent::Reboot => {
                println!("reboot");
                let _ = reboot.send(());
                return;
            }
        }
    }
}
