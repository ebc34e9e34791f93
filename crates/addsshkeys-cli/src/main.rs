use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use addsshkeys_core::config::{self, Overrides};
use addsshkeys_core::Config;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "addsshkeys", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file (default: ~/.config/addsshkeys/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log more detail (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// ssh-add program to run (overrides ssh_add)
    #[arg(long, global = true, value_name = "PROGRAM")]
    ssh_add: Option<String>,

    /// Directory for relative key paths (overrides ssh_keys_dir)
    #[arg(long, global = true, value_name = "DIR")]
    keys_dir: Option<PathBuf>,

    /// Seconds to wait for ssh-add (overrides timeout_secs)
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            ssh_add: self.ssh_add.clone(),
            ssh_keys_dir: self.keys_dir.clone(),
            timeout_secs: self.timeout,
        }
    }
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Add SSH keys to the running agent (the default command)
    ///
    /// For every key entry in the configuration, runs ssh-add on each of
    /// its files under a pseudo-terminal. When ssh-add asks for a
    /// passphrase, it is fetched from the password manager using the
    /// entry's account and field, and typed at the prompt. Each
    /// passphrase is fetched at most once per run.
    ///
    /// Files that are missing or rejected are reported and skipped. The
    /// run stops early if no agent is reachable.
    ///
    /// Exit status is non-zero if any key could not be added.
    Add {
        /// Only add these key entries (by name)
        keys: Vec<String>,

        /// Show what would be added without running anything
        #[arg(long)]
        dry_run: bool,
    },
    /// List the identities held by the agent (ssh-add -l)
    List,
    /// Show configured keys, whether their files exist, and the agent socket
    Status,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Get a setting, or print the whole file when no key is given
    Get {
        /// Setting name
        key: Option<String>,
    },
    /// Change a setting in the config file, keeping comments
    Set {
        /// Setting name
        key: String,
        /// New value
        value: String,
    },
    /// Print the config file path
    Path,
    /// Print an example configuration
    Example,
    /// Create the config file from the example
    Init,
    /// Check the config file for errors
    Validate,
}

fn log_level(verbose: u8, quiet: bool) -> twyg::LogLevel {
    if quiet {
        return twyg::LogLevel::Error;
    }
    match verbose {
        0 => twyg::LogLevel::Info,
        1 => twyg::LogLevel::Debug,
        _ => twyg::LogLevel::Trace,
    }
}

fn setup_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = log_level(verbose, quiet);
    let opts = twyg::OptsBuilder::new()
        .coloured(true)
        .output(twyg::Output::Stderr)
        .level(level)
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid logging options: {:?}", e))?;

    twyg::setup(opts).map_err(|e| anyhow::anyhow!("Could not set up logging: {:?}", e))?;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    config.apply_overrides(&cli.overrides());
    Ok(config)
}

fn main() -> Result<ExitCode> {
    let mut cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet)?;

    let config_path = cli.config.clone().unwrap_or_else(config::config_file_path);
    log::debug!("Using config file {}", config_path.display());

    let command = cli.command.take().unwrap_or(Commands::Add {
        keys: Vec::new(),
        dry_run: false,
    });

    match command {
        Commands::Add { keys, dry_run } => {
            let config = load_config(&cli)?;
            if dry_run {
                commands::show_plan(&config, &keys)?;
            } else if !commands::run_add(&config, &keys)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::List => {
            let config = load_config(&cli)?;
            commands::run_list(&config)?;
        }
        Commands::Status => {
            let config = load_config(&cli)?;
            commands::show_status(&config, &config_path)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(&cli)?;
                commands::config::show_config(&config, &config_path)?;
            }
            ConfigAction::Get { key } => {
                let config = load_config(&cli)?;
                commands::config::get_config(&config, &config_path, key)?;
            }
            ConfigAction::Set { key, value } => {
                commands::config::set_config(&config_path, &key, &value)?;
            }
            ConfigAction::Path => commands::config::show_path(&config_path)?,
            ConfigAction::Example => commands::config::show_example()?,
            ConfigAction::Init => commands::config::init_config(&config_path)?,
            ConfigAction::Validate => {
                if !commands::config::validate_config(&config_path)? {
                    return Ok(ExitCode::FAILURE);
                }
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level() {
        assert!(matches!(log_level(0, false), twyg::LogLevel::Info));
        assert!(matches!(log_level(1, false), twyg::LogLevel::Debug));
        assert!(matches!(log_level(2, false), twyg::LogLevel::Trace));
        assert!(matches!(log_level(5, false), twyg::LogLevel::Trace));
        assert!(matches!(log_level(0, true), twyg::LogLevel::Error));
    }

    #[test]
    fn test_override_flags() {
        let cli = Cli::parse_from([
            "addsshkeys",
            "--timeout",
            "30",
            "--ssh-add",
            "/opt/bin/ssh-add",
            "list",
        ]);
        assert!(matches!(cli.command, Some(Commands::List)));

        let mut config = Config::default();
        config.apply_overrides(&cli.overrides());
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.ssh_add, "/opt/bin/ssh-add");
        assert_eq!(config.ssh_keys_dir, Config::default().ssh_keys_dir);
    }

    #[test]
    fn test_load_config_applies_flags_over_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "timeout_secs = 5\nssh_keys_dir = \"/from/file\"\n").unwrap();

        let cli = Cli::parse_from([
            "addsshkeys",
            "--config",
            path.to_str().unwrap(),
            "--keys-dir",
            "/from/flag",
            "status",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.ssh_keys_dir, PathBuf::from("/from/flag"));
        assert_eq!(config.timeout_secs, 5);
    }
}
