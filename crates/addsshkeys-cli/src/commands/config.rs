use anyhow::{Context, Result};
use std::path::Path;
use toml_edit::DocumentMut;

use addsshkeys_core::config::{ensure_config_file_at, example_config};
use addsshkeys_core::Config;

/// Scalar settings that `config get` and `config set` understand.
const SCALAR_KEYS: [&str; 4] = ["ssh_add", "ssh_keys_dir", "default_field", "timeout_secs"];

fn unknown_key(key: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Unknown config key: {}\n\nValid keys: {}",
        key,
        SCALAR_KEYS.join(", ")
    )
}

/// Show the current effective configuration.
pub fn show_config(config: &Config, config_path: &Path) -> Result<()> {
    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config_path.display());
    let exists = config_path.exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    print!("{}", rendered);

    println!("\nPriority: CLI flags > ENV vars (ADDSSHKEYS_*) > Config file > Defaults");

    Ok(())
}

/// Value of one scalar setting, as displayed by `config get`.
fn scalar_value(config: &Config, key: &str) -> Result<String> {
    match key {
        "ssh_add" => Ok(config.ssh_add.clone()),
        "ssh_keys_dir" => Ok(config.ssh_keys_dir.display().to_string()),
        "default_field" => Ok(config.default_field.clone()),
        "timeout_secs" => Ok(config.timeout_secs.to_string()),
        _ => Err(unknown_key(key)),
    }
}

/// Get a specific config value.
pub fn get_config(config: &Config, config_path: &Path, key: Option<String>) -> Result<()> {
    if let Some(key) = key {
        println!("{}", scalar_value(config, &key)?);
    } else if config_path.exists() {
        // No key provided, show entire config file contents
        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;
        print!("{}", contents);
    } else {
        println!("Config file does not exist: {}", config_path.display());
        println!("\nRun 'addsshkeys config init' to create it.");
    }

    Ok(())
}

/// Return `contents` with `key` set to `value`, preserving formatting and
/// comments elsewhere in the document.
fn set_value(contents: &str, key: &str, value: &str) -> Result<String> {
    let mut doc = contents
        .parse::<DocumentMut>()
        .context("Config file is not valid TOML")?;

    match key {
        "ssh_add" | "ssh_keys_dir" | "default_field" => {
            doc[key] = toml_edit::value(value);
        }
        "timeout_secs" => {
            let secs: i64 = value
                .parse()
                .with_context(|| format!("timeout_secs must be a whole number, got '{}'", value))?;
            if secs <= 0 {
                anyhow::bail!("timeout_secs must be greater than zero");
            }
            doc[key] = toml_edit::value(secs);
        }
        _ => return Err(unknown_key(key)),
    }

    let updated = doc.to_string();
    Config::from_toml_str(&updated).context("Updated configuration is invalid")?;
    Ok(updated)
}

/// Set a config value.
pub fn set_config(config_path: &Path, key: &str, value: &str) -> Result<()> {
    ensure_config_file_at(config_path)?;

    let contents = std::fs::read_to_string(config_path).context("Failed to read config file")?;
    let updated = set_value(&contents, key, value)?;

    std::fs::write(config_path, updated).context("Failed to write config file")?;

    println!("✓ Updated {} = {}", key, value);
    println!("  in {}", config_path.display());

    Ok(())
}

/// Show the config file path.
pub fn show_path(config_path: &Path) -> Result<()> {
    println!("{}", config_path.display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config(config_path: &Path) -> Result<()> {
    if ensure_config_file_at(config_path)? {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to list your SSH keys.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}

/// Validate config file syntax and key entries.
///
/// Returns whether the file is valid; problems are printed.
pub fn validate_config(config_path: &Path) -> Result<bool> {
    if !config_path.exists() {
        println!("Config file not found: {}", config_path.display());
        println!("\nRun 'addsshkeys config init' to create it first.");
        return Ok(false);
    }

    let contents = std::fs::read_to_string(config_path).context("Failed to read config file")?;

    let checked = Config::from_toml_str(&contents).and_then(|config| {
        config.timeout()?;
        config.key_entries()
    });

    match checked {
        Ok(entries) => {
            println!("✓ Config file is valid!");
            println!("\nSummary:");
            println!("  Key entries: {}", entries.len());
            println!(
                "  Key files:   {}",
                entries.iter().map(|e| e.paths.len()).sum::<usize>()
            );
            Ok(true)
        }
        Err(e) => {
            println!("✗ Config file has errors:");
            println!("\n{}", e);
            println!("\nFix the errors and run 'addsshkeys config validate' again.");
            Ok(false)
        }
    }
}
