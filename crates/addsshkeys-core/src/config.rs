use confyg::{env, Confygery};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::keys::{resolve_key_path, KeyEntry};

/// Placeholder replaced by the account name in `passphrase_command`.
pub const ACCOUNT_PLACEHOLDER: &str = "{account}";
/// Placeholder replaced by the field name in `passphrase_command`.
pub const FIELD_PLACEHOLDER: &str = "{field}";

/// Configuration for addsshkeys.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI flags, applied with [`Config::apply_overrides`] (highest priority)
/// 2. Environment variables (ADDSSHKEYS_* prefix)
/// 3. Config file (~/.config/addsshkeys/config.toml)
/// 4. Built-in defaults (lowest priority)
///
/// Environment values always arrive as text, so list and number settings
/// also accept a string: `ADDSSHKEYS_SSH_ADD_OPTIONS="-t 8h"`,
/// `ADDSSHKEYS_TIMEOUT_SECS=30`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The ssh-add program.
    ///
    /// Can be set via:
    /// - ENV: ADDSSHKEYS_SSH_ADD
    /// - Config: ssh_add = "/usr/bin/ssh-add"
    pub ssh_add: String,

    /// Extra arguments passed to ssh-add before the key path, e.g.
    /// `["-t", "8h"]` to limit key lifetime.
    #[serde(deserialize_with = "words_or_list")]
    pub ssh_add_options: Vec<String>,

    /// Directory that relative key paths are resolved against.
    ///
    /// Can be set via:
    /// - ENV: ADDSSHKEYS_SSH_KEYS_DIR
    /// - Config: ssh_keys_dir = "~/.ssh"
    pub ssh_keys_dir: PathBuf,

    /// Command that prints a passphrase on stdout. `{account}` and `{field}`
    /// are substituted in every argument.
    #[serde(deserialize_with = "words_or_list")]
    pub passphrase_command: Vec<String>,

    /// Field used when a key entry does not name one.
    pub default_field: String,

    /// Seconds to wait for each ssh-add message.
    ///
    /// Can be set via:
    /// - CLI: --timeout 30
    /// - ENV: ADDSSHKEYS_TIMEOUT_SECS
    /// - Config: timeout_secs = 30
    #[serde(deserialize_with = "number_or_text")]
    pub timeout_secs: u64,

    /// Key entries, by name.
    pub keys: BTreeMap<String, KeySpec>,
}

/// One `[keys.<name>]` table from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeySpec {
    /// Key file paths, either a list or a whitespace-separated string.
    pub paths: WordList,
    /// Password-manager account; defaults to the entry name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Field within the account; defaults to `Config::default_field`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// A list of words as written in the config file: a TOML array or a
/// whitespace-separated string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WordList {
    Words(String),
    List(Vec<String>),
}

impl WordList {
    /// The individual, non-empty words.
    pub fn items(&self) -> Vec<&str> {
        match self {
            Self::Words(words) => words.split_whitespace().collect(),
            Self::List(list) => list
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

fn words_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let words = WordList::deserialize(deserializer)?;
    Ok(words.items().into_iter().map(str::to_string).collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

fn number_or_text<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(text) => text.trim().parse().map_err(|_| {
            de::Error::custom(format!("expected a whole number of seconds, got '{}'", text))
        }),
    }
}

/// Settings given as command-line flags.
///
/// Applied on top of the file and environment layers.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub ssh_add: Option<String>,
    pub ssh_keys_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ssh_add: String::from("ssh-add"),
            ssh_add_options: Vec::new(),
            ssh_keys_dir: default_ssh_keys_dir(),
            passphrase_command: default_passphrase_command(),
            default_field: String::from("passcode"),
            timeout_secs: 10,
            keys: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default file and environment variables.
    ///
    /// Searches for config file at: ~/.config/addsshkeys/config.toml
    /// Reads environment variables with ADDSSHKEYS_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();
        if config_path.exists() {
            Self::layered(Some(&config_path), &config_path)
        } else {
            Self::layered(None, &config_path)
        }
    }

    /// Load configuration from an explicit file (the `--config` flag).
    ///
    /// Unlike [`Config::load`], the file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Self::layered(Some(path), path)
    }

    fn layered(file: Option<&Path>, reported: &Path) -> Result<Self> {
        let load_err = |message: String| Error::ConfigLoad {
            path: reported.to_path_buf(),
            message,
        };

        let mut builder = Confygery::new().map_err(|e| load_err(e.to_string()))?;

        if let Some(path) = file {
            let path_str = path
                .to_str()
                .ok_or_else(|| load_err(String::from("path contains invalid UTF-8")))?;
            builder
                .add_file(path_str)
                .map_err(|e| load_err(e.to_string()))?;
        }

        let env_opts = env::Options::with_top_level("addsshkeys");
        builder
            .add_env(env_opts)
            .map_err(|e| load_err(e.to_string()))?;

        let config: Self = builder.build().map_err(|e| load_err(e.to_string()))?;
        log::debug!(
            "Loaded configuration with {} key entries from {}",
            config.keys.len(),
            reported.display()
        );
        Ok(config)
    }

    /// Apply command-line flags; they take priority over every other layer.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(ssh_add) = &overrides.ssh_add {
            log::debug!("ssh_add overridden on the command line: {}", ssh_add);
            self.ssh_add.clone_from(ssh_add);
        }
        if let Some(dir) = &overrides.ssh_keys_dir {
            log::debug!("ssh_keys_dir overridden on the command line: {}", dir.display());
            self.ssh_keys_dir.clone_from(dir);
        }
        if let Some(secs) = overrides.timeout_secs {
            log::debug!("timeout_secs overridden on the command line: {}", secs);
            self.timeout_secs = secs;
        }
    }

    /// Parse a TOML document, applying defaults for missing settings.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Timeout applied to every expected ssh-add message.
    pub fn timeout(&self) -> Result<Duration> {
        if self.timeout_secs == 0 {
            return Err(Error::Config(String::from(
                "timeout_secs must be greater than zero",
            )));
        }
        Ok(Duration::from_secs(self.timeout_secs))
    }

    /// Resolve all key entries, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when an entry has no paths or an empty
    /// account or field.
    pub fn key_entries(&self) -> Result<Vec<KeyEntry>> {
        self.keys
            .iter()
            .map(|(name, spec)| self.resolve_entry(name, spec))
            .collect()
    }

    fn resolve_entry(&self, name: &str, spec: &KeySpec) -> Result<KeyEntry> {
        let items = spec.paths.items();
        if items.is_empty() {
            return Err(Error::Config(format!("key '{}' has no paths", name)));
        }

        let account = spec.account.as_deref().unwrap_or(name).trim();
        if account.is_empty() {
            return Err(Error::Config(format!("key '{}' has an empty account", name)));
        }

        let field = spec
            .field
            .as_deref()
            .unwrap_or(&self.default_field)
            .trim();
        if field.is_empty() {
            return Err(Error::Config(format!("key '{}' has an empty field", name)));
        }

        Ok(KeyEntry {
            name: name.to_string(),
            account: account.to_string(),
            field: field.to_string(),
            paths: items
                .into_iter()
                .map(|raw| resolve_key_path(&self.ssh_keys_dir, raw))
                .collect(),
        })
    }
}

fn default_ssh_keys_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".ssh"))
        .unwrap_or_else(|| PathBuf::from("~/.ssh"))
}

fn default_passphrase_command() -> Vec<String> {
    ["avendesora", "value", "--stdout", ACCOUNT_PLACEHOLDER, FIELD_PLACEHOLDER]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/addsshkeys/config.toml
/// - macOS: ~/Library/Application Support/addsshkeys/config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("addsshkeys")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# addsshkeys Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. Command-line flags --ssh-add, --keys-dir, --timeout (highest priority)
# 2. Environment variables (ADDSSHKEYS_* prefix), e.g.
#    ADDSSHKEYS_TIMEOUT_SECS=30 or ADDSSHKEYS_SSH_ADD_OPTIONS="-t 8h"
# 3. This config file
# 4. Built-in defaults (lowest priority)

# The ssh-add program and any options placed before each key path.
# Use "-t" to limit how long keys stay in the agent.
ssh_add = "ssh-add"
#ssh_add_options = ["-t", "8h"]

# Relative key paths below are resolved against this directory.
ssh_keys_dir = "~/.ssh"

# Command that prints a passphrase on stdout.
# {account} and {field} are replaced by each key's account and field.
passphrase_command = ["avendesora", "value", "--stdout", "{account}", "{field}"]

# Field used when a key does not name one.
default_field = "passcode"

# Seconds to wait for ssh-add to respond.
timeout_secs = 10

# One table per passphrase. Every file listed under `paths` is unlocked
# with the passphrase stored in `account`/`field` of the password manager.
# `account` defaults to the table name.
[keys.primary]
paths = ["id_ed25519", "id_rsa"]
account = "ssh"

[keys.github]
paths = "github"
field = "ssh"
"#
}

/// Create `path` with the example configuration if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file_at(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, example_config())?;
    log::info!("Created config file {}", path.display());

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ssh_add, "ssh-add");
        assert_eq!(config.default_field, "passcode");
        assert_eq!(config.timeout_secs, 10);
        assert!(config.keys.is_empty());
        assert!(config.passphrase_command.contains(&String::from("{account}")));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.ssh_add, "ssh-add");
        assert!(config.ssh_add_options.is_empty());
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::from_toml_str(example_config()).unwrap();
        let entries = config.key_entries().unwrap();
        assert_eq!(entries.len(), 2);

        // BTreeMap ordering: github before primary
        assert_eq!(entries[0].name, "github");
        assert_eq!(entries[0].account, "github");
        assert_eq!(entries[0].field, "ssh");
        assert_eq!(entries[1].name, "primary");
        assert_eq!(entries[1].account, "ssh");
        assert_eq!(entries[1].field, "passcode");
        assert_eq!(entries[1].paths.len(), 2);
    }

    #[test]
    fn test_paths_string_is_split_on_whitespace() {
        let config = Config::from_toml_str(
            r#"
ssh_keys_dir = "/keys"
[keys.work]
paths = """id_a   id_b
  /abs/id_c"""
"#,
        )
        .unwrap();
        let entries = config.key_entries().unwrap();
        assert_eq!(
            entries[0].paths,
            vec![
                PathBuf::from("/keys/id_a"),
                PathBuf::from("/keys/id_b"),
                PathBuf::from("/abs/id_c"),
            ]
        );
    }

    #[test]
    fn test_empty_paths_rejected() {
        let config = Config::from_toml_str(
            r#"
[keys.blank]
paths = "   "
"#,
        )
        .unwrap();
        let err = config.key_entries().unwrap_err();
        assert!(err.to_string().contains("has no paths"));
    }

    #[test]
    fn test_empty_account_rejected() {
        let config = Config::from_toml_str(
            r#"
[keys.blank]
paths = ["id"]
account = ""
"#,
        )
        .unwrap();
        assert!(config.key_entries().is_err());
    }

    #[test]
    fn test_unknown_key_field_rejected() {
        let result = Config::from_toml_str(
            r#"
[keys.typo]
paths = ["id"]
acount = "ssh"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = Config {
            timeout_secs: 0,
            ..Config::default()
        };
        assert!(config.timeout().is_err());
        assert_eq!(
            Config::default().timeout().unwrap(),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_list_settings_accept_strings() {
        let config = Config::from_toml_str(
            r#"
ssh_add_options = "-c  -t 8h"
passphrase_command = "pass show {account}"
timeout_secs = " 30 "
"#,
        )
        .unwrap();
        assert_eq!(config.ssh_add_options, vec!["-c", "-t", "8h"]);
        assert_eq!(config.passphrase_command, vec!["pass", "show", "{account}"]);
        assert_eq!(config.timeout_secs, 30);

        let config = Config::from_toml_str("ssh_add_options = [\"-t\", \"1h\"]").unwrap();
        assert_eq!(config.ssh_add_options, vec!["-t", "1h"]);
    }

    #[test]
    fn test_non_numeric_timeout_rejected() {
        let err = Config::from_toml_str("timeout_secs = \"soon\"").unwrap_err();
        assert!(err.to_string().contains("whole number"), "{err}");
    }

    #[test]
    fn test_apply_overrides() {
        let mut config =
            Config::from_toml_str("ssh_add = \"/opt/ssh-add\"\ntimeout_secs = 5").unwrap();
        config.apply_overrides(&Overrides {
            timeout_secs: Some(42),
            ..Overrides::default()
        });
        assert_eq!(config.ssh_add, "/opt/ssh-add");
        assert_eq!(config.timeout_secs, 42);

        config.apply_overrides(&Overrides {
            ssh_add: Some(String::from("ssh-add")),
            ssh_keys_dir: Some(PathBuf::from("/srv/keys")),
            timeout_secs: None,
        });
        assert_eq!(config.ssh_add, "ssh-add");
        assert_eq!(config.ssh_keys_dir, PathBuf::from("/srv/keys"));
        assert_eq!(config.timeout_secs, 42);
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = Config::load_from(Path::new("/nonexistent/addsshkeys.toml")).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_ensure_config_file_at() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        assert!(ensure_config_file_at(&path).unwrap());
        assert!(!ensure_config_file_at(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), example_config());
    }
}
