//! Key entries and key file path resolution.

use std::fmt;
use std::path::{Path, PathBuf};

/// A fully resolved key entry from the configuration.
///
/// One entry maps a single password-manager account/field pair to one or
/// more private key files that share that passphrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    /// Name of the entry (the table name under `[keys]`).
    pub name: String,
    /// Password-manager account holding the passphrase.
    pub account: String,
    /// Field within the account that holds the passphrase.
    pub field: String,
    /// Absolute paths of the private key files.
    pub paths: Vec<PathBuf>,
}

impl KeyEntry {
    /// Paths in this entry that do not exist on disk.
    pub fn missing_paths(&self) -> Vec<&Path> {
        self.paths
            .iter()
            .filter(|p| !p.exists())
            .map(PathBuf::as_path)
            .collect()
    }
}

impl fmt::Display for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}.{})", self.name, self.account, self.field)
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(stripped) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(raw)
}

/// Resolve a configured key path.
///
/// `~` is expanded and relative paths are taken relative to the SSH keys
/// directory.
pub fn resolve_key_path(ssh_keys_dir: &Path, raw: &str) -> PathBuf {
    let path = expand_home(raw.trim());
    if path.is_absolute() {
        path
    } else {
        let dir = expand_home(&ssh_keys_dir.to_string_lossy());
        dir.join(path)
    }
}

/// Abbreviate the home directory back to `~` for display.
pub fn display_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            if rest.as_os_str().is_empty() {
                return String::from("~");
            }
            return format!("~/{}", rest.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home_plain_path_unchanged() {
        assert_eq!(expand_home("/etc/ssh/key"), PathBuf::from("/etc/ssh/key"));
        assert_eq!(expand_home("id_rsa"), PathBuf::from("id_rsa"));
        // Only a leading tilde is special
        assert_eq!(expand_home("a/~/b"), PathBuf::from("a/~/b"));
    }

    #[test]
    fn test_expand_home_tilde() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand_home("~"), home);
        assert_eq!(expand_home("~/.ssh/id_ed25519"), home.join(".ssh/id_ed25519"));
    }

    #[test]
    fn test_resolve_relative_to_keys_dir() {
        let dir = Path::new("/srv/keys");
        assert_eq!(
            resolve_key_path(dir, "github"),
            PathBuf::from("/srv/keys/github")
        );
        assert_eq!(
            resolve_key_path(dir, "  work/id_rsa "),
            PathBuf::from("/srv/keys/work/id_rsa")
        );
    }

    #[test]
    fn test_resolve_absolute_kept() {
        let dir = Path::new("/srv/keys");
        assert_eq!(
            resolve_key_path(dir, "/opt/deploy_key"),
            PathBuf::from("/opt/deploy_key")
        );
    }

    #[test]
    fn test_missing_paths() {
        let temp = tempfile::TempDir::new().unwrap();
        let present = temp.path().join("present");
        std::fs::write(&present, "key").unwrap();
        let absent = temp.path().join("absent");

        let entry = KeyEntry {
            name: String::from("primary"),
            account: String::from("ssh"),
            field: String::from("passcode"),
            paths: vec![present, absent.clone()],
        };
        assert_eq!(entry.missing_paths(), vec![absent.as_path()]);
    }

    #[test]
    fn test_display_path_outside_home() {
        assert_eq!(display_path(Path::new("/opt/key")), "/opt/key");
    }

    #[test]
    fn test_entry_display() {
        let entry = KeyEntry {
            name: String::from("github"),
            account: String::from("github"),
            field: String::from("ssh"),
            paths: Vec::new(),
        };
        assert_eq!(entry.to_string(), "github (github.ssh)");
    }
}
