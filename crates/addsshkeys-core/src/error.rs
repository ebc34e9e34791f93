//! Error types for loading keys into the agent.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while configuring or adding keys.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration is well-formed but semantically invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The layered configuration could not be assembled.
    #[error("failed to load configuration from {path}: {message}")]
    ConfigLoad { path: PathBuf, message: String },

    /// A TOML document could not be parsed.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A key name given on the command line is not in the configuration.
    #[error("unknown key '{name}' (configured keys: {known})")]
    UnknownKey { name: String, known: String },

    /// The password manager could not produce a passphrase.
    #[error("password manager '{program}' failed: {message}")]
    PasswordManager { program: String, message: String },

    /// A child process could not be started.
    #[error("failed to run '{program}': {message}")]
    Spawn { program: String, message: String },

    /// ssh-add rejected the passphrase.
    #[error("bad passphrase for {}", path.display())]
    BadPassphrase { path: PathBuf },

    /// No SSH agent is reachable through `SSH_AUTH_SOCK`.
    #[error("could not connect to the SSH agent (is SSH_AUTH_SOCK set?)")]
    NoAgent,

    #[error("key file not found: {}", path.display())]
    MissingKey { path: PathBuf },

    /// ssh-add refuses keys readable by other users.
    #[error("permissions on {} are too open", path.display())]
    InsecureKey { path: PathBuf },

    #[error("not a valid private key: {}", path.display())]
    InvalidKey { path: PathBuf },

    /// ssh-add exited without printing anything we recognise.
    #[error("ssh-add exited unexpectedly for {}: {output}", path.display())]
    AgentExited { path: PathBuf, output: String },

    #[error("timed out after {secs}s waiting for ssh-add on {}", path.display())]
    Timeout { path: PathBuf, secs: u64 },
}

impl Error {
    /// Returns `true` when no further keys can be added in this run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NoAgent)
    }

    /// Returns `true` when the error concerns a specific key file rather
    /// than the environment.
    pub fn is_key_problem(&self) -> bool {
        matches!(
            self,
            Self::BadPassphrase { .. }
                | Self::MissingKey { .. }
                | Self::InsecureKey { .. }
                | Self::InvalidKey { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_agent_is_fatal() {
        assert!(Error::NoAgent.is_fatal());
        assert!(!Error::BadPassphrase {
            path: PathBuf::from("/k")
        }
        .is_fatal());
    }

    #[test]
    fn test_key_problems() {
        let path = PathBuf::from("/home/u/.ssh/id_ed25519");
        assert!(Error::InvalidKey { path: path.clone() }.is_key_problem());
        assert!(Error::InsecureKey { path: path.clone() }.is_key_problem());
        assert!(!Error::Timeout { path, secs: 10 }.is_key_problem());
        assert!(!Error::NoAgent.is_key_problem());
    }

    #[test]
    fn test_display_includes_path() {
        let err = Error::BadPassphrase {
            path: PathBuf::from("/tmp/github"),
        };
        assert_eq!(err.to_string(), "bad passphrase for /tmp/github");
    }
}
