//! Driving `ssh-add` through a pseudo-terminal.
//!
//! ssh-add reads passphrases from the controlling terminal, not stdin, so
//! each key is added by spawning ssh-add in a pty, waiting for one of its
//! known messages, and typing the passphrase when asked.

use rexpect::error::Error as ExpectError;
use rexpect::session::{spawn_command, PtySession};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::config::Config;
use crate::error::{Error, Result};

/// Every ssh-add message the driver reacts to.
const MESSAGES: &str = concat!(
    r"Enter passphrase for .+?:",
    r"|Bad passphrase",
    r"|Identity added",
    r"|Could not open a connection to your authentication agent",
    r"|Error connecting to agent",
    r"|No such file or directory",
    r"|are too open",
    r"|Error loading key",
    r"|invalid format",
);

/// Classified ssh-add output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// ssh-add is waiting for the passphrase.
    Passphrase,
    /// The passphrase just typed was rejected.
    BadPassphrase,
    /// The key is now in the agent.
    Added,
    /// No agent is listening on `SSH_AUTH_SOCK`.
    NoAgent,
    MissingKey,
    /// The key file is readable by others.
    InsecureKey,
    /// The file is not a private key ssh-add understands.
    InvalidKey,
}

impl Prompt {
    /// Classify a fragment of ssh-add output.
    pub fn classify(text: &str) -> Option<Self> {
        if text.contains("Bad passphrase") {
            Some(Self::BadPassphrase)
        } else if text.contains("Enter passphrase for") {
            Some(Self::Passphrase)
        } else if text.contains("Identity added") {
            Some(Self::Added)
        } else if text.contains("Could not open a connection to your authentication agent")
            || text.contains("Error connecting to agent")
        {
            Some(Self::NoAgent)
        } else if text.contains("No such file or directory") {
            Some(Self::MissingKey)
        } else if text.contains("are too open") {
            Some(Self::InsecureKey)
        } else if text.contains("Error loading key") || text.contains("invalid format") {
            Some(Self::InvalidKey)
        } else {
            None
        }
    }

    /// The error this message implies for `path`, if any.
    fn into_error(self, path: &Path) -> Option<Error> {
        let path = path.to_path_buf();
        match self {
            Self::Passphrase | Self::Added => None,
            Self::BadPassphrase => Some(Error::BadPassphrase { path }),
            Self::NoAgent => Some(Error::NoAgent),
            Self::MissingKey => Some(Error::MissingKey { path }),
            Self::InsecureKey => Some(Error::InsecureKey { path }),
            Self::InvalidKey => Some(Error::InvalidKey { path }),
        }
    }
}

/// Operations on an SSH agent.
pub trait Agent {
    /// Add the key at `path`. `passphrase` is called only if the agent asks
    /// for one.
    fn add_key(
        &self,
        path: &Path,
        passphrase: &mut dyn FnMut() -> Result<Zeroizing<String>>,
    ) -> Result<()>;

    /// Identities currently held by the agent, one line each.
    fn list(&self) -> Result<Vec<String>>;
}

/// The ssh-add program with its configured options.
#[derive(Debug, Clone)]
pub struct SshAdd {
    program: String,
    options: Vec<String>,
    timeout: Duration,
}

impl SshAdd {
    pub fn new(program: impl Into<String>, options: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            options,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.ssh_add.clone(),
            config.ssh_add_options.clone(),
            config.timeout()?,
        ))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.options).arg(path);
        // Force the terminal prompt even when an askpass helper is configured.
        cmd.env_remove("SSH_ASKPASS_REQUIRE");
        cmd
    }

    fn spawn(&self, path: &Path) -> Result<PtySession> {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        log::debug!(
            "Running {} {} {}",
            self.program,
            self.options.join(" "),
            path.display()
        );
        spawn_command(self.command(path), Some(timeout_ms)).map_err(|e| Error::Spawn {
            program: self.program.clone(),
            message: e.to_string(),
        })
    }

    fn expect_error(&self, path: &Path, err: ExpectError) -> Error {
        match err {
            ExpectError::EOF { got, .. } => match Prompt::classify(&got)
                .and_then(|prompt| prompt.into_error(path))
            {
                Some(error) => error,
                None => Error::AgentExited {
                    path: path.to_path_buf(),
                    output: got.trim().to_string(),
                },
            },
            ExpectError::Timeout { .. } => Error::Timeout {
                path: path.to_path_buf(),
                secs: self.timeout.as_secs(),
            },
            other => Error::Spawn {
                program: self.program.clone(),
                message: other.to_string(),
            },
        }
    }
}

impl Agent for SshAdd {
    fn add_key(
        &self,
        path: &Path,
        passphrase: &mut dyn FnMut() -> Result<Zeroizing<String>>,
    ) -> Result<()> {
        let mut session = self.spawn(path)?;
        let mut answered = false;

        loop {
            let (_, matched) = session
                .exp_regex(MESSAGES)
                .map_err(|e| self.expect_error(path, e))?;

            match Prompt::classify(&matched) {
                Some(Prompt::Passphrase) if answered => {
                    return Err(Error::BadPassphrase {
                        path: path.to_path_buf(),
                    });
                }
                Some(Prompt::Passphrase) => {
                    let secret = passphrase()?;
                    session
                        .send_line(secret.as_str())
                        .map_err(|e| self.expect_error(path, e))?;
                    answered = true;
                }
                Some(Prompt::Added) => {
                    // ssh-add may still be flushing output; the key is already added.
                    if let Err(e) = session.exp_eof() {
                        log::debug!("ssh-add did not exit cleanly: {}", e);
                    }
                    log::info!("Added {}", path.display());
                    return Ok(());
                }
                Some(prompt) => {
                    if let Some(error) = prompt.into_error(path) {
                        return Err(error);
                    }
                }
                None => {
                    return Err(Error::AgentExited {
                        path: path.to_path_buf(),
                        output: matched,
                    });
                }
            }
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        let output = Command::new(&self.program)
            .arg("-l")
            .output()
            .map_err(|e| Error::Spawn {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_list_output(output.status.code(), &stdout, &stderr)
    }
}

/// Interpret `ssh-add -l` results.
///
/// Exit status 1 means the agent is empty; any other failure means there
/// is no usable agent.
fn parse_list_output(code: Option<i32>, stdout: &str, stderr: &str) -> Result<Vec<String>> {
    match code {
        Some(0) => Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()),
        Some(1) if stdout.contains("no identities") || stderr.contains("no identities") => {
            Ok(Vec::new())
        }
        _ if Prompt::classify(stderr) == Some(Prompt::NoAgent) => Err(Error::NoAgent),
        _ => Err(Error::AgentExited {
            path: PathBuf::from("-l"),
            output: format!("{}{}", stdout, stderr).trim().to_string(),
        }),
    }
}

/// The agent socket named by `SSH_AUTH_SOCK`, if set.
pub fn agent_socket() -> Option<PathBuf> {
    std::env::var_os("SSH_AUTH_SOCK")
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
}
