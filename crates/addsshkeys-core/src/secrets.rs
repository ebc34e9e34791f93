//! Passphrase lookup through an external password manager.

use std::process::{Command, Stdio};
use zeroize::Zeroizing;

use crate::config::{Config, ACCOUNT_PLACEHOLDER, FIELD_PLACEHOLDER};
use crate::error::{Error, Result};

/// Something that can produce the passphrase for an account field.
pub trait PassphraseSource {
    fn passphrase(&self, account: &str, field: &str) -> Result<Zeroizing<String>>;
}

/// Runs a password-manager command and reads the passphrase from its stdout.
///
/// Stdin and stderr stay attached to the terminal so the password manager
/// can ask for its own master passphrase.
#[derive(Debug, Clone)]
pub struct CommandSource {
    template: Vec<String>,
}

impl CommandSource {
    /// Create a source from an argv template containing `{account}` and
    /// `{field}` placeholders.
    pub fn new(template: Vec<String>) -> Result<Self> {
        if template.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(Error::Config(String::from(
                "passphrase_command must name a program",
            )));
        }
        Ok(Self { template })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.passphrase_command.clone())
    }

    fn program(&self) -> &str {
        &self.template[0]
    }

    /// Build the argv for one lookup.
    pub fn argv(&self, account: &str, field: &str) -> Vec<String> {
        self.template
            .iter()
            .map(|arg| {
                arg.replace(ACCOUNT_PLACEHOLDER, account)
                    .replace(FIELD_PLACEHOLDER, field)
            })
            .collect()
    }
}

impl PassphraseSource for CommandSource {
    fn passphrase(&self, account: &str, field: &str) -> Result<Zeroizing<String>> {
        let argv = self.argv(account, field);
        let program = self.program().to_string();
        log::debug!("Fetching passphrase for {}.{} using {}", account, field, program);

        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| Error::PasswordManager {
                program: program.clone(),
                message: e.to_string(),
            })?;

        let stdout = Zeroizing::new(output.stdout);

        if !output.status.success() {
            return Err(Error::PasswordManager {
                program,
                message: format!("{} while looking up {}.{}", output.status, account, field),
            });
        }

        let text = std::str::from_utf8(&stdout).map_err(|_| Error::PasswordManager {
            program: program.clone(),
            message: String::from("output is not valid UTF-8"),
        })?;

        let passphrase = Zeroizing::new(first_line(text).to_string());
        if passphrase.is_empty() {
            return Err(Error::PasswordManager {
                program,
                message: format!("empty passphrase for {}.{}", account, field),
            });
        }
        Ok(passphrase)
    }
}

/// The first line of `text` without its line terminator.
fn first_line(text: &str) -> &str {
    let line = text.split('\n').next().unwrap_or("");
    line.strip_suffix('\r').unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(args: &[&str]) -> CommandSource {
        CommandSource::new(args.iter().map(|s| (*s).to_string()).collect()).unwrap()
    }

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("secret\n"), "secret");
        assert_eq!(first_line("secret\r\nmore\n"), "secret");
        assert_eq!(first_line("no newline"), "no newline");
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn test_argv_substitution() {
        let src = source(&["pm", "get", "{account}/{field}", "--field={field}"]);
        assert_eq!(
            src.argv("github", "ssh"),
            vec!["pm", "get", "github/ssh", "--field=ssh"]
        );
    }

    #[test]
    fn test_empty_template_rejected() {
        assert!(CommandSource::new(Vec::new()).is_err());
        assert!(CommandSource::new(vec![String::from(" ")]).is_err());
    }

    #[test]
    fn test_passphrase_from_command() {
        let src = source(&["printf", "%s-%s\\nignored\\n", "{account}", "{field}"]);
        let pass = src.passphrase("work", "passcode").unwrap();
        assert_eq!(pass.as_str(), "work-passcode");
    }

    #[test]
    fn test_failing_command() {
        let src = source(&["sh", "-c", "exit 3"]);
        let err = src.passphrase("a", "b").unwrap_err();
        assert!(matches!(err, Error::PasswordManager { .. }));
    }

    #[test]
    fn test_empty_output_rejected() {
        let src = source(&["true"]);
        let err = src.passphrase("a", "b").unwrap_err();
        assert!(err.to_string().contains("empty passphrase"));
    }

    #[test]
    fn test_missing_program() {
        let src = source(&["/nonexistent/password-manager"]);
        let err = src.passphrase("a", "b").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/password-manager"));
    }
}
