//! Core library for addsshkeys.
//!
//! Loads the key configuration, looks up passphrases through an external
//! password manager, and drives `ssh-add` under a pseudo-terminal so each
//! configured key lands in the running SSH agent without manual typing.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod agent;
pub mod config;
pub mod error;
pub mod keys;
pub mod loader;
pub mod secrets;

pub use agent::{Agent, Prompt, SshAdd};
pub use config::{Config, KeySpec, Overrides};
pub use error::{Error, Result};
pub use keys::KeyEntry;
pub use loader::{plan, select, KeyResult, Loader, Outcome, PlannedKey, Report};
pub use secrets::{CommandSource, PassphraseSource};
