//! Adds configured keys to the agent, one file at a time.

use std::path::PathBuf;
use zeroize::Zeroizing;

use crate::agent::Agent;
use crate::error::{Error, Result};
use crate::keys::KeyEntry;
use crate::secrets::PassphraseSource;

/// What happened to a single key file.
#[derive(Debug)]
pub enum Outcome {
    Added,
    /// The file does not exist; ssh-add was not run.
    Missing,
    Failed(Error),
}

/// Result for one key file.
#[derive(Debug)]
pub struct KeyResult {
    /// Name of the key entry the file belongs to.
    pub entry: String,
    pub path: PathBuf,
    pub outcome: Outcome,
}

/// Summary of a run.
#[derive(Debug, Default)]
pub struct Report {
    pub results: Vec<KeyResult>,
    /// Set when a fatal error stopped the run early.
    pub aborted: Option<Error>,
}

impl Report {
    pub fn added(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Added))
            .count()
    }

    /// Files that were missing or failed.
    pub fn failed(&self) -> usize {
        self.results.len() - self.added()
    }

    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.failed() == 0
    }
}

/// One line of a dry-run plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedKey {
    pub entry: String,
    pub account: String,
    pub field: String,
    pub path: PathBuf,
    pub exists: bool,
}

/// Restrict `entries` to the ones named in `names`, in the order given.
///
/// An empty `names` selects every entry.
pub fn select(entries: Vec<KeyEntry>, names: &[String]) -> Result<Vec<KeyEntry>> {
    if names.is_empty() {
        return Ok(entries);
    }

    names
        .iter()
        .map(|name| {
            entries
                .iter()
                .find(|entry| &entry.name == name)
                .cloned()
                .ok_or_else(|| Error::UnknownKey {
                    name: name.clone(),
                    known: entries
                        .iter()
                        .map(|e| e.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
        })
        .collect()
}

/// Describe what [`Loader::run`] would do without running anything.
pub fn plan(entries: &[KeyEntry]) -> Vec<PlannedKey> {
    entries
        .iter()
        .flat_map(|entry| {
            entry.paths.iter().map(move |path| PlannedKey {
                entry: entry.name.clone(),
                account: entry.account.clone(),
                field: entry.field.clone(),
                path: path.clone(),
                exists: path.exists(),
            })
        })
        .collect()
}

/// Drives an [`Agent`] with passphrases from a [`PassphraseSource`].
#[derive(Debug)]
pub struct Loader<A, S> {
    agent: A,
    source: S,
}

impl<A: Agent, S: PassphraseSource> Loader<A, S> {
    pub fn new(agent: A, source: S) -> Self {
        Self { agent, source }
    }

    /// Add every key file of every entry.
    ///
    /// Each entry's passphrase is fetched at most once, and only when
    /// ssh-add asks for it. A fatal error (no agent) stops the run.
    pub fn run(&self, entries: &[KeyEntry]) -> Report {
        let mut report = Report::default();

        for entry in entries {
            log::debug!("Processing key entry {}", entry);
            let mut cached: Option<Zeroizing<String>> = None;

            for path in &entry.paths {
                if !path.exists() {
                    log::warn!("Key file {} does not exist", path.display());
                    report.results.push(KeyResult {
                        entry: entry.name.clone(),
                        path: path.clone(),
                        outcome: Outcome::Missing,
                    });
                    continue;
                }

                let mut fetch = || -> Result<Zeroizing<String>> {
                    if let Some(secret) = &cached {
                        return Ok(secret.clone());
                    }
                    let secret = self.source.passphrase(&entry.account, &entry.field)?;
                    cached = Some(secret.clone());
                    Ok(secret)
                };

                match self.agent.add_key(path, &mut fetch) {
                    Ok(()) => report.results.push(KeyResult {
                        entry: entry.name.clone(),
                        path: path.clone(),
                        outcome: Outcome::Added,
                    }),
                    Err(e) if e.is_fatal() => {
                        log::warn!("Stopping: {}", e);
                        report.aborted = Some(e);
                        return report;
                    }
                    Err(e) => {
                        log::warn!("Could not add {}: {}", path.display(), e);
                        report.results.push(KeyResult {
                            entry: entry.name.clone(),
                            path: path.clone(),
                            outcome: Outcome::Failed(e),
                        });
                    }
                }
            }
        }

        report
    }
}
