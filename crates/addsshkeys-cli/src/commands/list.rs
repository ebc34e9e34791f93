use anyhow::{Context, Result};

use addsshkeys_core::{Agent, Config, SshAdd};

/// Show the identities currently held by the agent.
pub fn run_list(config: &Config) -> Result<()> {
    let agent = SshAdd::from_config(config)?;
    let identities = agent
        .list()
        .with_context(|| format!("Failed to list identities with {}", agent.program()))?;

    if identities.is_empty() {
        println!("The agent has no identities.");
        println!("\nRun 'addsshkeys' to add the configured keys.");
        return Ok(());
    }

    for identity in identities {
        println!("{}", identity);
    }

    Ok(())
}
