use anyhow::{Context, Result};

use addsshkeys_core::keys::display_path;
use addsshkeys_core::{plan, select, CommandSource, Config, Loader, Outcome, SshAdd};

/// Add the configured keys (or the named subset) to the agent.
///
/// Returns `false` when any key could not be added.
pub fn run_add(config: &Config, names: &[String]) -> Result<bool> {
    let entries = select(config.key_entries()?, names)?;
    if entries.is_empty() {
        anyhow::bail!(
            "No SSH keys configured\n\nRun 'addsshkeys config init' and add [keys.<name>] tables."
        );
    }

    let agent = SshAdd::from_config(config).context("Invalid ssh-add settings")?;
    let source = CommandSource::from_config(config).context("Invalid passphrase_command")?;
    let loader = Loader::new(agent, source);

    println!("\n🔑 Adding SSH keys\n");

    let report = loader.run(&entries);

    for result in &report.results {
        let path = display_path(&result.path);
        match &result.outcome {
            Outcome::Added => println!("  ✓ [{}] {}", result.entry, path),
            Outcome::Missing => eprintln!("  ✗ [{}] {}: file not found", result.entry, path),
            Outcome::Failed(e) => eprintln!("  ✗ [{}] {}: {}", result.entry, path, e),
        }
    }

    if let Some(e) = &report.aborted {
        eprintln!("\n✗ Stopped: {}", e);
        return Ok(false);
    }

    println!("\n{} added, {} failed", report.added(), report.failed());

    Ok(report.is_success())
}

/// Print the keys that `add` would process.
pub fn show_plan(config: &Config, names: &[String]) -> Result<()> {
    let entries = select(config.key_entries()?, names)?;

    println!("\n🔑 Keys that would be added (dry run)\n");
    println!("  ssh-add: {} {}", config.ssh_add, config.ssh_add_options.join(" "));
    println!();

    for planned in plan(&entries) {
        let marker = if planned.exists { "✓" } else { "✗ missing" };
        println!(
            "  [{}] {} (passphrase: {}.{}) {}",
            planned.entry,
            display_path(&planned.path),
            planned.account,
            planned.field,
            marker
        );
    }

    Ok(())
}
