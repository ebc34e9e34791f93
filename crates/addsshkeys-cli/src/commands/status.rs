use anyhow::Result;
use std::path::Path;

use addsshkeys_core::agent::agent_socket;
use addsshkeys_core::keys::display_path;
use addsshkeys_core::Config;

pub fn show_status(config: &Config, config_path: &Path) -> Result<()> {
    let entries = config.key_entries()?;

    println!("\n📊 addsshkeys Status\n");
    println!("  Config file: {}", display_path(config_path));
    match agent_socket() {
        Some(socket) => println!("  Agent socket: {}", socket.display()),
        None => println!("  Agent socket: <SSH_AUTH_SOCK not set>"),
    }
    println!("  Key entries: {}", entries.len());

    for entry in &entries {
        println!("\n  {}", entry);
        for path in &entry.paths {
            let state = if path.exists() { "ok" } else { "missing" };
            println!("    {:<8} {}", state, display_path(path));
        }
    }

    let missing: usize = entries.iter().map(|e| e.missing_paths().len()).sum();
    if missing > 0 {
        println!("\n  {} key file(s) not found", missing);
    }

    Ok(())
}
