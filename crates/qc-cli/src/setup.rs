use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;

const CONFIG_TEMPLATE: &str = r#"# qc configuration
#
# Every setting can also be given as an environment variable:
#   QC_DATABASE, QC_RENDER__THEME, QC_REPLAY__DELAY_MS, ...

# Agent database (default: ~/.config/qc/qc.db)
# database = "~/.config/qc/qc.db"

# MCP server settings document (default: ~/.config/qc/mcp.json)
# mcp_settings = "~/.config/qc/mcp.json"

# ── Rendering ────────────────────────────────────────────────────

[render]
# "classed" emits hl-* CSS classes; "inline" uses the theme below
highlight = "classed"
theme = "InspiredGitHub"
# Minimum milliseconds between re-renders while streaming
throttle_ms = 50
tables = true
strikethrough = true
tasklists = true

# ── Replay ───────────────────────────────────────────────────────
# Pacing for `qc replay <file>`

[replay]
chunk_size = 4
delay_ms = 20
"#;

pub fn run() -> Result<()> {
    let config_dir = Config::config_dir()?;
    let config_path = config_dir.join("config.toml");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    if config_path.exists() {
        println!("Existing config file found:");
        println!("  {}", config_path.display());
        print!("\nOverwrite? (The existing file will be backed up) [y/N] ");

        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Setup cancelled.");
            return Ok(());
        }

        backup_file(&config_path)?;
    }

    std::fs::write(&config_path, CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Created {}", config_path.display());

    println!("\nNext steps:");
    println!("  1. Add an agent:      qc agents add quant --prompt \"You are a quant analyst.\"");
    println!("  2. Replay a response: qc replay response.txt");

    Ok(())
}

/// Back up a file to <name>.bak, appending a timestamp if .bak already exists.
fn backup_file(path: &Path) -> Result<()> {
    let mut backup = path.with_extension("toml.bak");

    if backup.exists() {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        backup = path.with_extension(format!("toml.bak.{}", timestamp));
    }

    std::fs::rename(path, &backup)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup.display()))?;
    println!("  Backed up to {}", backup.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses_to_defaults() {
        let config: Config = toml::from_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_backup_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "x").unwrap();
        backup_file(&path).unwrap();
        assert!(!path.exists());
        assert!(dir.path().join("config.toml.bak").exists());

        std::fs::write(&path, "y").unwrap();
        backup_file(&path).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
