use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use qc_render::{Highlight, RenderOptions, DEFAULT_THEME};

const ENV_PREFIX: &str = "QC_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent database path (supports $HOME, ~). Defaults to ~/.config/qc/qc.db
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// MCP settings document (supports $HOME, ~). Defaults to ~/.config/qc/mcp.json
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_settings: Option<String>,

    pub render: RenderConfig,

    pub replay: ReplayConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightMode {
    #[default]
    Classed,
    Inline,
}

/// Markdown rendering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub highlight: HighlightMode,

    /// syntect theme for inline highlighting
    pub theme: String,

    /// Minimum time between re-renders while streaming
    pub throttle_ms: u64,

    pub tables: bool,
    pub strikethrough: bool,
    pub tasklists: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            highlight: HighlightMode::Classed,
            theme: DEFAULT_THEME.to_string(),
            throttle_ms: 50,
            tables: true,
            strikethrough: true,
            tasklists: true,
        }
    }
}

impl RenderConfig {
    pub fn options(&self) -> RenderOptions {
        let highlight = match self.highlight {
            HighlightMode::Classed => Highlight::Classed,
            HighlightMode::Inline => Highlight::Inline {
                theme: self.theme.clone(),
            },
        };
        RenderOptions {
            tables: self.tables,
            strikethrough: self.strikethrough,
            tasklists: self.tasklists,
            highlight,
        }
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

/// Defaults for `qc replay`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Characters per simulated token
    pub chunk_size: usize,

    /// Delay between simulated tokens
    pub delay_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4,
            delay_ms: 20,
        }
    }
}

static VAR_PATTERN: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("valid variable pattern")
});

/// Expand environment variables in a path string
/// Supports: $VAR, ${VAR}, ~
pub fn expand_path(path: &str) -> PathBuf {
    let mut result = path.to_string();

    if result.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            result = format!("{}{}", home.display(), &result[1..]);
        }
    } else if result == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    let expanded = VAR_PATTERN.replace_all(&result, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    });

    PathBuf::from(expanded.to_string())
}

impl Config {
    /// Defaults, then the config file if present, then `QC_*` variables.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_layered(&path, ENV_PREFIX)
    }

    fn load_layered(path: &Path, env_prefix: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
        }
        figment
            .merge(Env::prefixed(env_prefix).split("__"))
            .extract()
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("qc"))
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database {
            Some(path) => Ok(expand_path(path)),
            None => Ok(Self::config_dir()?.join("qc.db")),
        }
    }

    pub fn mcp_settings_path(&self) -> Result<PathBuf> {
        match &self.mcp_settings {
            Some(path) => Ok(expand_path(path)),
            None => Ok(Self::config_dir()?.join("mcp.json")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            database = "~/data/qc.db"

            [render]
            highlight = "inline"
            theme = "base16-ocean.dark"
            throttle_ms = 100

            [replay]
            chunk_size = 8
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.as_deref(), Some("~/data/qc.db"));
        assert_eq!(config.render.highlight, HighlightMode::Inline);
        assert_eq!(config.render.throttle_interval(), Duration::from_millis(100));
        assert!(config.render.tables);
        assert_eq!(config.replay.chunk_size, 8);
        assert_eq!(config.replay.delay_ms, 20);
    }

    #[test]
    fn test_render_options_from_config() {
        let render = RenderConfig {
            highlight: HighlightMode::Inline,
            theme: "InspiredGitHub".into(),
            strikethrough: false,
            ..RenderConfig::default()
        };
        let options = render.options();
        assert_eq!(
            options.highlight,
            Highlight::Inline {
                theme: "InspiredGitHub".into()
            }
        );
        assert!(!options.strikethrough);
        assert!(options.tables);
    }

    #[test]
    fn test_layering_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[render]\nthrottle_ms = 75\ntheme = \"base16-ocean.dark\"\n",
        )
        .unwrap();

        std::env::set_var("QC_LAYER_TEST_RENDER__THROTTLE_MS", "10");
        let config = Config::load_layered(&path, "QC_LAYER_TEST_").unwrap();
        std::env::remove_var("QC_LAYER_TEST_RENDER__THROTTLE_MS");

        assert_eq!(config.render.throttle_ms, 10);
        assert_eq!(config.render.theme, "base16-ocean.dark");
        assert!(config.render.tasklists);
        assert_eq!(config.replay, ReplayConfig::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            Config::load_layered(&dir.path().join("absent.toml"), "QC_ABSENT_TEST_").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_expand_path() {
        std::env::set_var("QC_EXPAND_TEST_DIR", "/srv/qc");
        assert_eq!(
            expand_path("${QC_EXPAND_TEST_DIR}/qc.db"),
            PathBuf::from("/srv/qc/qc.db")
        );
        assert_eq!(
            expand_path("$QC_EXPAND_TEST_UNSET/x"),
            PathBuf::from("$QC_EXPAND_TEST_UNSET/x")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/qc.db"), home.join("qc.db"));
        }
    }
}
