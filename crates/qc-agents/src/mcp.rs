//! MCP server settings, kept as one JSON document on disk.
//!
//! The document is loaded and saved whole so keys this crate does not know
//! about survive a round trip. [`McpSettings::servers`] gives a typed view.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use qc_core::Error;

pub const MCP_SERVERS_KEY: &str = "mcpServers";

/// How to launch one MCP server over stdio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct McpSettings {
    document: Map<String, Value>,
}

impl Default for McpSettings {
    fn default() -> Self {
        let mut document = Map::new();
        document.insert(MCP_SERVERS_KEY.to_string(), Value::Object(Map::new()));
        Self { document }
    }
}

impl McpSettings {
    pub fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Object(document) => Ok(Self { document }),
            other => Err(Error::config(format!(
                "MCP settings must be a JSON object, got {}",
                json_type(&other)
            ))),
        }
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.document.clone())
    }

    pub fn to_json_pretty(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }

    /// Typed server entries, keyed by server name.
    pub fn servers(&self) -> Result<BTreeMap<String, McpServerConfig>, Error> {
        let entries = match self.document.get(MCP_SERVERS_KEY) {
            None => return Ok(BTreeMap::new()),
            Some(Value::Object(entries)) => entries,
            Some(other) => {
                return Err(Error::config(format!(
                    "'{}' must be an object, got {}",
                    MCP_SERVERS_KEY,
                    json_type(other)
                )))
            }
        };

        entries
            .iter()
            .map(|(name, entry)| {
                serde_json::from_value::<McpServerConfig>(entry.clone())
                    .map(|config| (name.clone(), config))
                    .map_err(|e| {
                        tracing::warn!(server = %name, error = %e, "Malformed MCP server entry");
                        Error::config(format!("MCP server '{}': {}", name, e))
                    })
            })
            .collect()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The settings document at a fixed path.
#[derive(Debug, Clone)]
pub struct McpSettingsFile {
    path: PathBuf,
}

impl McpSettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document. A missing file is an empty server list.
    pub fn load(&self) -> Result<McpSettings, Error> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => McpSettings::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No MCP settings file, using defaults");
                Ok(McpSettings::default())
            }
            Err(e) => Err(Error::storage(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Replace the document atomically: write a sibling temp file, then rename.
    pub fn save(&self, settings: &McpSettings) -> Result<(), Error> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::storage(format!("Failed to create directory: {}", e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(settings.to_json_pretty()?.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path)
            .map_err(|e| Error::storage(format!("Failed to replace {}: {}", self.path.display(), e.error)))?;
        tracing::debug!(path = %self.path.display(), "Saved MCP settings");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_file_is_empty_servers() {
        let dir = tempfile::tempdir().unwrap();
        let file = McpSettingsFile::new(dir.path().join("mcp.json"));
        let settings = file.load().unwrap();
        assert_eq!(settings.as_value(), json!({"mcpServers": {}}));
        assert!(settings.servers().unwrap().is_empty());
    }

    #[test]
    fn test_save_load_roundtrip_keeps_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let file = McpSettingsFile::new(dir.path().join("conf").join("mcp.json"));
        let settings = McpSettings::from_value(json!({
            "mcpServers": {
                "market-data": {
                    "command": "uvx",
                    "args": ["market-data-mcp"],
                    "env": {"API_KEY": "k"}
                }
            },
            "theme": "dark"
        }))
        .unwrap();

        file.save(&settings).unwrap();
        let loaded = file.load().unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.as_value()["theme"], "dark");

        let servers = loaded.servers().unwrap();
        let server = &servers["market-data"];
        assert_eq!(server.command, "uvx");
        assert_eq!(server.args, vec!["market-data-mcp"]);
        assert_eq!(server.env["API_KEY"], "k");
    }

    #[test]
    fn test_save_overwrites_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let file = McpSettingsFile::new(dir.path().join("mcp.json"));
        file.save(&McpSettings::default()).unwrap();
        file.save(&McpSettings::parse(r#"{"mcpServers":{"a":{"command":"x"}}}"#).unwrap())
            .unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(file.load().unwrap().servers().unwrap().len(), 1);
    }

    #[test]
    fn test_top_level_must_be_object() {
        assert!(matches!(McpSettings::parse("[]"), Err(Error::Config(_))));
        assert!(matches!(McpSettings::parse("not json"), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_malformed_server_entry_rejected() {
        let settings = McpSettings::parse(r#"{"mcpServers":{"bad":{"args":[]}}}"#).unwrap();
        assert!(settings.servers().is_err());

        let settings = McpSettings::parse(r#"{"mcpServers":[]}"#).unwrap();
        assert!(settings.servers().is_err());

        let settings = McpSettings::parse(r#"{"other":1}"#).unwrap();
        assert!(settings.servers().unwrap().is_empty());
    }
}
