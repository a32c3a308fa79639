use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Description of a tool the agent may call, as advertised by an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_schema", alias = "inputSchema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: empty_schema(),
        }
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// One-line summary used in prompt tool listings.
    pub fn summary_line(&self) -> String {
        format!(
            "{}: {} Parameters: {}",
            self.name, self.description, self.input_schema
        )
    }
}
