//! Agent configuration records.

use serde::{Deserialize, Serialize};

/// A stored agent: a named system prompt plus whether it may call tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: i64,
    pub name: String,
    pub system_prompt: String,
    pub allow_tools: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for creating an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_allow_tools")]
    pub allow_tools: bool,
}

fn default_allow_tools() -> bool {
    true
}

impl NewAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: String::new(),
            allow_tools: default_allow_tools(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_allow_tools(mut self, allow: bool) -> Self {
        self.allow_tools = allow;
        self
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub system_prompt: Option<String>,
    pub allow_tools: Option<bool>,
}

impl AgentUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.system_prompt.is_none() && self.allow_tools.is_none()
    }

    pub(crate) fn apply(&self, record: &mut AgentRecord) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(prompt) = &self.system_prompt {
            record.system_prompt = prompt.clone();
        }
        if let Some(allow) = self.allow_tools {
            record.allow_tools = allow;
        }
    }
}
