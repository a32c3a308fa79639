//! Agent configuration for quantchat.
//!
//! This crate provides:
//! - `AgentStore`, SQLite-backed agent records and settings
//! - `McpSettingsFile` for the MCP server settings document
//! - Prompt templates for ReAct-style tool use

mod mcp;
pub mod prompt;
mod record;
mod store;

pub use mcp::{McpServerConfig, McpSettings, McpSettingsFile, MCP_SERVERS_KEY};
pub use prompt::{agent_system_prompt, build_react_prompt, REACT_STOP, SUMMARIZE};
pub use record::{AgentRecord, AgentUpdate, NewAgent};
pub use store::{AgentStore, SCHEMA_VERSION};
