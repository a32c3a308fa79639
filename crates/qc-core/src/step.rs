//! Structured steps extracted from an assistant response.

use serde::{Deserialize, Serialize};

/// Kind of a parsed step. The final answer is not a step; it is carried
/// separately as [`ParsedMessage::response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Thinking,
    Planning,
    Step,
    Action,
    ToolCall,
    Observation,
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Thinking => "Thinking",
            StepKind::Planning => "Planning",
            StepKind::Step => "Step",
            StepKind::Action => "Action",
            StepKind::ToolCall => "Tool call",
            StepKind::Observation => "Observation",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub content: String,
    /// Ordinal from `Step <n>:` markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    /// Tool or action name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Tool arguments (`Tool Input:` / `Action Input:` / tool-call JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

impl Step {
    pub fn new(kind: StepKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            number: None,
            tool: None,
            input: None,
        }
    }

    pub fn with_number(mut self, number: u32) -> Self {
        self.number = Some(number);
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// Result of parsing a message buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMessage {
    pub steps: Vec<Step>,
    pub response: String,
    /// Step markers or an open tag were seen but no final response yet.
    pub is_streaming: bool,
}

impl ParsedMessage {
    pub fn has_steps(&self) -> bool {
        !self.steps.is_empty()
    }

    /// The step still being written, if the buffer is mid-step.
    pub fn current_step(&self) -> Option<&Step> {
        if self.is_streaming {
            self.steps.last()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_serializes_type_field() {
        let step = Step::new(StepKind::ToolCall, "get_quote").with_tool("get_quote");
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["tool"], "get_quote");
        assert!(json.get("number").is_none());
    }

    #[test]
    fn test_parsed_message_camel_case() {
        let parsed = ParsedMessage {
            steps: vec![],
            response: "done".into(),
            is_streaming: false,
        };
        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["isStreaming"], false);
        assert_eq!(json["response"], "done");
    }

    #[test]
    fn test_current_step_only_while_streaming() {
        let mut parsed = ParsedMessage {
            steps: vec![Step::new(StepKind::Thinking, "hmm")],
            response: String::new(),
            is_streaming: true,
        };
        assert_eq!(parsed.current_step().map(|s| s.kind), Some(StepKind::Thinking));
        parsed.is_streaming = false;
        assert!(parsed.current_step().is_none());
    }
}
