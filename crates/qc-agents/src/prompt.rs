//! Prompt templates.
//!
//! The ReAct template is what makes a model emit the `Thought:` /
//! `Action:` / `Final Answer:` lines the step parser understands.

use qc_core::ToolDefinition;

use crate::record::AgentRecord;

/// Tool listing and output format, without the question.
pub const REACT_INSTRUCTIONS: &str = "Answer the following question as best you can. You have access to the following tools:

{{TOOLS}}

Use exactly the following format:

Question: the question you must answer
Thought: what you should do next
Action: the action to take, which must be one of [{{TOOL_NAMES}}]
Action Input: the input to the action, as JSON
Observation: the result of the action (provided by the system; never write it yourself)
... (this Thought/Action/Action Input/Observation can repeat several times)
Thought: I now know the final answer
Final Answer: the final answer to the original question

Rules:
- Call a tool by writing Action and Action Input first
- Observation is provided only by the system; never produce or invent it
- Stop immediately after Action Input and wait for the system to return the Observation
- The Final Answer must quote the real data from the Observations and must not invent anything that did not appear in them
- If an Observation reports success but does not contain the data you need, keep calling tools to get it

Example:
Question: the user's question
Thought: analyse the question and decide which tool to use
Action: the chosen tool name
Action Input: {arguments}

(Stop after Action Input and wait for the Observation)";

/// Trailer that hands the question to the model.
pub const REACT_QUESTION: &str = "Begin!

Question: {{QUERY}}
Thought:";

/// Asks the model to wrap up a tool-using exchange.
pub const SUMMARIZE: &str =
    "Summarize the conversation above and give a concise, clear reply.";

/// Stop sequences for ReAct requests, so the model cannot invent observations.
pub const REACT_STOP: &[&str] = &["Observation:"];

/// Replace `{{NAME}}` placeholders in one pass. Substituted text is not
/// scanned again; unknown placeholders are left as they are.
fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let value = after.find("}}").and_then(|end| {
            let key = &after[..end];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, end))
        });
        match value {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn tool_listing(tools: &[ToolDefinition]) -> String {
    tools
        .iter()
        .map(ToolDefinition::summary_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn tool_names(tools: &[ToolDefinition]) -> String {
    tools
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn react_instructions(tools: &[ToolDefinition]) -> String {
    let listing = tool_listing(tools);
    let names = tool_names(tools);
    fill(
        REACT_INSTRUCTIONS,
        &[("TOOLS", listing.as_str()), ("TOOL_NAMES", names.as_str())],
    )
}

/// Full ReAct prompt for `query`.
pub fn build_react_prompt(tools: &[ToolDefinition], query: &str) -> String {
    format!(
        "{}\n\n{}",
        react_instructions(tools),
        fill(REACT_QUESTION, &[("QUERY", query)])
    )
}

/// System prompt for a conversation with `agent`. Tool instructions are
/// appended only when the agent allows tools and some are available.
pub fn agent_system_prompt(agent: &AgentRecord, tools: &[ToolDefinition]) -> String {
    let base = agent.system_prompt.trim();
    if !agent.allow_tools || tools.is_empty() {
        return base.to_string();
    }
    let instructions = react_instructions(tools);
    if base.is_empty() {
        instructions
    } else {
        format!("{}\n\n{}", base, instructions)
    }
}
