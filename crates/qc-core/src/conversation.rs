//! Chat messages and their streaming lifecycle.
//!
//! An assistant message owns an append-only buffer while it streams. Every
//! structured chunk (reasoning, tool calls) is written into that buffer as
//! tags so that [`crate::parse`] over the buffer alone reconstructs the
//! whole message. Once finished, failed or aborted the buffer is frozen.

use serde_json::Value;

use crate::error::Error;
use crate::message::{Message, Role, StreamChunk};
use crate::parse::parse;
use crate::segment::{THINK_TAG, TOOL_CALL_TAG};
use crate::step::{ParsedMessage, Step};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageStatus {
    Streaming,
    Complete,
    Failed(String),
    Aborted,
}

impl MessageStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, MessageStatus::Streaming)
    }
}

/// Which tagged section the buffer is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Text,
    Thinking,
    ToolCall { has_arguments: bool },
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    id: u64,
    role: Role,
    buffer: String,
    parsed: Option<ParsedMessage>,
    rendered: Option<String>,
    status: MessageStatus,
    section: Section,
}

impl ChatMessage {
    pub fn user(id: u64, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            buffer: content.into(),
            parsed: None,
            rendered: None,
            status: MessageStatus::Complete,
            section: Section::Text,
        }
    }

    /// An empty assistant message waiting for stream chunks.
    pub fn streaming_assistant(id: u64) -> Self {
        Self {
            id,
            role: Role::Assistant,
            buffer: String::new(),
            parsed: None,
            rendered: None,
            status: MessageStatus::Streaming,
            section: Section::Text,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.buffer
    }

    pub fn status(&self) -> &MessageStatus {
        &self.status
    }

    pub fn is_streaming(&self) -> bool {
        self.status == MessageStatus::Streaming
    }

    pub fn parsed(&self) -> Option<&ParsedMessage> {
        self.parsed.as_ref()
    }

    pub fn rendered(&self) -> Option<&str> {
        self.rendered.as_deref()
    }

    /// Append plain response text.
    ///
    /// Returns false, leaving the buffer untouched, once the message is final.
    pub fn append(&mut self, delta: &str) -> bool {
        if !self.accepts_input() {
            return false;
        }
        self.enter(Section::Text);
        self.buffer.push_str(delta);
        true
    }

    /// Apply one stream chunk. Returns whether the message changed.
    pub fn apply(&mut self, chunk: &StreamChunk) -> bool {
        if !self.accepts_input() {
            return false;
        }
        match chunk {
            StreamChunk::Start { model } => {
                tracing::debug!(id = self.id, model = %model, "Assistant stream started");
                false
            }
            StreamChunk::Delta { content } => self.append(content),
            StreamChunk::ThinkingDelta { content } => {
                self.enter(Section::Thinking);
                self.buffer.push_str(content);
                true
            }
            StreamChunk::ToolCallStart { id, name } => {
                tracing::trace!(call_id = %id, tool = %name, "Tool call started");
                self.close_section();
                self.buffer.push_str(TOOL_CALL_TAG.open);
                self.buffer.push_str("{\"name\":");
                self.buffer.push_str(&Value::String(name.clone()).to_string());
                self.buffer.push_str(",\"arguments\":");
                self.section = Section::ToolCall {
                    has_arguments: false,
                };
                true
            }
            StreamChunk::ToolCallDelta { arguments } => match self.section {
                Section::ToolCall { .. } if arguments.is_empty() => false,
                Section::ToolCall { .. } => {
                    self.section = Section::ToolCall {
                        has_arguments: true,
                    };
                    self.buffer.push_str(arguments);
                    true
                }
                _ => {
                    tracing::warn!(id = self.id, "Tool call arguments without a tool call");
                    false
                }
            },
            StreamChunk::Done { .. } => {
                self.finish();
                true
            }
            StreamChunk::Error { message } => {
                self.fail(message);
                true
            }
        }
    }

    /// Mark the stream as completed normally.
    pub fn finish(&mut self) {
        if self.accepts_input() {
            self.close_section();
            self.status = MessageStatus::Complete;
        }
    }

    /// End the stream with a transport error, recorded in-band.
    ///
    /// An open section gets only its closing tag, so the marker lands in the
    /// response while partial tool arguments stay exactly as received.
    pub fn fail(&mut self, reason: &str) {
        if self.accepts_input() {
            self.close_tag();
            if !self.buffer.is_empty() {
                self.buffer.push_str("\n\n");
            }
            self.buffer.push_str(&format!("[error: {}]", reason));
            self.status = MessageStatus::Failed(reason.to_string());
        }
    }

    /// Stop the stream at the consumer's request. The buffer keeps exactly
    /// what had arrived; an open tag is left for the parser to treat as
    /// unterminated.
    pub fn abort(&mut self) {
        if self.accepts_input() {
            self.section = Section::Text;
            self.status = MessageStatus::Aborted;
        }
    }

    /// The step still being written. Always `None` once the message is
    /// final, even if the frozen buffer ends mid-step.
    pub fn current_step(&self) -> Option<&Step> {
        if self.status.is_final() {
            return None;
        }
        self.parsed.as_ref().and_then(ParsedMessage::current_step)
    }

    /// Re-parse the buffer and re-render the response with `render`.
    pub fn refresh_with(&mut self, render: impl FnOnce(&str) -> String) {
        let parsed = parse(&self.buffer);
        self.rendered = Some(render(&parsed.response));
        self.parsed = Some(parsed);
    }

    fn accepts_input(&self) -> bool {
        if self.is_streaming() {
            return true;
        }
        tracing::trace!(id = self.id, status = ?self.status, "Ignoring input for finalized message");
        false
    }

    fn enter(&mut self, section: Section) {
        if self.section == section {
            return;
        }
        self.close_section();
        if section == Section::Thinking {
            self.buffer.push_str(THINK_TAG.open);
        }
        self.section = section;
    }

    fn close_tag(&mut self) {
        match self.section {
            Section::Text => {}
            Section::Thinking => self.buffer.push_str(THINK_TAG.close),
            Section::ToolCall { .. } => self.buffer.push_str(TOOL_CALL_TAG.close),
        }
        self.section = Section::Text;
    }

    fn close_section(&mut self) {
        match self.section {
            Section::Text => {}
            Section::Thinking => self.buffer.push_str(THINK_TAG.close),
            Section::ToolCall { has_arguments } => {
                if !has_arguments {
                    self.buffer.push_str("{}");
                }
                self.buffer.push('}');
                self.buffer.push_str(TOOL_CALL_TAG.close);
            }
        }
        self.section = Section::Text;
    }
}

/// Ordered chat history with at most one streaming assistant message.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    system_prompt: Option<String>,
    messages: Vec<ChatMessage>,
    next_id: u64,
}

impl Conversation {
    pub fn new(system_prompt: Option<String>) -> Self {
        Self {
            system_prompt,
            messages: Vec::new(),
            next_id: 0,
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> &ChatMessage {
        let id = self.allocate_id();
        self.messages.push(ChatMessage::user(id, content));
        &self.messages[self.messages.len() - 1]
    }

    /// Start a new assistant message. Fails if one is still streaming.
    pub fn begin_assistant(&mut self) -> Result<&mut ChatMessage, Error> {
        if self.active().is_some() {
            return Err(Error::invalid_request(
                "an assistant response is already streaming",
            ));
        }
        let id = self.allocate_id();
        self.messages.push(ChatMessage::streaming_assistant(id));
        let last = self.messages.len() - 1;
        Ok(&mut self.messages[last])
    }

    pub fn active(&self) -> Option<&ChatMessage> {
        self.messages.last().filter(|m| m.is_streaming())
    }

    pub fn active_mut(&mut self) -> Option<&mut ChatMessage> {
        self.messages.last_mut().filter(|m| m.is_streaming())
    }

    /// Drop all messages. A streaming message is aborted first.
    pub fn clear(&mut self) {
        if let Some(active) = self.active_mut() {
            active.abort();
        }
        self.messages.clear();
    }

    /// Turns to send to a provider: system prompt first, then non-empty
    /// messages in order.
    pub fn history(&self) -> Vec<Message> {
        let mut turns = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = &self.system_prompt {
            turns.push(Message::system(system.as_str()));
        }
        turns.extend(
            self.messages
                .iter()
                .filter(|m| !m.content().is_empty())
                .map(|m| Message {
                    role: m.role(),
                    content: m.content().to_string(),
                }),
        );
        turns
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
