//! qc-core: Core types for quantchat
//!
//! Message and stream types, the provider seam, and the streaming parser
//! that turns a raw assistant buffer into reasoning steps plus a response.

pub mod conversation;
pub mod error;
pub mod grammar;
pub mod message;
pub mod parse;
pub mod provider;
pub mod segment;
pub mod step;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use conversation::{ChatMessage, Conversation, MessageStatus};
pub use error::Error;
pub use grammar::{detect, Grammar, MarkerRole, LINE_GRAMMARS, PLANNING, REACT};
pub use message::{Message, Role, StreamChunk, Usage};
pub use parse::{parse, strip_result_artifact, Parser};
pub use provider::{CompletionRequest, CompletionResponse, Provider, StreamResult};
pub use segment::{segment, Segment, TagPair, DEFAULT_TAGS, THINK_TAG, TOOL_CALL_TAG};
pub use step::{ParsedMessage, Step, StepKind};
pub use tool::ToolDefinition;

pub type Result<T> = std::result::Result<T, Error>;
