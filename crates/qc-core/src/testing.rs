//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Mutex;

use crate::error::Error;
use crate::message::{Message, StreamChunk, Usage};
use crate::provider::{CompletionRequest, CompletionResponse, Provider, StreamResult};

/// A scripted stream: its chunks, and whether it stays open afterwards.
struct ScriptedStream {
    chunks: Vec<Result<StreamChunk, Error>>,
    stall: bool,
}

/// A mock provider that returns pre-configured responses and streams.
pub struct MockProvider {
    responses: Mutex<Vec<CompletionResponse>>,
    streams: Mutex<Vec<ScriptedStream>>,
    /// Captured requests (for assertion).
    pub captured_requests: Mutex<Vec<CompletionRequest>>,
    pub name: String,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            captured_requests: Mutex::new(Vec::new()),
            name: "mock".to_string(),
        }
    }

    /// Queue a response to be returned by the next complete() call.
    /// Responses are returned in FIFO order (first queued = first returned).
    pub fn queue_response(&self, content: &str) {
        let response = CompletionResponse {
            message: Message::assistant(content),
            usage: Usage::new(0, 0),
            model: "mock-model".to_string(),
        };
        self.responses.lock().unwrap().insert(0, response);
    }

    /// Queue chunks for the next stream() call. The stream ends after them.
    pub fn queue_stream(&self, chunks: Vec<StreamChunk>) {
        self.push_stream(chunks.into_iter().map(Ok).collect(), false);
    }

    /// Queue chunks followed by a transport error.
    pub fn queue_failing_stream(&self, chunks: Vec<StreamChunk>, error: Error) {
        let mut items: Vec<_> = chunks.into_iter().map(Ok).collect();
        items.push(Err(error));
        self.push_stream(items, false);
    }

    /// Queue chunks after which the stream never yields again. Used to
    /// exercise cancellation.
    pub fn queue_stalled_stream(&self, chunks: Vec<StreamChunk>) {
        self.push_stream(chunks.into_iter().map(Ok).collect(), true);
    }

    fn push_stream(&self, chunks: Vec<Result<StreamChunk, Error>>, stall: bool) {
        self.streams
            .lock()
            .unwrap()
            .insert(0, ScriptedStream { chunks, stall });
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    /// Get the last captured request.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        self.captured_requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop() {
            Some(response) => Ok(response),
            None => Err(Error::Unknown("No mock response queued".to_string())),
        }
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamResult, Error> {
        self.captured_requests.lock().unwrap().push(request);
        let Some(script) = self.streams.lock().unwrap().pop() else {
            return Err(Error::Unknown("No mock stream queued".to_string()));
        };
        let chunks = stream::iter(script.chunks);
        if script.stall {
            Ok(Box::pin(chunks.chain(stream::pending())))
        } else {
            Ok(Box::pin(chunks))
        }
    }
}
