//! A provider that replays a recorded response as a token stream.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::time::Duration;

use qc_core::{
    CompletionRequest, CompletionResponse, Error, Message, Provider, StreamChunk, StreamResult,
    Usage,
};

const MODEL: &str = "replay";

/// Streams fixed text in `chunk_size`-character deltas, `delay` apart.
pub struct ReplayProvider {
    text: String,
    chunk_size: usize,
    delay: Duration,
}

impl ReplayProvider {
    pub fn new(text: impl Into<String>, chunk_size: usize, delay: Duration) -> Self {
        Self {
            text: text.into(),
            chunk_size: chunk_size.max(1),
            delay,
        }
    }

    fn deltas(&self) -> Vec<String> {
        let chars: Vec<char> = self.text.chars().collect();
        chars
            .chunks(self.chunk_size)
            .map(|chunk| chunk.iter().collect())
            .collect()
    }
}

#[async_trait]
impl Provider for ReplayProvider {
    fn name(&self) -> &str {
        MODEL
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, Error> {
        Ok(CompletionResponse {
            message: Message::assistant(self.text.as_str()),
            usage: Usage::default(),
            model: MODEL.to_string(),
        })
    }

    async fn stream(&self, _request: CompletionRequest) -> Result<StreamResult, Error> {
        let mut chunks = vec![StreamChunk::Start {
            model: MODEL.to_string(),
        }];
        chunks.extend(self.deltas().into_iter().map(StreamChunk::delta));
        chunks.push(StreamChunk::Done { usage: None });

        let delay = self.delay;
        let paced = stream::iter(chunks).then(move |chunk| async move {
            if !delay.is_zero() && matches!(chunk, StreamChunk::Delta { .. }) {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, Error>(chunk)
        });
        Ok(Box::pin(paced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deltas_split_on_chars() {
        let provider = ReplayProvider::new("Thought: 买入 AAPL", 3, Duration::ZERO);
        let deltas = provider.deltas();
        assert_eq!(deltas.concat(), "Thought: 买入 AAPL");
        assert!(deltas.iter().all(|d| d.chars().count() <= 3));
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let provider = ReplayProvider::new("ab", 0, Duration::ZERO);
        assert_eq!(provider.deltas(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_stream_frames_deltas() {
        let provider = ReplayProvider::new("hello", 2, Duration::ZERO);
        let chunks: Vec<StreamChunk> = provider
            .stream(CompletionRequest::new(vec![]))
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert!(matches!(chunks.first(), Some(StreamChunk::Start { .. })));
        assert_eq!(chunks[1], StreamChunk::delta("he"));
        assert_eq!(chunks[3], StreamChunk::delta("o"));
        assert!(chunks.last().unwrap().is_terminal());
    }
}
