//! Drives one assistant message from a provider stream to its final render.

use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use qc_core::{ChatMessage, MessageStatus, StreamResult};
use qc_render::{RenderThrottle, Renderer};

/// Applies stream chunks to a message in arrival order, re-rendering at
/// most once per throttle interval and always once at the end.
pub struct StreamDriver {
    renderer: Renderer,
    throttle: RenderThrottle,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

impl StreamDriver {
    pub fn new(renderer: Renderer, interval: Duration) -> Self {
        Self {
            renderer,
            throttle: RenderThrottle::new(interval),
        }
    }

    fn render<F>(&self, message: &mut ChatMessage, on_render: &mut F)
    where
        F: FnMut(&ChatMessage),
    {
        message.refresh_with(|text| self.renderer.render(text));
        tracing::trace!(
            id = message.id(),
            bytes = message.content().len(),
            "Rendered message"
        );
        on_render(message);
    }

    /// Consume `stream` into `message` until it ends, fails, or `cancel`
    /// fires. Returns the message's final status.
    pub async fn drive<F>(
        &mut self,
        message: &mut ChatMessage,
        mut stream: StreamResult,
        cancel: CancellationToken,
        mut on_render: F,
    ) -> MessageStatus
    where
        F: FnMut(&ChatMessage),
    {
        tracing::debug!(
            id = message.id(),
            interval_ms = self.throttle.interval().as_millis() as u64,
            "Stream started"
        );

        while message.is_streaming() {
            let deadline = self.throttle.deadline();
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!(id = message.id(), "Stream cancelled");
                    message.abort();
                }
                _ = wait_until(deadline) => {
                    if self.throttle.poll(Instant::now()) {
                        self.render(message, &mut on_render);
                    }
                }
                next = stream.next() => match next {
                    Some(Ok(chunk)) => {
                        tracing::trace!(id = message.id(), ?chunk, "Stream chunk");
                        let changed = message.apply(&chunk);
                        if changed
                            && message.is_streaming()
                            && self.throttle.on_update(Instant::now())
                        {
                            self.render(message, &mut on_render);
                        }
                    }
                    Some(Err(e)) => {
                        tracing::debug!(id = message.id(), error = %e, "Stream failed");
                        message.fail(&e.to_string());
                    }
                    None => message.finish(),
                },
            }
        }

        self.throttle.finish(Instant::now());
        self.render(message, &mut on_render);
        tracing::debug!(id = message.id(), status = ?message.status(), "Stream ended");
        message.status().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qc_core::testing::MockProvider;
    use qc_core::{parse, CompletionRequest, Error, Message, Provider, StepKind, StreamChunk};

    async fn open(provider: &MockProvider) -> StreamResult {
        provider
            .stream(CompletionRequest::new(vec![Message::user("q")]))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_stream_completes_and_renders() {
        let provider = MockProvider::new();
        provider.queue_stream(vec![
            StreamChunk::Start {
                model: "mock".into(),
            },
            StreamChunk::thinking("check the **spread**"),
            StreamChunk::delta("Spread is "),
            StreamChunk::delta("**2bp**"),
            StreamChunk::Done { usage: None },
        ]);

        let mut driver = StreamDriver::new(Renderer::default(), Duration::from_millis(50));
        let mut message = ChatMessage::streaming_assistant(1);
        let mut renders = 0;
        let status = driver
            .drive(&mut message, open(&provider).await, CancellationToken::new(), |_| {
                renders += 1
            })
            .await;

        assert_eq!(status, MessageStatus::Complete);
        assert!(renders >= 1);
        let parsed = message.parsed().unwrap();
        assert_eq!(parsed.steps[0].kind, StepKind::Thinking);
        assert_eq!(parsed.response, "Spread is **2bp**");
        assert_eq!(
            message.rendered(),
            Some(Renderer::default().render("Spread is **2bp**").as_str())
        );
    }

    #[tokio::test]
    async fn test_abort_after_two_tokens() {
        let provider = MockProvider::new();
        provider.queue_stalled_stream(vec![
            StreamChunk::delta("Hold "),
            StreamChunk::delta("SPY"),
        ]);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut driver = StreamDriver::new(Renderer::default(), Duration::from_millis(10));
        let mut message = ChatMessage::streaming_assistant(1);

        let status = driver
            .drive(&mut message, open(&provider).await, cancel, move |msg| {
                if msg.content() == "Hold SPY" {
                    trigger.cancel();
                }
            })
            .await;

        assert_eq!(status, MessageStatus::Aborted);
        assert_eq!(message.content(), "Hold SPY");
        let expected = parse(message.content());
        assert_eq!(message.parsed(), Some(&expected));
        assert_eq!(
            message.rendered(),
            Some(Renderer::default().render(&expected.response).as_str())
        );
    }

    #[tokio::test]
    async fn test_transport_error_is_in_band() {
        let provider = MockProvider::new();
        provider.queue_failing_stream(
            vec![StreamChunk::delta("Partial answer")],
            Error::stream("connection reset"),
        );

        let mut driver = StreamDriver::new(Renderer::default(), Duration::from_millis(50));
        let mut message = ChatMessage::streaming_assistant(1);
        let status = driver
            .drive(&mut message, open(&provider).await, CancellationToken::new(), |_| {})
            .await;

        assert!(matches!(status, MessageStatus::Failed(_)));
        assert!(message
            .content()
            .ends_with("[error: Stream error: connection reset]"));
        assert!(message.rendered().unwrap().contains("Partial answer"));
    }

    #[tokio::test]
    async fn test_already_cancelled_renders_once() {
        let provider = MockProvider::new();
        provider.queue_stalled_stream(vec![]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut driver = StreamDriver::new(Renderer::default(), Duration::from_millis(50));
        let mut message = ChatMessage::streaming_assistant(1);
        let mut renders = 0;
        let status = driver
            .drive(&mut message, open(&provider).await, cancel, |_| renders += 1)
            .await;

        assert_eq!(status, MessageStatus::Aborted);
        assert_eq!(renders, 1);
        assert_eq!(message.rendered(), Some(""));
    }
}
