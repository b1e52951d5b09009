//! Server-sent events relay.
//!
//! [`SseRelay`] pulls chunks from a [`ChunkStream`] and writes one
//! `data: <json>\n\n` record per chunk to an [`SseSink`], in arrival order and
//! without buffering more than the chunk in hand. The terminal record
//! (`data: [DONE]` or an error record) is written by [`SseRelay::finish`], so
//! the caller can settle the credit reservation between the two.

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use futures::StreamExt;
use gateway_core::{estimate_tokens, ChunkStream, CompletionChunk, GatewayError};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Terminal record of a successful stream
pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// The client went away; nothing more can be written
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("SSE sink closed")]
pub struct SinkClosed;

/// Byte-oriented, write-only destination of SSE records
#[async_trait]
pub trait SseSink: Send {
    /// Write one complete record
    async fn send(&mut self, frame: Bytes) -> Result<(), SinkClosed>;
}

#[async_trait]
impl<S: SseSink + ?Sized> SseSink for &mut S {
    async fn send(&mut self, frame: Bytes) -> Result<(), SinkClosed> {
        (**self).send(frame).await
    }
}

/// Sink backed by a single-slot channel feeding a response body.
///
/// A send waits until the previous record has been taken by the HTTP layer,
/// and fails once the response body has been dropped.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    /// Create a sink and the response body it feeds
    #[must_use]
    pub fn channel() -> (Self, Body) {
        let (tx, rx) = mpsc::channel::<Bytes>(1);
        let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
        (Self { tx }, Body::from_stream(stream))
    }
}

#[async_trait]
impl SseSink for ChannelSink {
    async fn send(&mut self, frame: Bytes) -> Result<(), SinkClosed> {
        self.tx.send(frame).await.map_err(|_| SinkClosed)
    }
}

/// How a relayed stream ended
#[derive(Debug, Clone)]
pub enum RelayEnd {
    /// The upstream sequence was exhausted
    Completed,
    /// The upstream sequence raised
    UpstreamFailed(GatewayError),
    /// Writing to the sink failed
    ClientDisconnected,
}

/// Result of relaying one stream
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    /// Data records written
    pub chunks_sent: u64,
    /// Tokens consumed: last reported `usage.total_tokens`, else an estimate
    pub total_tokens: u64,
    /// How the stream ended
    pub end: RelayEnd,
}

impl RelayOutcome {
    /// Whether the stream ran to completion
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.end, RelayEnd::Completed)
    }

    /// Label used in logs and metrics
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self.end {
            RelayEnd::Completed => "completed",
            RelayEnd::UpstreamFailed(_) => "upstream_failed",
            RelayEnd::ClientDisconnected => "client_disconnected",
        }
    }
}

/// Relays one chunk stream into one sink
#[derive(Debug)]
pub struct SseRelay<S> {
    sink: S,
}

impl<S: SseSink> SseRelay<S> {
    /// Wrap a sink
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Forward data records until the stream ends, fails, or the sink closes.
    ///
    /// The stream is dropped before returning, which cancels the upstream
    /// exchange if it is still running.
    pub async fn forward(&mut self, mut stream: ChunkStream) -> RelayOutcome {
        let mut chunks_sent = 0;
        let mut reported_tokens = None;
        let mut content_chars: u64 = 0;

        let end = loop {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    if let Some(usage) = &chunk.usage {
                        reported_tokens = Some(usage.total_tokens);
                    }
                    content_chars += chunk.delta_content().chars().count() as u64;

                    let frame = match data_frame(&chunk) {
                        Ok(frame) => frame,
                        Err(e) => break RelayEnd::UpstreamFailed(e),
                    };
                    if self.sink.send(frame).await.is_err() {
                        debug!(chunks_sent, "Client disconnected during stream");
                        break RelayEnd::ClientDisconnected;
                    }
                    chunks_sent += 1;
                }
                Some(Err(e)) => {
                    warn!(chunks_sent, error = %e, "Upstream stream failed");
                    break RelayEnd::UpstreamFailed(e);
                }
                None => break RelayEnd::Completed,
            }
        };
        drop(stream);

        RelayOutcome {
            chunks_sent,
            total_tokens: reported_tokens.unwrap_or_else(|| estimate_tokens(content_chars)),
            end,
        }
    }

    /// Write the terminal record for `outcome` and close the sink
    pub async fn finish(mut self, outcome: &RelayOutcome) {
        let frame = match &outcome.end {
            RelayEnd::Completed => Bytes::from_static(DONE_FRAME),
            RelayEnd::UpstreamFailed(e) => error_frame(e),
            RelayEnd::ClientDisconnected => return,
        };
        if self.sink.send(frame).await.is_err() {
            debug!("Client disconnected before the terminal record");
        }
    }
}

/// Relay `stream` into `sink`, write the terminal record and close the sink
pub async fn relay<S: SseSink>(stream: ChunkStream, sink: S) -> RelayOutcome {
    let mut relay = SseRelay::new(sink);
    let outcome = relay.forward(stream).await;
    relay.finish(&outcome).await;
    outcome
}

/// Encode a chunk as one SSE data record
pub fn data_frame(chunk: &CompletionChunk) -> Result<Bytes, GatewayError> {
    let json = serde_json::to_string(chunk)
        .map_err(|e| GatewayError::internal(format!("failed to encode chunk: {e}")))?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

/// Encode an error as the error-terminal SSE record
#[must_use]
pub fn error_frame(err: &GatewayError) -> Bytes {
    let body = ApiError::from(err.clone()).body();
    Bytes::from(format!("data: {body}\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::{FinishReason, TimeoutStage, Usage};
    use std::time::Duration;

    #[derive(Default)]
    struct VecSink {
        frames: Vec<String>,
        accept: Option<usize>,
    }

    #[async_trait]
    impl SseSink for VecSink {
        async fn send(&mut self, frame: Bytes) -> Result<(), SinkClosed> {
            if self.accept.is_some_and(|n| self.frames.len() >= n) {
                return Err(SinkClosed);
            }
            self.frames.push(String::from_utf8_lossy(&frame).into_owned());
            Ok(())
        }
    }

    fn chunk(content: &str) -> CompletionChunk {
        CompletionChunk::text("chatcmpl-1", "gpt-x", content)
    }

    fn stream_of(items: Vec<Result<CompletionChunk, GatewayError>>) -> ChunkStream {
        futures::stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_relays_in_order_then_done() {
        let last = chunk("c")
            .with_finish_reason(FinishReason::Stop)
            .with_usage(Usage::new(5, 7));
        let stream = stream_of(vec![Ok(chunk("a")), Ok(chunk("b")), Ok(last)]);

        let mut sink = VecSink::default();
        let outcome = relay(stream, &mut sink).await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.chunks_sent, 3);
        assert_eq!(outcome.total_tokens, 12);

        let frames = sink.frames;
        assert_eq!(frames.len(), 4);
        assert!(frames[0].starts_with("data: {") && frames[0].ends_with("\n\n"));
        assert!(frames[0].contains("\"content\":\"a\""));
        assert!(frames[1].contains("\"content\":\"b\""));
        assert_eq!(frames[3], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_upstream_failure_writes_error_record_without_done() {
        let err = GatewayError::upstream("deepseek", "connection reset", None, true);
        let stream = stream_of(vec![Ok(chunk("ab")), Ok(chunk("cd")), Err(err)]);

        let mut sink = VecSink::default();
        let outcome = relay(stream, &mut sink).await;

        assert!(matches!(outcome.end, RelayEnd::UpstreamFailed(_)));
        assert_eq!(outcome.chunks_sent, 2);
        assert_eq!(sink.frames.len(), 3);
        assert!(sink.frames[2].contains("\"error\""));
        assert!(sink.frames[2].contains("upstream_unavailable"));
        assert!(sink.frames.iter().all(|f| !f.contains("[DONE]")));
    }

    #[tokio::test]
    async fn test_estimates_tokens_without_usage() {
        let stream = stream_of(vec![Ok(chunk("12345678")), Ok(chunk("9"))]);
        let outcome = relay(stream, VecSink::default()).await;
        assert_eq!(outcome.total_tokens, 3);
    }

    #[tokio::test]
    async fn test_client_disconnect_stops_draining() {
        let pulled = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = std::sync::Arc::clone(&pulled);
        let stream = futures::stream::iter(0..5)
            .map(move |i| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(chunk(&format!("chunk-{i}")))
            })
            .boxed();

        let sink = VecSink {
            accept: Some(2),
            ..VecSink::default()
        };
        let outcome = relay(stream, sink).await;

        assert!(matches!(outcome.end, RelayEnd::ClientDisconnected));
        assert_eq!(outcome.chunks_sent, 2);
        assert_eq!(pulled.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_idle_timeout_error_frame() {
        let err = GatewayError::upstream_timeout("groq", TimeoutStage::Idle, Duration::from_secs(60));
        let frame = error_frame(&err);
        let text = String::from_utf8_lossy(&frame);
        assert!(text.starts_with("data: "));
        assert!(text.contains("\"status\":504"));
        assert!(text.contains("upstream_timeout"));
    }

    #[tokio::test]
    async fn test_channel_sink_reports_dropped_body() {
        let (mut sink, body) = ChannelSink::channel();
        drop(body);
        assert!(sink.send(Bytes::from_static(b"data: x\n\n")).await.is_err());
    }
}
