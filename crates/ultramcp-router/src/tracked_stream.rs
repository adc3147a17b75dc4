//! Stream wrapper that closes the tracking record on every exit path

use chrono::Utc;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::warn;
use ultramcp_core::provider::EventStream;
use ultramcp_core::types::{FinishReason, StreamEvent, Usage};
use ultramcp_tracking::{CompletionOutcome, TrackedCall};

/// Wraps an adapter's event stream and a [`TrackedCall`] guard.
///
/// Deltas are accumulated into the response text and the usage chunk is
/// captured as it passes through. When the upstream closes cleanly the
/// record completes `success` (even with zero content chunks); a stream
/// error fails it; dropping the consumer mid-stream leaves the guard to
/// mark the record canceled.
pub struct TrackedStream {
    inner: EventStream,
    guard: Option<TrackedCall>,
    text: String,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
}

impl TrackedStream {
    pub fn new(inner: EventStream, guard: TrackedCall) -> Self {
        Self {
            inner,
            guard: Some(guard),
            text: String::new(),
            usage: None,
            finish_reason: None,
        }
    }

    fn close_success(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let outcome = CompletionOutcome {
            response_text: std::mem::take(&mut self.text),
            usage: self.usage,
            finish_reason: self.finish_reason,
            ended_at: Utc::now(),
        };
        // Terminal updates are async; Drop and poll contexts cannot await
        tokio::spawn(async move {
            if let Err(e) = guard.complete(outcome).await {
                warn!("Failed to complete tracking record for stream: {e}");
            }
        });
    }

    fn close_error(&mut self, message: String) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = guard.fail(&message).await {
                warn!("Failed to fail tracking record for stream: {e}");
            }
        });
    }
}

impl Stream for TrackedStream {
    type Item = ultramcp_core::Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => {
                match &event {
                    StreamEvent::Delta { content } => this.text.push_str(content),
                    StreamEvent::Usage { usage } => this.usage = Some(*usage),
                    StreamEvent::End { finish_reason } => {
                        this.finish_reason = Some(*finish_reason)
                    }
                }
                Poll::Ready(Some(Ok(event)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.close_error(e.to_string());
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.close_success();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
