//! Time budgets for upstream exchanges.

use futures::StreamExt;
use gateway_core::{ChunkStream, GatewayError, TimeoutStage};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `fut` under a time budget.
///
/// Exceeding the budget yields [`GatewayError::UpstreamTimeout`] for `stage`
/// and drops `fut`, cancelling whatever it was waiting on.
pub async fn with_deadline<T, F>(
    provider: &str,
    stage: TimeoutStage,
    budget: Duration,
    fut: F,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(provider = %provider, stage = %stage, budget_ms = budget.as_millis() as u64, "Upstream timed out");
            Err(GatewayError::upstream_timeout(provider, stage, budget))
        }
    }
}

/// Bound the silence between consecutive chunks of `stream`.
///
/// When no chunk arrives within `idle`, the adapter yields one
/// [`TimeoutStage::Idle`] error and ends; the inner stream is dropped at that
/// point. An error from the inner stream also ends the adapter.
pub fn idle_timeout(stream: ChunkStream, provider: impl Into<String>, idle: Duration) -> ChunkStream {
    let provider = provider.into();
    futures::stream::unfold(Some(stream), move |state| {
        let provider = provider.clone();
        async move {
            let mut inner = state?;
            match tokio::time::timeout(idle, inner.next()).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(inner))),
                Ok(Some(Err(e))) => Some((Err(e), None)),
                Ok(None) => None,
                Err(_) => {
                    warn!(provider = %provider, idle_ms = idle.as_millis() as u64, "Upstream stream went idle");
                    Some((
                        Err(GatewayError::upstream_timeout(provider, TimeoutStage::Idle, idle)),
                        None,
                    ))
                }
            }
        }
    })
    .boxed()
}
