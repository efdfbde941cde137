//! Provider port used by every workflow stage

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::error::{LlmError, LlmResult};

/// A chat model that turns one prompt into one text reply
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider identifier used in logs
    fn name(&self) -> &str;

    /// Model identifier passed to the backend
    fn model(&self) -> &str;

    /// Send a single-turn prompt and return the reply text
    async fn complete(&self, prompt: &str) -> LlmResult<String>;
}

/// Call `provider` for `stage`, bounded by `limit`
pub async fn complete_within(
    provider: &dyn LlmProvider,
    stage: &str,
    prompt: &str,
    limit: Duration,
) -> LlmResult<String> {
    let started = Instant::now();
    let result = match tokio::time::timeout(limit, provider.complete(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout {
            secs: limit.as_secs(),
        }),
    };
    let latency_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(reply) => debug!(
            stage,
            provider = provider.name(),
            model = provider.model(),
            prompt_len = prompt.len(),
            reply_len = reply.len(),
            latency_ms,
            "Provider call completed"
        ),
        Err(e) => warn!(
            stage,
            provider = provider.name(),
            prompt_len = prompt.len(),
            latency_ms,
            error = %e,
            "Provider call failed"
        ),
    }
    result
}
