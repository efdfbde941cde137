//! Deterministic provider that replays a queue of replies

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::error::{LlmError, LlmResult};
use super::provider::LlmProvider;

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(LlmError),
    /// Wait before answering with the inner reply
    Stall(Duration, Box<Reply>),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Reply::Fail(LlmError::Other {
            message: message.into(),
        })
    }

    pub fn stall(delay: Duration) -> Self {
        Reply::Stall(delay, Box::new(Reply::text("")))
    }
}

#[derive(Debug, Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<Reply>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reply used once the queue runs dry
    pub fn with_fallback(mut self, reply: Reply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Every prompt received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or_default()
    }

    fn next_reply(&self) -> LlmResult<Reply> {
        let mut replies = self.replies.lock().map_err(|_| LlmError::Other {
            message: "scripted provider lock poisoned".to_string(),
        })?;
        replies
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| LlmError::Other {
                message: "scripted provider has no replies left".to_string(),
            })
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let mut reply = self.next_reply()?;
        loop {
            match reply {
                Reply::Text(text) => return Ok(text),
                Reply::Fail(err) => return Err(err),
                Reply::Stall(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_and_records_prompts() {
        let provider = ScriptedProvider::new(vec![Reply::text("chart"), Reply::fail("down")]);
        assert_eq!(provider.complete("first").await.unwrap(), "chart");
        assert!(provider.complete("second").await.is_err());
        assert_eq!(provider.prompts(), vec!["first", "second"]);
        assert!(provider.complete("third").await.is_err());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_fallback_after_queue() {
        let provider = ScriptedProvider::new(vec![]).with_fallback(Reply::text("valid"));
        assert_eq!(provider.complete("a").await.unwrap(), "valid");
        assert_eq!(provider.complete("b").await.unwrap(), "valid");
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn test_stall_then_answer() {
        let provider = ScriptedProvider::new(vec![Reply::Stall(
            Duration::from_millis(20),
            Box::new(Reply::text("late")),
        )]);
        assert_eq!(provider.complete("x").await.unwrap(), "late");
    }
}
