use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use syncup_core::error::{Result, SyncupError};
use syncup_core::traits::LlmClient;

/// Deterministic LLM double.
///
/// Each call first checks the keyword rules (first rule whose keyword occurs
/// in the prompt, case-insensitive), then pops the next queued reply, then
/// falls back to the default reply. Every prompt is recorded.
#[derive(Default)]
pub struct ScriptedLlm {
    rules: Vec<(String, std::result::Result<String, String>)>,
    queue: Mutex<VecDeque<Result<String>>>,
    default: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `reply` whenever the prompt mentions `keyword`.
    pub fn on(mut self, keyword: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((keyword.into().to_lowercase(), Ok(reply.into())));
        self
    }

    /// Fail with a provider error whenever the prompt mentions `keyword`.
    pub fn fail_on(mut self, keyword: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules.push((keyword.into().to_lowercase(), Err(message.into())));
        self
    }

    /// Queue a reply for the next unmatched call.
    pub fn then(self, reply: impl Into<String>) -> Self {
        self.push(Ok(reply.into()));
        self
    }

    /// Queue a provider failure for the next unmatched call.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(Err(SyncupError::Provider(message.into())));
        self
    }

    pub fn with_default(mut self, reply: impl Into<String>) -> Self {
        self.default = Some(reply.into());
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn push(&self, reply: Result<String>) {
        self.queue.lock().unwrap().push_back(reply);
    }

    fn answer(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let lower = prompt.to_lowercase();
        if let Some((_, reply)) = self.rules.iter().find(|(k, _)| lower.contains(k.as_str())) {
            return reply.clone().map_err(SyncupError::Provider);
        }
        if let Some(reply) = self.queue.lock().unwrap().pop_front() {
            return reply;
        }
        match &self.default {
            Some(reply) => Ok(reply.clone()),
            None => Err(SyncupError::Provider("no scripted reply".into())),
        }
    }
}

impl LlmClient for ScriptedLlm {
    fn call<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        let reply = self.answer(prompt);
        Box::pin(async move { reply })
    }
}

/// Always fails with a provider error.
pub struct FailingLlm {
    message: String,
}

impl FailingLlm {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for FailingLlm {
    fn default() -> Self {
        Self::new("provider unavailable")
    }
}

impl LlmClient for FailingLlm {
    fn call<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        let message = self.message.clone();
        Box::pin(async move { Err(SyncupError::Provider(message)) })
    }
}

/// Sleeps before replying. Used to exercise node timeouts.
pub struct SlowLlm {
    delay: Duration,
    reply: String,
}

impl SlowLlm {
    pub fn new(delay: Duration, reply: impl Into<String>) -> Self {
        Self {
            delay,
            reply: reply.into(),
        }
    }
}

impl LlmClient for SlowLlm {
    fn call<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(self.reply.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_before_queue() {
        let llm = ScriptedLlm::new()
            .on("evaluator", r#"{"decision": "approved"}"#)
            .then("first")
            .then("second");

        assert_eq!(llm.call("plain prompt").await.unwrap(), "first");
        assert_eq!(
            llm.call("You are an EVALUATOR").await.unwrap(),
            r#"{"decision": "approved"}"#
        );
        assert_eq!(llm.call("again").await.unwrap(), "second");
        assert!(llm.call("empty").await.is_err());
        assert_eq!(llm.call_count(), 4);
    }

    #[tokio::test]
    async fn test_default_and_failures() {
        let llm = ScriptedLlm::new()
            .fail_on("tech stack", "boom")
            .then_fail("queued boom")
            .with_default("fallback");
        assert!(llm.call("anything").await.is_err());
        assert_eq!(llm.call("anything").await.unwrap(), "fallback");
        assert!(llm.call("recommend a tech stack").await.is_err());
    }

    #[tokio::test]
    async fn test_failing_llm() {
        let err = FailingLlm::default().call("x").await.unwrap_err();
        assert!(matches!(err, SyncupError::Provider(_)));
    }
}
