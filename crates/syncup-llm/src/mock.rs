use futures::future::BoxFuture;

use syncup_core::error::Result;
use syncup_core::traits::LlmClient;

const ECHO_CHARS: usize = 160;

/// Offline client that echoes the head of the prompt.
///
/// Replies never parse as JSON, so workflow nodes exercise their fallback
/// paths when running against it.
#[derive(Debug, Default, Clone)]
pub struct MockClient;

impl MockClient {
    pub fn new() -> Self {
        Self
    }

    pub fn reply(prompt: &str) -> String {
        let head: String = prompt.chars().take(ECHO_CHARS).collect();
        format!("[mock-llm] {}...", head)
    }
}

impl LlmClient for MockClient {
    fn call<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(Self::reply(prompt)) })
    }
}
