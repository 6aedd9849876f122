use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

const USER_AGENT_ENV: &str = "HTTP_USER_AGENT";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; stockpick/0.1)";

fn user_agent() -> String {
    env::var(USER_AGENT_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
}

/// Shared async client for the price provider and the alert channels.
pub fn build_async_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(user_agent());
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context("failed to build HTTP client")
}
