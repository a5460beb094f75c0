//! Language-model transport.
//!
//! Every engine and capability reaches a model through [`LlmTransport`], so
//! runs can be driven by the HTTP [`LlmClient`] in production and by fakes in
//! tests.

mod client;
mod types;


pub use client::LlmClient;
pub use types::*;

use async_trait::async_trait;

use crate::error::LlmResult;

/// A blocking-per-call chat transport: one system/user prompt pair in, raw text out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmTransport: Send + Sync {
    /// Run one chat call and return the assistant text.
    async fn chat(&self, request: &ChatRequest) -> LlmResult<String>;
}
