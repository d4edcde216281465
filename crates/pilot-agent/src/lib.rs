//! # pilot-agent
//!
//! The reasoning oracle consulted by Pilot for planning and completion judgement.
//!
//! The oracle is a plain `complete(prompt) -> text` call. Every call is
//! stateless: no conversation history is sent, everything the oracle needs is
//! in the prompt built for that step.
//!
//! - [`OracleClient`] talks to any OpenAI-compatible chat completions endpoint
//! - [`ScriptedOracle`] replays queued answers for tests
//! - [`Verdict`] interprets a yes/no completion answer

use async_trait::async_trait;
use pilot_core::Result;
use std::sync::Arc;

mod auth;
mod client;
mod mock;
mod types;
mod verdict;

pub use auth::OracleCredentials;
pub use client::OracleClient;
pub use mock::ScriptedOracle;
pub use types::*;
pub use verdict::Verdict;

/// External text-completion service
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send one prompt and return the raw text answer
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: Oracle + ?Sized> Oracle for Arc<T> {
    async fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt).await
    }
}
