//! Scripted oracle for tests

use crate::Oracle;
use async_trait::async_trait;
use pilot_core::{PilotError, Result};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Oracle that replays queued answers and records every prompt it receives
///
/// When the queue is empty the fallback answer is returned, or an
/// `Oracle` error if no fallback was set.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue answers in order
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let oracle = Self::new();
        for response in responses {
            oracle.push_response(response);
        }
        oracle
    }

    /// Answer returned once the queue runs dry
    pub fn with_fallback(mut self, answer: impl Into<String>) -> Self {
        self.fallback = Some(answer.into());
        self
    }

    pub fn push_response(&self, response: impl Into<String>) {
        lock(&self.responses).push_back(Ok(response.into()));
    }

    pub fn push_error(&self, error: PilotError) {
        lock(&self.responses).push_back(Err(error));
    }

    /// Prompts received so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, prompt: &str) -> Result<String> {
        lock(&self.prompts).push(prompt.to_string());

        let next = lock(&self.responses).pop_front();
        match next {
            Some(response) => response,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| PilotError::Oracle("No scripted response left".to_string())),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
