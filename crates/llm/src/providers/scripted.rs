//! Deterministic in-process provider for tests and offline runs.
//!
//! Each model gets a queue of scripted outcomes; calls are recorded so
//! tests can assert exactly which models were attempted and with what
//! prompt.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use crate::error::LlmError;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

type Outcome = Result<String, LlmError>;

/// Scripted provider.
///
/// Outcomes queued for a model are consumed in order; once a model's
/// queue is empty the fallback outcome (if any) repeats forever.
/// Unscripted models answer `ModelNotFound`.
#[derive(Debug)]
pub struct ScriptedClient {
    configured: bool,
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    fallback: Option<Outcome>,
    calls: Mutex<Vec<LlmRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedClient {
    /// A configured client with no scripts.
    pub fn new() -> Self {
        Self {
            configured: true,
            scripts: Mutex::new(HashMap::new()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A client that reports itself as unconfigured (no credential).
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    /// Queue a successful answer for `model`.
    pub fn respond(self, model: &str, text: impl Into<String>) -> Self {
        self.push(model, Ok(text.into()))
    }

    /// Queue a failure for `model`.
    pub fn fail(self, model: &str, error: LlmError) -> Self {
        self.push(model, Err(error))
    }

    /// Answer every model with `text` once its queue is exhausted.
    pub fn respond_always(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(Ok(text.into()));
        self
    }

    /// Fail every model with `error` once its queue is exhausted.
    pub fn fail_always(mut self, error: LlmError) -> Self {
        self.fallback = Some(Err(error));
        self
    }

    fn push(self, model: &str, outcome: Outcome) -> Self {
        lock(&self.scripts)
            .entry(model.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Requests received so far, in order.
    pub fn calls(&self) -> Vec<LlmRequest> {
        lock(&self.calls).clone()
    }

    /// Models attempted so far, in order.
    pub fn attempted_models(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|r| r.model.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        lock(&self.calls).push(request.clone());

        let scripted = lock(&self.scripts)
            .get_mut(&request.model)
            .and_then(|queue| queue.pop_front());

        let outcome = scripted.or_else(|| self.fallback.clone()).unwrap_or_else(|| {
            Err(LlmError::ModelNotFound {
                model: request.model.clone(),
                message: "no script for model".to_string(),
            })
        });

        outcome.map(|content| LlmResponse {
            usage: LlmUsage::new(request.prompt.len() as u32 / 4, content.len() as u32 / 4),
            content,
            model: request.model.clone(),
        })
    }
}
