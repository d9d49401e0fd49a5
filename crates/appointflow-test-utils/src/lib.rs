//! Fixtures shared by integration tests across the workspace.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use appointflow_agent::graph::{build_graph, GraphExecutor, ReviewMode};
use appointflow_agent::steps::{ReviewDecision, Reviewer, Step};
use appointflow_agent::StepId;
use appointflow_core::config::{AppConfig, EngineConfig, RetryConfig};
use appointflow_core::error::{AppointflowError, Result};
use appointflow_core::types::{RunContext, MODEL_PROVIDER_KEY};

/// A fresh context with the default model provider recorded.
pub fn context_for(input: &str) -> RunContext {
    let mut ctx = RunContext::new(input);
    ctx.set_meta_str(MODEL_PROVIDER_KEY, "rules");
    ctx
}

/// A fresh context carrying intake ids, as the gateway builds it.
pub fn context_with_ids(input: &str, appointment_id: &str, insurance_id: &str) -> RunContext {
    let mut ctx = RunContext::with_intake(input, appointment_id, insurance_id);
    ctx.set_meta_str(MODEL_PROVIDER_KEY, "rules");
    ctx
}

/// Engine settings with no retry back-off, so failing steps don't slow tests.
pub fn fast_engine_config() -> EngineConfig {
    EngineConfig {
        retry: RetryConfig {
            max_retries: 1,
            backoff_ms: 0,
        },
        ..EngineConfig::default()
    }
}

/// Full app config using [`fast_engine_config`].
pub fn fast_app_config() -> AppConfig {
    AppConfig {
        engine: fast_engine_config(),
        ..AppConfig::default()
    }
}

/// Pause-mode executor over the standard graph.
pub fn pause_executor() -> GraphExecutor {
    let graph = build_graph(ReviewMode::Pause, &fast_engine_config())
        .expect("standard graph builds");
    GraphExecutor::new(Arc::new(graph))
}

/// Blocking-mode executor whose reviewer answers from a script.
pub fn blocking_executor(reviewer: Arc<ScriptedReviewer>) -> GraphExecutor {
    let graph = build_graph(ReviewMode::Blocking(reviewer), &fast_engine_config())
        .expect("standard graph builds");
    GraphExecutor::new(Arc::new(graph))
}

/// Fails its first `failures` calls, then delegates to `inner`.
pub struct FailingStep {
    id: StepId,
    failures: u32,
    inner: fn(RunContext) -> Result<RunContext>,
    calls: AtomicU32,
}

impl FailingStep {
    pub fn new(id: StepId, failures: u32, inner: fn(RunContext) -> Result<RunContext>) -> Self {
        Self {
            id,
            failures,
            inner,
            calls: AtomicU32::new(0),
        }
    }

    /// Fails on every call.
    pub fn always(id: StepId) -> Self {
        Self::new(id, u32::MAX, Ok)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Step for FailingStep {
    fn id(&self) -> StepId {
        self.id
    }

    fn run(&self, mut ctx: RunContext) -> Result<RunContext> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            // Mutate before failing so tests can see the attempt was discarded.
            ctx.trace(format!("{}_partial", self.id));
            return Err(AppointflowError::StepFailed {
                step: self.id.to_string(),
                message: format!("scripted failure {}", n + 1),
            });
        }
        (self.inner)(ctx)
    }
}

/// Reviewer that replays a fixed list of decisions, then approves.
#[derive(Default)]
pub struct ScriptedReviewer {
    script: Mutex<VecDeque<ReviewDecision>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedReviewer {
    pub fn new(decisions: impl IntoIterator<Item = ReviewDecision>) -> Self {
        Self {
            script: Mutex::new(decisions.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Drafts shown to this reviewer so far.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Reviewer for ScriptedReviewer {
    fn review(&self, _ctx: &RunContext, draft: &str) -> Result<ReviewDecision> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(draft.to_string());
        }
        let next = self
            .script
            .lock()
            .map_err(|e| AppointflowError::Review(e.to_string()))?
            .pop_front();
        Ok(next.unwrap_or(ReviewDecision::Approve))
    }
}

/// Write `content` to `appointflow.toml` in a new temp dir.
/// Keep the returned dir alive for as long as the file is needed.
pub fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("appointflow.toml");
    std::fs::write(&path, content).expect("write config");
    (dir, path)
}

/// Parse TOML into an [`AppConfig`] without touching the filesystem.
pub fn parse_config(content: &str) -> AppConfig {
    toml::from_str(content).expect("valid config toml")
}

/// Parse a JSON body.
pub fn json(bytes: &[u8]) -> serde_json::Value {
    serde_json::from_slice(bytes).expect("valid JSON body")
}
