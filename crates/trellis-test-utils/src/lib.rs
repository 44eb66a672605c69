//! Scripted backends, counting tools, and fixtures shared by the test suites.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::{ReasoningBackend, Tool};
use trellis_core::types::*;

enum Scripted {
    Respond(BackendResponse),
    Fail(String),
    Hang,
}

/// Reasoning backend that replays queued responses in order and records
/// every request it receives.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<BackendRequest>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, item: Scripted) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
        self
    }

    /// Queue a response.
    pub fn respond(&self, response: BackendResponse) -> &Self {
        self.push(Scripted::Respond(response))
    }

    /// Queue a plain text answer.
    pub fn text(&self, content: &str) -> &Self {
        self.respond(BackendResponse::text(content))
    }

    /// Queue a single tool call with a fixed id.
    pub fn call(&self, id: &str, name: &str, args: serde_json::Value) -> &Self {
        self.respond(BackendResponse::calls(vec![
            ToolCall::new(name, args).with_id(id)
        ]))
    }

    /// Queue a backend failure.
    pub fn fail(&self, message: &str) -> &Self {
        self.push(Scripted::Fail(message.to_string()))
    }

    /// Queue a call that never completes.
    pub fn hang(&self) -> &Self {
        self.push(Scripted::Hang)
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Responses still queued.
    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or_default()
    }
}

impl ReasoningBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, request: BackendRequest) -> BoxFuture<'_, Result<BackendResponse>> {
        Box::pin(async move {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }
            let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
            match next {
                Some(Scripted::Respond(response)) => Ok(response),
                Some(Scripted::Fail(message)) => Err(TrellisError::Backend(message)),
                Some(Scripted::Hang) => futures::future::pending().await,
                None => Err(TrellisError::Backend("script exhausted".to_string())),
            }
        })
    }
}

/// Tool that returns a fixed reply and counts invocations.
pub struct CountingTool {
    name: String,
    reply: String,
    calls: Arc<AtomicUsize>,
    inputs: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl CountingTool {
    pub fn new(name: &str, reply: &str) -> Self {
        Self {
            name: name.to_string(),
            reply: reply.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared invocation counter; stays valid after the tool is registered.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Shared record of received inputs.
    pub fn inputs(&self) -> Arc<Mutex<Vec<serde_json::Value>>> {
        self.inputs.clone()
    }
}

impl Tool for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Counts invocations and returns a fixed reply."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut inputs) = self.inputs.lock() {
                inputs.push(input);
            }
            Ok(ToolResult::success(self.reply.clone()))
        })
    }
}

/// Tool whose every execution fails.
pub struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move { Err(TrellisError::tool_execution(&self.name, "connection refused")) })
    }
}

/// Tool that sleeps before replying, for timeout tests.
pub struct SlowTool {
    name: String,
    timeout_secs: u64,
    delay: Duration,
}

impl SlowTool {
    pub fn new(name: &str, timeout_secs: u64, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            timeout_secs,
            delay,
        }
    }
}

impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Sleeps, then replies."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(ToolResult::success("done"))
        })
    }
}

/// A fresh SQLite path inside a temp directory that lives as long as the guard.
pub fn temp_sqlite_path() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::Builder::new()
        .prefix("trellis_test_")
        .tempdir()
        .expect("failed to create temp dir");
    let path = dir.path().join("checkpoints.db");
    (dir, path)
}
