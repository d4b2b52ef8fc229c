//! Debug report collection.
//!
//! A [`TraceCollector`] is created per traced invocation and handed down the
//! call path explicitly. Records are appended when a call starts, so the
//! sequences reflect call order even when batch entries finish out of order.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::llm::{Completion, Usage};

/// Structured trace of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugReport {
    pub chain_call_count: usize,
    pub llm_call_count: usize,
    pub chains: Vec<ChainRun>,
    pub llms: Vec<LlmRun>,
}

/// One chain-level call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRun {
    pub run_id: String,
    pub name: String,
    pub inputs: BTreeMap<String, String>,
    pub outputs: Option<BTreeMap<String, String>>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<u64>,
}

/// One model-level call. Retries of the same call are folded into
/// `attempts` rather than recorded as separate runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRun {
    pub run_id: String,
    pub parent_run_id: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub prompts: Vec<String>,
    pub output: Option<String>,
    pub usage: Option<Usage>,
    pub error: Option<String>,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<u64>,
}

/// Reference to a started run.
#[derive(Debug, Clone)]
pub struct RunId {
    index: usize,
    id: String,
}

impl RunId {
    pub fn as_str(&self) -> &str {
        &self.id
    }
}

/// Accumulates a [`DebugReport`] as calls happen.
#[derive(Debug, Default)]
pub struct TraceCollector {
    report: Mutex<DebugReport>,
}

impl TraceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn chain_start(&self, name: &str, inputs: &HashMap<String, String>) -> RunId {
        let mut report = self.report.lock().await;
        let run_id = new_run_id(report.chains.len());
        report.chains.push(ChainRun {
            run_id: run_id.id.clone(),
            name: name.to_string(),
            inputs: inputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            outputs: None,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
            elapsed_ms: None,
        });
        report.chain_call_count += 1;
        run_id
    }

    pub async fn chain_end(&self, run: &RunId, outputs: BTreeMap<String, String>) {
        let mut report = self.report.lock().await;
        if let Some(chain) = report.chains.get_mut(run.index) {
            chain.outputs = Some(outputs);
            close_run(&mut chain.ended_at, &mut chain.elapsed_ms, chain.started_at);
        }
    }

    pub async fn chain_error(&self, run: &RunId, error: &impl Display) {
        let mut report = self.report.lock().await;
        if let Some(chain) = report.chains.get_mut(run.index) {
            chain.error = Some(error.to_string());
            close_run(&mut chain.ended_at, &mut chain.elapsed_ms, chain.started_at);
        }
    }

    pub async fn llm_start(
        &self,
        parent: Option<&RunId>,
        model: &str,
        temperature: f32,
        prompt: &str,
    ) -> RunId {
        let mut report = self.report.lock().await;
        let run_id = new_run_id(report.llms.len());
        report.llms.push(LlmRun {
            run_id: run_id.id.clone(),
            parent_run_id: parent.map(|p| p.id.clone()),
            model: model.to_string(),
            temperature,
            prompts: vec![prompt.to_string()],
            output: None,
            usage: None,
            error: None,
            attempts: 0,
            started_at: Utc::now(),
            ended_at: None,
            elapsed_ms: None,
        });
        report.llm_call_count += 1;
        run_id
    }

    pub async fn llm_end(&self, run: &RunId, completion: &Completion) {
        let mut report = self.report.lock().await;
        if let Some(llm) = report.llms.get_mut(run.index) {
            llm.output = Some(completion.text.clone());
            llm.usage = completion.usage.clone();
            llm.attempts = completion.attempts;
            close_run(&mut llm.ended_at, &mut llm.elapsed_ms, llm.started_at);
        }
    }

    pub async fn llm_error(&self, run: &RunId, error: &impl Display, attempts: u32) {
        let mut report = self.report.lock().await;
        if let Some(llm) = report.llms.get_mut(run.index) {
            llm.error = Some(error.to_string());
            llm.attempts = attempts;
            close_run(&mut llm.ended_at, &mut llm.elapsed_ms, llm.started_at);
        }
    }

    /// Snapshot of everything recorded so far.
    pub async fn report(&self) -> DebugReport {
        self.report.lock().await.clone()
    }

    /// Consume the collector, returning the finished report.
    pub fn finish(self) -> DebugReport {
        self.report.into_inner()
    }
}

fn new_run_id(index: usize) -> RunId {
    RunId {
        index,
        id: Ulid::new().to_string(),
    }
}

fn close_run(
    ended_at: &mut Option<DateTime<Utc>>,
    elapsed_ms: &mut Option<u64>,
    started_at: DateTime<Utc>,
) {
    let now = Utc::now();
    *ended_at = Some(now);
    *elapsed_ms = Some((now - started_at).num_milliseconds().max(0) as u64);
}
