//! `testplane run`: seed a manifest into an in-memory store and drive it.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::memory::InMemoryObjectStore;
use crate::adapters::strategies::builtin_registry;
use crate::application::{ControllerManager, Settlement};
use crate::cli::output::{output, truncate, CommandOutput};
use crate::cli::table::{list_table, render_list};
use crate::domain::models::{ControllerConfig, ObjectKey, SuiteState, TestCase, TestCasePhase, TestWorker};
use crate::domain::ports::ObjectStore;
use crate::infrastructure::manifest::Manifest;

#[derive(Debug, Serialize)]
pub struct SuiteOutput {
    pub name: String,
    pub state: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TestCaseOutput {
    pub name: String,
    pub status: TestCasePhase,
    pub duration: Option<String>,
    pub message: Option<String>,
}

impl From<&TestCase> for TestCaseOutput {
    fn from(case: &TestCase) -> Self {
        Self {
            name: case.metadata.name.clone(),
            status: case.status.status,
            duration: elapsed(case.status.started_at, case.status.finished_at),
            message: case.status.failure_message.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TestWorkerOutput {
    pub name: String,
    pub status: &'static str,
    pub duration: Option<String>,
    pub message: Option<String>,
}

impl From<&TestWorker> for TestWorkerOutput {
    fn from(worker: &TestWorker) -> Self {
        let status = if worker.is_finished() {
            if worker.succeeded() {
                "Succeeded"
            } else {
                "Failed"
            }
        } else if worker.is_started() {
            "Running"
        } else if worker.is_dispatched() {
            "Dispatched"
        } else {
            "Pending"
        };
        Self {
            name: worker.metadata.name.clone(),
            status,
            duration: elapsed(worker.status.started_at, worker.status.finished_at),
            message: worker.status.failure_message.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub namespace: String,
    pub settlement: &'static str,
    pub suite: SuiteOutput,
    pub test_cases: Vec<TestCaseOutput>,
    pub test_workers: Vec<TestWorkerOutput>,
}

impl RunOutput {
    /// Every test case finished successfully.
    pub fn succeeded(&self) -> bool {
        self.test_cases
            .iter()
            .all(|case| case.status == TestCasePhase::Finished)
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Suite {}/{} ({})",
            self.namespace, self.suite.name, self.settlement
        )];
        if let Some(ref error) = self.suite.error {
            lines.push(format!("Suite error: {error}"));
        }
        lines.push(format!(
            "State: {}",
            serde_json::to_string(&self.suite.state).unwrap_or_default()
        ));

        let mut cases = list_table(&["name", "status", "duration", "message"]);
        for case in &self.test_cases {
            cases.add_row(vec![
                case.name.clone(),
                case.status.to_string(),
                case.duration.clone().unwrap_or_default(),
                truncate(case.message.as_deref().unwrap_or_default(), 60),
            ]);
        }
        lines.push(String::new());
        lines.push(render_list("test case", &cases, self.test_cases.len()));

        if !self.test_workers.is_empty() {
            let mut workers = list_table(&["name", "status", "duration", "message"]);
            for worker in &self.test_workers {
                workers.add_row(vec![
                    worker.name.clone(),
                    worker.status.to_string(),
                    worker.duration.clone().unwrap_or_default(),
                    truncate(worker.message.as_deref().unwrap_or_default(), 60),
                ]);
            }
            lines.push(String::new());
            lines.push(render_list("test worker", &workers, self.test_workers.len()));
        }

        lines.join("\n")
    }
}

fn elapsed(started: Option<DateTime<Utc>>, finished: Option<DateTime<Utc>>) -> Option<String> {
    let elapsed = (finished? - started?).to_std().ok()?;
    let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    Some(humantime::format_duration(Duration::from_millis(millis)).to_string())
}

/// Seed `manifest` into a fresh in-memory store and run it with the built-in
/// providers until it settles or `timeout` elapses.
pub async fn run_manifest(manifest: &Manifest, config: &ControllerConfig, timeout: Duration) -> Result<RunOutput> {
    let store = Arc::new(InMemoryObjectStore::new());
    manifest.seed(store.as_ref()).await?;

    let manager = ControllerManager::with_standard_reconcilers(
        store.clone(),
        Arc::new(builtin_registry()),
        config.clone(),
    );

    let shutdown = manager.shutdown_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, shutting down");
            shutdown.cancel();
        }
    });

    let settlement = manager.run_until_settled(Some(timeout)).await;
    interrupt.abort();
    let settlement = settlement.context("Failed to observe the store while running")?;
    info!(settlement = settlement.as_str(), "run finished");

    collect(store.as_ref(), manifest, settlement).await
}

async fn collect(store: &dyn ObjectStore, manifest: &Manifest, settlement: Settlement) -> Result<RunOutput> {
    let namespace = manifest.namespace.as_str();
    let suite = store
        .get_suite(&ObjectKey::new(namespace, &manifest.suite.name))
        .await?
        .with_context(|| format!("suite {} disappeared", manifest.suite.name))?;
    let state = SuiteState::parse(suite.state_text())
        .map(SuiteState::into_value)
        .unwrap_or_else(|_| serde_json::Value::String(suite.state_text().to_string()));

    let test_cases = store.list_test_cases(Some(namespace)).await?;
    let test_workers = store.list_test_workers(Some(namespace)).await?;

    Ok(RunOutput {
        namespace: namespace.to_string(),
        settlement: settlement.as_str(),
        suite: SuiteOutput {
            name: suite.metadata.name.clone(),
            state,
            error: suite.status.error.clone(),
        },
        test_cases: test_cases.iter().map(TestCaseOutput::from).collect(),
        test_workers: test_workers.iter().map(TestWorkerOutput::from).collect(),
    })
}

pub async fn execute(manifest: &Path, timeout: Duration, config: &ControllerConfig, json_mode: bool) -> Result<ExitCode> {
    let manifest = Manifest::load(manifest)?;
    let out = run_manifest(&manifest, config, timeout).await?;
    output(&out, json_mode);

    Ok(if out.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
