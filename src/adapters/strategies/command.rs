//! `command`: a test case that runs an external process.
//!
//! Configuration:
//! - `program` (required): executable to run;
//! - `args`: whitespace separated arguments;
//! - `when` / `equals`: dispatch gate, see [`StateGate`].
//!
//! A zero exit status passes the test. The process is killed when the test
//! is cancelled.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::gate::StateGate;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Configuration, SuiteState};
use crate::domain::ports::{Behavior, StrategyContext, TestCaseBehavior};

pub const PROVIDER: &str = "command";

/// Longest stderr excerpt carried into a failure message.
const STDERR_EXCERPT_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct CommandTestCase {
    program: String,
    args: Vec<String>,
    gate: StateGate,
}

impl CommandTestCase {
    pub fn from_configuration(configuration: &Configuration) -> DomainResult<Self> {
        let program = configuration
            .get("program")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| DomainError::InvalidConfiguration {
                provider: PROVIDER.to_string(),
                reason: "'program' is required".to_string(),
            })?;

        let args = configuration
            .get("args")
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Self {
            program,
            args,
            gate: StateGate::from_configuration(PROVIDER, configuration)?,
        })
    }

    /// Provider entry point for the registry.
    pub fn provide(configuration: &Configuration) -> DomainResult<Behavior> {
        Self::from_configuration(configuration).map(Behavior::test_case)
    }
}

#[async_trait]
impl TestCaseBehavior for CommandTestCase {
    fn should_run(&self, state: &SuiteState) -> bool {
        self.gate.is_open(state)
    }

    async fn run(&self, ctx: StrategyContext) -> DomainResult<()> {
        debug!(program = %self.program, args = ?self.args, "spawning test command");

        let child = Command::new(&self.program)
            .args(&self.args)
            .env("TESTPLANE_NAMESPACE", &ctx.namespace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DomainError::execution(format!("failed to spawn '{}': {e}", self.program)))?;

        let output = tokio::select! {
            output = child.wait_with_output() => output
                .map_err(|e| DomainError::execution(format!("failed to wait for '{}': {e}", self.program)))?,
            () = ctx.cancellation.cancelled() => {
                return Err(DomainError::execution(format!("'{}' was cancelled", self.program)));
            }
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT_CHARS).collect();
        let mut message = format!("'{}' exited with {}", self.program, output.status);
        if !excerpt.is_empty() {
            message.push_str(": ");
            message.push_str(&excerpt);
        }
        Err(DomainError::Execution(message))
    }
}
