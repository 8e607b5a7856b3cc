//! YAML manifests describing one suite with its test cases and workers.
//!
//! ```yaml
//! namespace: qa
//! suite:
//!   name: smoke
//!   initialState: '{"ready": false}'
//!   stateStrategy:
//!     provider: json-state
//! testCases:
//!   - name: boots
//!     timeout: 30s
//!     strategy:
//!       provider: command
//!       configuration:
//!         program: ./boot.sh
//!         when: /ready
//! testWorkers:
//!   - name: warm-up
//!     strategy:
//!       provider: set-state
//!       configuration:
//!         path: /ready
//!         value: true
//! ```
//!
//! Configuration values may be any YAML scalar, sequence or mapping. Scalars
//! are passed to providers as their plain text; sequences and mappings as JSON.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::domain::models::{ObjectKind, ObjectMeta, StrategyDescriptor, TestCase, TestSuite, TestWorker};
use crate::domain::ports::ObjectStore;

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Manifest {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub suite: SuiteEntry,
    #[serde(default)]
    pub test_cases: Vec<TestCaseEntry>,
    #[serde(default)]
    pub test_workers: Vec<TestWorkerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SuiteEntry {
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub initial_state: String,
    pub state_strategy: StrategyEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TestCaseEntry {
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout: Option<String>,
    pub strategy: StrategyEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TestWorkerEntry {
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub strategy: StrategyEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyEntry {
    pub provider: String,
    #[serde(default)]
    pub configuration: BTreeMap<String, serde_yaml::Value>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl StrategyEntry {
    fn descriptor(&self) -> Result<StrategyDescriptor> {
        self.configuration
            .iter()
            .try_fold(StrategyDescriptor::new(&self.provider), |descriptor, (key, value)| {
                let text = configuration_text(value)
                    .with_context(|| format!("configuration key '{key}' of provider '{}'", self.provider))?;
                Ok(descriptor.with(key, text))
            })
    }
}

fn configuration_text(value: &serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value;
    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(_) | Value::Mapping(_) => serde_json::to_string(value)?,
        Value::Tagged(_) => bail!("tagged values are not supported"),
    })
}

fn metadata(namespace: &str, name: &str, annotations: &BTreeMap<String, String>) -> ObjectMeta {
    annotations
        .iter()
        .fold(ObjectMeta::new(namespace, name), |meta, (k, v)| meta.with_annotation(k, v))
}

impl Manifest {
    /// Read and parse a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        let mut case_names = std::collections::BTreeSet::new();
        for case in &self.test_cases {
            if !case_names.insert(case.name.as_str()) {
                bail!("duplicate test case name '{}'", case.name);
            }
        }
        let mut worker_names = std::collections::BTreeSet::new();
        for worker in &self.test_workers {
            if !worker_names.insert(worker.name.as_str()) {
                bail!("duplicate test worker name '{}'", worker.name);
            }
        }
        Ok(())
    }

    pub fn suite(&self) -> Result<TestSuite> {
        let entry = &self.suite;
        Ok(TestSuite::new(
            metadata(&self.namespace, &entry.name, &entry.annotations),
            entry.state_strategy.descriptor()?,
        )
        .with_initial_state(entry.initial_state.clone()))
    }

    pub fn test_cases(&self) -> Result<Vec<TestCase>> {
        self.test_cases
            .iter()
            .map(|entry| {
                let case = TestCase::new(
                    metadata(&self.namespace, &entry.name, &entry.annotations),
                    entry.strategy.descriptor()?,
                );
                Ok(match &entry.timeout {
                    Some(timeout) => case.with_timeout(timeout.clone()),
                    None => case,
                })
            })
            .collect()
    }

    pub fn test_workers(&self) -> Result<Vec<TestWorker>> {
        self.test_workers
            .iter()
            .map(|entry| {
                Ok(TestWorker::new(
                    metadata(&self.namespace, &entry.name, &entry.annotations),
                    entry.strategy.descriptor()?,
                ))
            })
            .collect()
    }

    /// Create every object of the manifest in `store`.
    ///
    /// The suite goes first so its state exists before anything is dispatched.
    pub async fn seed(&self, store: &dyn ObjectStore) -> Result<()> {
        store
            .create_suite(self.suite()?)
            .await
            .context("Failed to create suite")?;
        for case in self.test_cases()? {
            let name = case.metadata.name.clone();
            store
                .create_test_case(case)
                .await
                .with_context(|| format!("Failed to create test case {name}"))?;
        }
        for worker in self.test_workers()? {
            let name = worker.metadata.name.clone();
            store
                .create_test_worker(worker)
                .await
                .with_context(|| format!("Failed to create test worker {name}"))?;
        }
        Ok(())
    }

    /// Every descriptor in the manifest with the kind and name of its owner.
    pub fn descriptors(&self) -> Result<Vec<(ObjectKind, String, StrategyDescriptor)>> {
        let mut out = vec![(
            ObjectKind::TestSuite,
            self.suite.name.clone(),
            self.suite.state_strategy.descriptor()?,
        )];
        for case in &self.test_cases {
            out.push((ObjectKind::TestCase, case.name.clone(), case.strategy.descriptor()?));
        }
        for worker in &self.test_workers {
            out.push((ObjectKind::TestWorker, worker.name.clone(), worker.strategy.descriptor()?));
        }
        Ok(out)
    }
}
