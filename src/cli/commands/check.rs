//! `testplane check`: resolve every strategy in a manifest.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use serde::Serialize;

use crate::adapters::strategies::builtin_registry;
use crate::cli::output::{output, CommandOutput};
use crate::cli::table::{list_table, render_list};
use crate::domain::models::{ObjectKind, StrategyDescriptor};
use crate::infrastructure::manifest::Manifest;
use crate::services::StrategyRegistry;

#[derive(Debug, Serialize)]
pub struct CheckEntry {
    pub kind: ObjectKind,
    pub name: String,
    pub strategy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckOutput {
    pub providers: Vec<String>,
    pub entries: Vec<CheckEntry>,
}

impl CheckOutput {
    pub fn passed(&self) -> bool {
        self.entries.iter().all(|entry| entry.error.is_none())
    }
}

impl CommandOutput for CheckOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["kind", "name", "strategy", "result"]);
        for entry in &self.entries {
            table.add_row(vec![
                entry.kind.to_string(),
                entry.name.clone(),
                entry.strategy.clone(),
                entry.error.clone().unwrap_or_else(|| "ok".to_string()),
            ]);
        }
        format!(
            "Registered providers: {}\n{}",
            self.providers.join(", "),
            render_list("strategy", &table, self.entries.len())
        )
    }
}

/// Resolve one descriptor as the behavior its owner needs.
fn check_descriptor(registry: &StrategyRegistry, kind: ObjectKind, descriptor: &StrategyDescriptor) -> Result<(), String> {
    let resolved = match kind {
        ObjectKind::TestSuite => registry.resolve_state_reconciler(descriptor).map(drop),
        ObjectKind::TestCase => registry.resolve_test_case(descriptor).map(drop),
        ObjectKind::TestWorker => registry.resolve_test_worker(descriptor).map(drop),
    };
    resolved.map_err(|err| err.to_string())
}

pub fn check_manifest(manifest: &Manifest, registry: &StrategyRegistry) -> Result<CheckOutput> {
    let mut entries: Vec<CheckEntry> = manifest
        .descriptors()?
        .into_iter()
        .map(|(kind, name, descriptor)| CheckEntry {
            kind,
            name,
            strategy: descriptor.to_string(),
            error: check_descriptor(registry, kind, &descriptor).err(),
        })
        .collect();

    // Timeouts are parsed on the first run of a case; surface bad ones early.
    for case in manifest.test_cases()? {
        if let Err(err) = case.spec.timeout_duration() {
            if let Some(entry) = entries
                .iter_mut()
                .find(|e| e.kind == ObjectKind::TestCase && e.name == case.metadata.name && e.error.is_none())
            {
                entry.error = Some(err.to_string());
            }
        }
    }

    Ok(CheckOutput {
        providers: registry.provider_names().into_iter().map(String::from).collect(),
        entries,
    })
}

pub fn execute(manifest: &Path, json_mode: bool) -> Result<ExitCode> {
    let manifest = Manifest::load(manifest)?;
    let out = check_manifest(&manifest, &builtin_registry())?;
    output(&out, json_mode);

    Ok(if out.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r"
namespace: qa
suite:
  name: smoke
  stateStrategy: {provider: json-state}
testCases:
  - name: good
    timeout: 5s
    strategy:
      provider: command
      configuration: {program: 'true'}
  - name: unknown
    strategy: {provider: teleport}
  - name: wrong-kind
    strategy: {provider: set-state, configuration: {path: /x, value: 1}}
  - name: slow
    timeout: eventually
    strategy:
      provider: command
      configuration: {program: 'true'}
testWorkers:
  - name: bad-path
    strategy:
      provider: set-state
      configuration: {path: x, value: 1}
";

    #[test]
    fn test_check_reports_each_problem() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let out = check_manifest(&manifest, &builtin_registry()).unwrap();
        assert!(!out.passed());

        let error_of = |name: &str| {
            out.entries
                .iter()
                .find(|e| e.name == name)
                .and_then(|e| e.error.clone())
        };
        assert_eq!(error_of("smoke"), None);
        assert_eq!(error_of("good"), None);
        assert!(error_of("unknown").unwrap().contains("teleport"));
        assert!(error_of("wrong-kind").unwrap().contains("test case"));
        assert!(error_of("slow").unwrap().contains("eventually"));
        assert!(error_of("bad-path").is_some());
    }

    #[test]
    fn test_clean_manifest_passes() {
        let manifest = Manifest::parse(
            "suite:\n  name: s\n  stateStrategy: {provider: test-case-status}\n",
        )
        .unwrap();
        let out = check_manifest(&manifest, &builtin_registry()).unwrap();
        assert!(out.passed());
        assert!(out.to_human().contains("Registered providers: command, json-state"));
    }
}
