mod common;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use testplane::domain::models::Configuration;
use testplane::{
    Behavior, CompositeState, CompositeStateReconciler, DomainError, DomainResult, InMemoryObjectStore, ObjectMeta,
    ObjectStore, Reconciler, StateReconciler, StrategyContext, StrategyDescriptor, StrategyRegistry,
    SuiteDispatchEngine, TestSuite,
};

use common::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(non_snake_case)]
struct Foo {
    A: String,
    B: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(non_snake_case)]
struct Bar {
    A: i64,
    B: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Pair {
    foo: Foo,
    bar: Bar,
}

impl CompositeState for Pair {
    const FIELDS: &'static [&'static str] = &["foo", "bar"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Triple {
    foo: Foo,
    bar: Bar,
    baz: Bar,
}

impl CompositeState for Triple {
    const FIELDS: &'static [&'static str] = &["foo", "bar", "baz"];
}

struct Suffix;

#[async_trait]
impl StateReconciler for Suffix {
    type State = Foo;

    async fn reconcile(&self, _ctx: &StrategyContext, current: Foo) -> DomainResult<Foo> {
        Ok(Foo {
            A: format!("{} foo", current.A),
            B: format!("foo {}", current.B),
        })
    }
}

struct Increment;

#[async_trait]
impl StateReconciler for Increment {
    type State = Bar;

    async fn reconcile(&self, _ctx: &StrategyContext, current: Bar) -> DomainResult<Bar> {
        Ok(Bar {
            A: current.A + 1,
            B: current.B + 1,
        })
    }
}

const PAIR: &str = "qa-pair";

fn pair_registry() -> Arc<StrategyRegistry> {
    Arc::new(StrategyRegistry::new().with_fn(PAIR, |_: &Configuration| {
        let reconciler = CompositeStateReconciler::<Pair>::builder()
            .field("foo", Suffix)
            .field("bar", Increment)
            .build()?;
        Ok(Behavior::state_reconciler(reconciler))
    }))
}

#[tokio::test]
async fn test_suite_reconciles_composite_state() {
    let store = Arc::new(InMemoryObjectStore::new());
    store
        .create_suite(
            TestSuite::new(ObjectMeta::new(NAMESPACE, SUITE), StrategyDescriptor::new(PAIR))
                .with_initial_state(r#"{"foo":{"A":"hello","B":"world"},"bar":{"A":42,"B":24}}"#),
        )
        .await
        .unwrap();

    let engine = SuiteDispatchEngine::new(store.clone(), pair_registry(), fast_config());
    engine.reconcile(&suite_key()).await.unwrap();

    let suite = get_suite(&store).await;
    assert!(suite.status.error.is_none());
    assert_eq!(
        suite_state(&suite),
        json!({"foo": {"A": "hello foo", "B": "foo world"}, "bar": {"A": 43, "B": 25}})
    );

    // The next pass starts from the persisted state, not the initial one.
    engine.reconcile(&suite_key()).await.unwrap();
    assert_eq!(
        suite_state(&get_suite(&store).await),
        json!({"foo": {"A": "hello foo foo", "B": "foo foo world"}, "bar": {"A": 44, "B": 26}})
    );
}

#[test]
fn test_missing_field_mapping_fails_fast() {
    let err = CompositeStateReconciler::<Triple>::builder()
        .field("foo", Suffix)
        .field("bar", Increment)
        .build()
        .err()
        .expect("construction should fail");

    match err {
        DomainError::IncompleteFieldMapping { missing, unknown } => {
            assert_eq!(missing, vec!["baz".to_string()]);
            assert!(unknown.is_empty());
        }
        other => panic!("expected IncompleteFieldMapping, got {other}"),
    }
}

#[tokio::test]
async fn test_misconfigured_provider_is_recorded_on_suite() {
    let registry = Arc::new(StrategyRegistry::new().with_fn("qa-broken", |_: &Configuration| {
        let reconciler = CompositeStateReconciler::<Triple>::builder()
            .field("foo", Suffix)
            .field("bar", Increment)
            .build()?;
        Ok(Behavior::state_reconciler(reconciler))
    }));

    let store = Arc::new(InMemoryObjectStore::new());
    store
        .create_suite(TestSuite::new(
            ObjectMeta::new(NAMESPACE, SUITE),
            StrategyDescriptor::new("qa-broken"),
        ))
        .await
        .unwrap();

    SuiteDispatchEngine::new(store.clone(), registry, fast_config())
        .reconcile(&suite_key())
        .await
        .unwrap();

    let error = get_suite(&store).await.status.error.expect("error recorded");
    assert!(error.starts_with("Error obtaining strategy"), "unexpected error: {error}");
    assert!(error.contains("baz"));
}
