//! Strategy registry and provider kinds.
//!
//! The [`StrategyRegistry`] maps provider names to [`StrategyProvider`]s and
//! resolves [`StrategyDescriptor`]s into tagged [`Behavior`]s. Resolution is
//! capability-agnostic; the `resolve_*` helpers add the capability check each
//! lifecycle needs.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Configuration, StrategyDescriptor};
use crate::domain::ports::{
    Behavior, ErasedStateReconciler, IntoBehavior, StrategyProvider, TestCaseBehavior,
    TestWorkerBehavior,
};

/// Provider delegating construction to a closure over the configuration.
pub struct FnProvider<F> {
    build: F,
}

impl<F> FnProvider<F>
where
    F: Fn(&Configuration) -> DomainResult<Behavior> + Send + Sync,
{
    pub fn new(build: F) -> Self {
        Self { build }
    }
}

impl<F> StrategyProvider for FnProvider<F>
where
    F: Fn(&Configuration) -> DomainResult<Behavior> + Send + Sync,
{
    fn provide(&self, configuration: &Configuration) -> DomainResult<Behavior> {
        (self.build)(configuration)
    }
}

/// Provider producing a fresh `T::default()` on every resolution.
///
/// Configuration is ignored.
pub struct TemplateProvider<T> {
    _template: PhantomData<fn() -> T>,
}

impl<T> TemplateProvider<T>
where
    T: Default + IntoBehavior,
{
    pub fn new() -> Self {
        Self {
            _template: PhantomData,
        }
    }
}

impl<T> Default for TemplateProvider<T>
where
    T: Default + IntoBehavior,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StrategyProvider for TemplateProvider<T>
where
    T: Default + IntoBehavior,
{
    fn provide(&self, _configuration: &Configuration) -> DomainResult<Behavior> {
        Ok(T::default().into_behavior())
    }
}

/// Registry of named strategy providers.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    providers: HashMap<String, Arc<dyn StrategyProvider>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("providers", &self.provider_names())
            .finish()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, provider: impl StrategyProvider + 'static) {
        let name = name.into();
        if self
            .providers
            .insert(name.clone(), Arc::new(provider))
            .is_some()
        {
            warn!(provider = %name, "strategy provider replaced");
        }
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with_provider(mut self, name: impl Into<String>, provider: impl StrategyProvider + 'static) -> Self {
        self.register(name, provider);
        self
    }

    /// Register a closure as a provider.
    #[must_use]
    pub fn with_fn<F>(self, name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&Configuration) -> DomainResult<Behavior> + Send + Sync + 'static,
    {
        self.with_provider(name, FnProvider::new(build))
    }

    /// Register a template provider for `T`.
    #[must_use]
    pub fn with_template<T>(self, name: impl Into<String>) -> Self
    where
        T: Default + IntoBehavior + 'static,
    {
        self.with_provider(name, TemplateProvider::<T>::new())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a descriptor into whatever behavior its provider builds.
    pub fn resolve(&self, descriptor: &StrategyDescriptor) -> DomainResult<Behavior> {
        let provider = self
            .providers
            .get(&descriptor.provider)
            .ok_or_else(|| DomainError::ProviderNotFound(descriptor.provider.clone()))?;

        let behavior = provider.provide(&descriptor.configuration)?;
        debug!(strategy = %descriptor, kind = behavior.kind_name(), "resolved strategy");
        Ok(behavior)
    }

    /// Resolve a descriptor that must yield a state reconciler.
    pub fn resolve_state_reconciler(
        &self,
        descriptor: &StrategyDescriptor,
    ) -> DomainResult<Arc<dyn ErasedStateReconciler>> {
        match self.resolve(descriptor)? {
            Behavior::StateReconciler(reconciler) => Ok(reconciler),
            other => Err(wrong_kind(descriptor, "state reconciler", &other)),
        }
    }

    /// Resolve a descriptor that must yield a runnable test case.
    pub fn resolve_test_case(&self, descriptor: &StrategyDescriptor) -> DomainResult<Arc<dyn TestCaseBehavior>> {
        match self.resolve(descriptor)? {
            Behavior::TestCase(test_case) => Ok(test_case),
            other => Err(wrong_kind(descriptor, "test case", &other)),
        }
    }

    /// Resolve a descriptor that must yield a test worker.
    pub fn resolve_test_worker(
        &self,
        descriptor: &StrategyDescriptor,
    ) -> DomainResult<Arc<dyn TestWorkerBehavior>> {
        match self.resolve(descriptor)? {
            Behavior::TestWorker(worker) => Ok(worker),
            other => Err(wrong_kind(descriptor, "test worker", &other)),
        }
    }
}

fn wrong_kind(descriptor: &StrategyDescriptor, expected: &'static str, actual: &Behavior) -> DomainError {
    DomainError::WrongBehaviorKind {
        provider: descriptor.provider.clone(),
        expected,
        actual: actual.kind_name(),
    }
}
