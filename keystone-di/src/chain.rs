//! Composite provider with override and extension precedence

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::container::Container;
use crate::error::{DiError, DiResult};
use crate::instance::DependencyInstance;
use crate::key::DependencyKey;
use crate::provider::{clone_providers, DependencyDebug, Provider};

/// Ordered list of inner providers, asked in turn until one answers.
///
/// `override_with` puts a provider in front of every existing one, so its
/// definitions shadow theirs. `extend_with` puts it last. The chain never
/// reports a key as existing: shadowing is the point, so it must not trip
/// duplicate checks.
#[derive(Default)]
pub struct ProviderChain {
    providers: RwLock<Vec<Arc<dyn Provider>>>,
    frozen: AtomicBool,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_providers(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            providers: RwLock::new(providers),
            frozen: AtomicBool::new(false),
        }
    }

    /// Give `provider` precedence over every provider already chained
    pub fn override_with(&self, provider: Arc<dyn Provider>) -> DiResult<()> {
        self.ensure_not_frozen("override a provider chain")?;
        debug!("Chain override: {}", provider.provider_name());
        self.providers.write().insert(0, provider);
        Ok(())
    }

    /// Consult `provider` after every provider already chained
    pub fn extend_with(&self, provider: Arc<dyn Provider>) -> DiResult<()> {
        self.ensure_not_frozen("extend a provider chain")?;
        debug!("Chain extension: {}", provider.provider_name());
        self.providers.write().push(provider);
        Ok(())
    }

    /// Snapshot of the chained providers, highest precedence first
    pub fn providers(&self) -> Vec<Arc<dyn Provider>> {
        self.providers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    fn ensure_not_frozen(&self, operation: &'static str) -> DiResult<()> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(DiError::FrozenWorld { operation });
        }
        Ok(())
    }
}

impl Provider for ProviderChain {
    fn maybe_provide(
        &self,
        key: &DependencyKey,
        container: &Container,
    ) -> DiResult<Option<DependencyInstance>> {
        // Inner providers may resolve other keys through the container
        for provider in self.providers() {
            if let Some(instance) = provider.maybe_provide(key, container)? {
                return Ok(Some(instance));
            }
        }
        Ok(None)
    }

    fn exists(&self, _key: &DependencyKey) -> bool {
        false
    }

    fn clone_provider(&self, keep_singletons_cache: bool) -> DiResult<Arc<dyn Provider>> {
        let providers = clone_providers(&self.providers(), keep_singletons_cache)?;
        Ok(Arc::new(ProviderChain::from_providers(providers)))
    }

    fn debug(&self, key: &DependencyKey) -> Option<DependencyDebug> {
        self.providers()
            .iter()
            .find(|provider| provider.exists(key))
            .and_then(|provider| provider.debug(key))
    }

    fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
        for provider in self.providers() {
            provider.freeze();
        }
    }

    fn provider_name(&self) -> &'static str {
        "ProviderChain"
    }
}
