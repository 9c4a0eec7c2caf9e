//! Core container implementation

use parking_lot::RwLock;
use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::cache::{KeyLocks, SingletonCache, SingletonMap};
use crate::error::{DiError, DiResult};
use crate::guard::ResolutionGuard;
use crate::instance::{DependencyInstance, DependencyValue, Injectable};
use crate::key::DependencyKey;
use crate::lifecycle::{FreezeState, NotFrozenGuard};
use crate::provider::{clone_providers, kind_of, Provider};
use crate::scope::{Generations, Scope, ScopeRegistry};

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

/// Thread-safe dependency container.
///
/// Resolution checks the singleton cache, then every scope cache, then asks
/// each registered provider in registration order. The first answer wins and
/// is cached according to its declared scope.
///
/// Share a container between threads through an `Arc`; every operation takes
/// `&self`.
pub struct Container {
    /// Identifies this container in the per-thread resolution stack
    id: u64,
    /// Registered providers, in registration order
    providers: RwLock<Vec<Arc<dyn Provider>>>,
    /// Unscoped cache
    singletons: SingletonCache,
    /// Created scopes and their caches
    scopes: ScopeRegistry,
    /// Single-flight locks of keys being instantiated
    instantiation_locks: KeyLocks,
    state: FreezeState,
}

impl Container {
    /// Create an empty container
    pub fn new() -> Self {
        Self::from_parts(
            Vec::new(),
            SingletonCache::default(),
            ScopeRegistry::default(),
        )
    }

    fn from_parts(
        providers: Vec<Arc<dyn Provider>>,
        singletons: SingletonCache,
        scopes: ScopeRegistry,
    ) -> Self {
        Self {
            id: NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed),
            providers: RwLock::new(providers),
            singletons,
            scopes,
            instantiation_locks: KeyLocks::default(),
            state: FreezeState::new(),
        }
    }

    /// Same container with its providers replaced
    pub(crate) fn with_providers(mut self, providers: Vec<Arc<dyn Provider>>) -> Self {
        self.providers = RwLock::new(providers);
        self
    }

    /// Resolve a dependency
    pub fn get(&self, key: impl Into<DependencyKey>) -> DiResult<DependencyValue> {
        self.provide(key).map(|instance| instance.value)
    }

    /// Resolve a dependency and downcast it to `T`
    pub fn get_as<T: Injectable>(&self, key: impl Into<DependencyKey>) -> DiResult<Arc<T>> {
        let key = key.into();
        let value = self.provide_key(&key)?.value;
        let found = (*value).type_name();
        value
            .downcast_arc::<T>()
            .map_err(|_| DiError::TypeMismatch {
                key,
                expected: std::any::type_name::<T>(),
                found,
            })
    }

    /// Resolve a dependency along with the scope it is cached in
    pub fn provide(&self, key: impl Into<DependencyKey>) -> DiResult<DependencyInstance> {
        self.provide_key(&key.into())
    }

    /// Whether the key is cached or defined by any provider
    pub fn contains(&self, key: impl Into<DependencyKey>) -> bool {
        let key = key.into();
        self.cached(&key).is_some() || self.providers().iter().any(|p| p.exists(&key))
    }

    fn cached(&self, key: &DependencyKey) -> Option<DependencyInstance> {
        if let Some(value) = self.singletons.get(key) {
            return Some(DependencyInstance::new(value, Some(Scope::singleton())));
        }
        let instance = self.scopes.lookup(key);
        if instance.is_some() {
            trace!("Scope cache hit: {}", key);
        }
        instance
    }

    fn provide_key(&self, key: &DependencyKey) -> DiResult<DependencyInstance> {
        if let Some(instance) = self.cached(key) {
            return Ok(instance);
        }

        let _visiting = ResolutionGuard::enter(self.id, key)?;

        self.instantiation_locks.with_lock(key, || {
            // Another thread may have stored it while we waited
            if let Some(instance) = self.cached(key) {
                return Ok(instance);
            }

            let generations = self.scopes.generations();
            let instance = self.instantiate(key)?;
            self.store(key, instance, &generations)
        })
    }

    fn instantiate(&self, key: &DependencyKey) -> DiResult<DependencyInstance> {
        // Snapshot so providers may register new providers while resolving
        let providers = self.providers();

        for provider in &providers {
            match provider.maybe_provide(key, self) {
                Ok(Some(instance)) => {
                    trace!(
                        "{} provided by {} (scope: {:?})",
                        key,
                        provider.provider_name(),
                        instance.scope
                    );
                    return Ok(instance);
                }
                Ok(None) => continue,
                Err(error) => return Err(DiError::instantiating(key, error)),
            }
        }

        trace!("No provider for {}", key);
        Err(DiError::NotFound { key: key.clone() })
    }

    fn store(
        &self,
        key: &DependencyKey,
        instance: DependencyInstance,
        generations: &Generations,
    ) -> DiResult<DependencyInstance> {
        match &instance.scope {
            None => Ok(instance),
            Some(scope) if scope.is_singleton() => {
                let value = self.singletons.store(key, instance.value);
                Ok(DependencyInstance::new(value, Some(Scope::singleton())))
            }
            Some(_) => self.scopes.store(key, instance, generations),
        }
    }

    /// Instantiate and register a provider kind
    pub fn add_provider<P: Provider + Default>(&self) -> DiResult<Arc<P>> {
        self.register_provider(P::default())
    }

    /// Register an already built provider. Each kind may be registered once.
    pub fn register_provider<P: Provider>(&self, provider: P) -> DiResult<Arc<P>> {
        let provider = Arc::new(provider);
        self.push_provider(provider.clone())?;
        Ok(provider)
    }

    pub(crate) fn push_provider(&self, provider: Arc<dyn Provider>) -> DiResult<()> {
        let _unfrozen = self.state.ensure_not_frozen("add a provider")?;
        let mut providers = self.providers.write();

        let kind = kind_of(&*provider);
        if providers.iter().any(|existing| kind_of(&**existing) == kind) {
            return Err(DiError::ProviderContract {
                provider: provider.provider_name(),
                reason: "provider kind is already registered".to_string(),
            });
        }

        debug!("Registered provider: {}", provider.provider_name());
        providers.push(provider);
        Ok(())
    }

    /// The registered instance of provider kind `P`
    pub fn provider<P: Provider>(&self) -> Option<Arc<P>> {
        let kind = TypeId::of::<P>();
        self.providers
            .read()
            .iter()
            .find(|provider| kind_of(&***provider) == kind)
            .and_then(|provider| provider.clone().downcast_arc::<P>().ok())
    }

    /// Snapshot of the registered providers, in registration order
    pub fn providers(&self) -> Vec<Arc<dyn Provider>> {
        self.providers.read().clone()
    }

    /// Add singletons, all or nothing.
    ///
    /// Fails without adding anything if any key is already a singleton.
    pub fn add_singletons(&self, singletons: impl Into<SingletonMap>) -> DiResult<()> {
        let _unfrozen = self.state.ensure_not_frozen("add singletons")?;
        let singletons = singletons.into();
        let count = singletons.len();
        self.singletons.add_all(singletons)?;
        debug!("Added {} singleton(s)", count);
        Ok(())
    }

    /// Add one singleton
    pub fn add_singleton<K, V>(&self, key: K, value: V) -> DiResult<()>
    where
        K: Into<DependencyKey>,
        V: Injectable + fmt::Debug,
    {
        self.add_singletons(SingletonMap::new().with(key, value))
    }

    /// Create and register a new scope
    pub fn create_scope(&self, name: &str) -> DiResult<Scope> {
        let _unfrozen = self.state.ensure_not_frozen("create a scope")?;
        self.scopes.create(name)
    }

    /// Clear the cache of `scope` only. Allowed on frozen containers.
    pub fn reset_scope(&self, scope: &Scope) -> DiResult<()> {
        self.scopes.reset(scope)
    }

    /// Snapshot of the created scopes, in creation order
    pub fn scopes(&self) -> Vec<Scope> {
        self.scopes.scopes()
    }

    /// Forbid any further provider, scope or singleton. Idempotent.
    pub fn freeze(&self) {
        if self.state.freeze() {
            for provider in self.providers() {
                provider.freeze();
            }
            debug!("Container {} frozen", self.id);
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.state.is_frozen()
    }

    /// Hold the container unfrozen for the lifetime of the guard.
    ///
    /// Calling [`Container::freeze`] from the thread holding the guard
    /// deadlocks.
    pub fn ensure_not_frozen(&self) -> DiResult<NotFrozenGuard<'_>> {
        self.state.ensure_not_frozen("modify the container")
    }

    /// Fail if `key` is already a singleton or defined by a provider
    pub fn raise_if_exists(&self, key: impl Into<DependencyKey>) -> DiResult<()> {
        let key = key.into();

        if let Some(existing) = self.singletons.describe(&key) {
            return Err(DiError::DuplicateDependency {
                key,
                existing: format!("singleton {}", existing),
            });
        }

        for provider in self.providers() {
            if !provider.exists(&key) {
                continue;
            }
            let mut existing = format!("already provided by {}", provider.provider_name());
            match provider.debug(&key) {
                Some(debug) => {
                    existing.push('\n');
                    existing.push_str(&debug.to_string());
                }
                None => trace!("{} has no debug information for {}", provider.provider_name(), key),
            }
            return Err(DiError::DuplicateDependency { key, existing });
        }

        Ok(())
    }

    /// Independent copy of this container.
    ///
    /// Every provider is cloned through [`Provider::clone_provider`] and must
    /// come back as a new instance of the same kind. Singleton and scope
    /// caches are copied only if asked. The copy starts unfrozen.
    pub fn clone_container(&self, keep_singletons: bool, keep_scopes: bool) -> DiResult<Container> {
        let clones = clone_providers(&self.providers(), keep_singletons)?;

        let container = Container::from_parts(
            clones,
            self.singletons.snapshot(keep_singletons),
            self.scopes.snapshot(keep_scopes),
        );
        debug!(
            "Cloned container {} into {} (singletons: {}, scopes: {})",
            self.id, container.id, keep_singletons, keep_scopes
        );
        Ok(container)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<&'static str> = self
            .providers()
            .iter()
            .map(|provider| provider.provider_name())
            .collect();
        f.debug_struct("Container")
            .field("providers", &providers)
            .field("singletons", &self.singletons.keys())
            .field("scopes", &self.scopes.cached_counts())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
