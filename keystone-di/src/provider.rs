//! Provider contract

use downcast_rs::{impl_downcast, DowncastSync};
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::container::Container;
use crate::error::{DiError, DiResult};
use crate::instance::DependencyInstance;
use crate::key::DependencyKey;
use crate::scope::Scope;

/// Pluggable unit answering "can you produce this key, and how is it cached?"
///
/// Providers are shared between threads and resolved re-entrantly: a provider
/// may call back into the container it receives to resolve the keys it
/// depends on. Any registration state a provider owns must therefore live
/// behind interior mutability.
pub trait Provider: DowncastSync {
    /// Produce the dependency, or `Ok(None)` if the key is not handled here.
    ///
    /// Must not touch the container caches; caching follows the returned
    /// instance's scope.
    fn maybe_provide(
        &self,
        key: &DependencyKey,
        container: &Container,
    ) -> DiResult<Option<DependencyInstance>>;

    /// Whether a definition exists for `key`, without instantiating it
    fn exists(&self, key: &DependencyKey) -> bool;

    /// Independent copy for a cloned container.
    ///
    /// Must return a new instance: the container rejects a clone that is
    /// `self` or any provider it already tracks. Memoized values the provider
    /// keeps itself are carried over only if `keep_singletons_cache` is set.
    /// Composite providers clone their inner providers with
    /// [`clone_providers`] so the same check applies to them.
    fn clone_provider(&self, keep_singletons_cache: bool) -> DiResult<Arc<dyn Provider>>;

    /// Diagnostics for an existing definition of `key`
    fn debug(&self, _key: &DependencyKey) -> Option<DependencyDebug> {
        None
    }

    /// Called once the owning container is frozen
    fn freeze(&self) {}

    /// Human readable name of the provider kind
    fn provider_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl_downcast!(sync Provider);

/// Kind of a provider: its concrete type
pub(crate) fn kind_of(provider: &dyn Provider) -> TypeId {
    provider.as_any().type_id()
}

/// Whether two handles point at the same provider instance
pub(crate) fn same_provider(a: &Arc<dyn Provider>, b: &Arc<dyn Provider>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Clone every provider of `originals`, in order.
///
/// Each clone must be a new instance, distinct from every original and every
/// clone made before it, and of the same kind as its original.
pub fn clone_providers(
    originals: &[Arc<dyn Provider>],
    keep_singletons_cache: bool,
) -> DiResult<Vec<Arc<dyn Provider>>> {
    let mut clones: Vec<Arc<dyn Provider>> = Vec::with_capacity(originals.len());

    for original in originals {
        let clone = original.clone_provider(keep_singletons_cache)?;

        if originals
            .iter()
            .chain(clones.iter())
            .any(|tracked| same_provider(tracked, &clone))
        {
            warn!(
                "{} returned an already tracked instance from clone_provider",
                original.provider_name()
            );
            return Err(DiError::ProviderContract {
                provider: original.provider_name(),
                reason: "clone_provider must return a fresh provider instance, \
                         not one already tracked"
                    .to_string(),
            });
        }

        if kind_of(&*clone) != kind_of(&**original) {
            return Err(DiError::ProviderContract {
                provider: original.provider_name(),
                reason: format!(
                    "clone_provider returned a provider instance of another kind: {}",
                    clone.provider_name()
                ),
            });
        }

        clones.push(clone);
    }

    Ok(clones)
}

/// Human-readable description of a definition
#[derive(Debug, Clone, Default)]
pub struct DependencyDebug {
    pub info: String,
    /// Declared caching scope, `None` for values recomputed every time
    pub scope: Option<Scope>,
    /// Functions or types the definition wires
    pub wired: Vec<String>,
    /// Keys the definition resolves when instantiated
    pub dependencies: Vec<DependencyKey>,
}

impl DependencyDebug {
    pub fn new(info: impl Into<String>) -> Self {
        Self {
            info: info.into(),
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, scope: Option<Scope>) -> Self {
        self.scope = scope;
        self
    }

    pub fn wiring(mut self, wired: impl Into<String>) -> Self {
        self.wired.push(wired.into());
        self
    }

    pub fn depends_on(mut self, key: impl Into<DependencyKey>) -> Self {
        self.dependencies.push(key.into());
        self
    }
}

impl fmt::Display for DependencyDebug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.info)?;
        match &self.scope {
            Some(scope) => write!(f, " [{}]", scope)?,
            None => f.write_str(" [no scope]")?,
        }
        if !self.wired.is_empty() {
            write!(f, "\n  wires: {}", self.wired.join(", "))?;
        }
        if !self.dependencies.is_empty() {
            let keys: Vec<String> = self.dependencies.iter().map(|k| k.to_string()).collect();
            write!(f, "\n  depends on: {}", keys.join(", "))?;
        }
        Ok(())
    }
}
