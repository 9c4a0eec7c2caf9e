//! Named cache partitions and their registry

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

use crate::error::{DiError, DiResult};
use crate::instance::DependencyInstance;
use crate::key::DependencyKey;

const SINGLETON_SCOPE_NAME: &str = "singleton";

/// A cache partition.
///
/// Equality is by identity: two scopes created with the same name are still
/// different scopes. The name only serves diagnostics.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<str>,
}

impl Scope {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            inner: Arc::from(name),
        }
    }

    /// The distinguished scope of values cached forever
    pub fn singleton() -> Scope {
        static SINGLETON: OnceLock<Scope> = OnceLock::new();
        SINGLETON
            .get_or_init(|| Scope::new(SINGLETON_SCOPE_NAME))
            .clone()
    }

    pub fn name(&self) -> &str {
        &self.inner
    }

    pub fn is_singleton(&self) -> bool {
        *self == Scope::singleton()
    }

    fn addr(&self) -> *const u8 {
        Arc::as_ptr(&self.inner) as *const u8
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Scope {}

impl Hash for Scope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope({})", self.name())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cache of one scope
#[derive(Default)]
struct ScopeCache {
    entries: RwLock<FxHashMap<DependencyKey, DependencyInstance>>,
    /// Bumped on every reset of this scope, under the `entries` write lock
    generation: AtomicU64,
}

impl ScopeCache {
    fn snapshot(&self, keep_entries: bool) -> Self {
        let entries = if keep_entries {
            self.entries.read().clone()
        } else {
            FxHashMap::default()
        };
        Self {
            entries: RwLock::new(entries),
            generation: AtomicU64::new(0),
        }
    }
}

/// Generation of every scope, taken before a resolution starts.
///
/// A value computed under an older generation of its scope is returned to
/// the caller but never cached.
pub(crate) struct Generations(Vec<(Scope, u64)>);

impl Generations {
    /// Scopes created after the snapshot start at generation zero
    fn of(&self, scope: &Scope) -> u64 {
        self.0
            .iter()
            .find(|(candidate, _)| candidate == scope)
            .map_or(0, |(_, generation)| *generation)
    }
}

/// Ordered set of scopes created by one container
#[derive(Default)]
pub(crate) struct ScopeRegistry {
    scopes: RwLock<Vec<(Scope, Arc<ScopeCache>)>>,
}

impl ScopeRegistry {
    pub(crate) fn create(&self, name: &str) -> DiResult<Scope> {
        if name.is_empty() || name == SINGLETON_SCOPE_NAME {
            return Err(DiError::InvalidScopeName {
                name: name.to_string(),
            });
        }

        let mut scopes = self.scopes.write();
        if scopes.iter().any(|(scope, _)| scope.name() == name) {
            return Err(DiError::DuplicateScope {
                name: name.to_string(),
            });
        }

        let scope = Scope::new(name);
        scopes.push((scope.clone(), Arc::new(ScopeCache::default())));
        debug!("Created scope: {}", name);
        Ok(scope)
    }

    pub(crate) fn scopes(&self) -> Vec<Scope> {
        self.scopes
            .read()
            .iter()
            .map(|(scope, _)| scope.clone())
            .collect()
    }

    pub(crate) fn generations(&self) -> Generations {
        Generations(
            self.scopes
                .read()
                .iter()
                .map(|(scope, cache)| (scope.clone(), cache.generation.load(Ordering::Acquire)))
                .collect(),
        )
    }

    fn cache_of(&self, scope: &Scope) -> DiResult<Arc<ScopeCache>> {
        self.scopes
            .read()
            .iter()
            .find(|(candidate, _)| candidate == scope)
            .map(|(_, cache)| cache.clone())
            .ok_or_else(|| DiError::UnknownScope {
                name: scope.name().to_string(),
            })
    }

    /// Look the key up in every scope, in creation order
    pub(crate) fn lookup(&self, key: &DependencyKey) -> Option<DependencyInstance> {
        let scopes = self.scopes.read();
        scopes
            .iter()
            .find_map(|(_, cache)| cache.entries.read().get(key).cloned())
    }

    /// Store a freshly computed scoped instance.
    ///
    /// Returns the instance callers must observe: the one already cached if
    /// another thread stored first, or `instance` itself when its scope was
    /// reset since `generations` was taken.
    pub(crate) fn store(
        &self,
        key: &DependencyKey,
        instance: DependencyInstance,
        generations: &Generations,
    ) -> DiResult<DependencyInstance> {
        let scope = match &instance.scope {
            Some(scope) => scope.clone(),
            None => return Ok(instance),
        };
        let cache = self.cache_of(&scope)?;
        let mut entries = cache.entries.write();

        if cache.generation.load(Ordering::Acquire) != generations.of(&scope) {
            trace!("Scope {} reset during resolution of {}, not caching", scope, key);
            return Ok(instance);
        }

        Ok(entries.entry(key.clone()).or_insert(instance).clone())
    }

    pub(crate) fn reset(&self, scope: &Scope) -> DiResult<()> {
        let cache = self.cache_of(scope)?;
        let mut entries = cache.entries.write();
        entries.clear();
        cache.generation.fetch_add(1, Ordering::AcqRel);
        debug!("Reset scope: {}", scope);
        Ok(())
    }

    /// Copy of the registry for a cloned container. Scope identities are
    /// shared, cache contents only when `keep_entries` is set.
    pub(crate) fn snapshot(&self, keep_entries: bool) -> Self {
        let scopes = self
            .scopes
            .read()
            .iter()
            .map(|(scope, cache)| (scope.clone(), Arc::new(cache.snapshot(keep_entries))))
            .collect();
        Self {
            scopes: RwLock::new(scopes),
        }
    }

    pub(crate) fn cached_counts(&self) -> Vec<(Scope, usize)> {
        self.scopes
            .read()
            .iter()
            .map(|(scope, cache)| (scope.clone(), cache.entries.read().len()))
            .collect()
    }
}
