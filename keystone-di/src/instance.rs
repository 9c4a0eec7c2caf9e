//! Resolved values and their caching policy

use downcast_rs::{impl_downcast, DowncastSync};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::scope::Scope;

/// Trait that all resolvable values implement
pub trait Injectable: DowncastSync {
    /// Get the concrete type name of the value
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl_downcast!(sync Injectable);

/// Blanket implementation for all suitable types
impl<T: Any + Send + Sync> Injectable for T {}

/// Shared handle to a resolved value
pub type DependencyValue = Arc<dyn Injectable>;

/// Whether two values are the same allocation
pub fn same_value(a: &DependencyValue, b: &DependencyValue) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Result of resolving a key: the value and how it may be cached
#[derive(Clone)]
pub struct DependencyInstance {
    pub value: DependencyValue,
    /// `None` means the value is recomputed on every access
    pub scope: Option<Scope>,
}

impl DependencyInstance {
    pub fn new(value: DependencyValue, scope: Option<Scope>) -> Self {
        Self { value, scope }
    }

    /// Value cached forever in the singleton cache
    pub fn singleton<T: Injectable>(value: T) -> Self {
        Self::new(Arc::new(value), Some(Scope::singleton()))
    }

    /// Value recomputed on every access
    pub fn transient<T: Injectable>(value: T) -> Self {
        Self::new(Arc::new(value), None)
    }

    /// Value cached until `scope` is reset
    pub fn scoped<T: Injectable>(value: T, scope: &Scope) -> Self {
        Self::new(Arc::new(value), Some(scope.clone()))
    }

    pub fn is_singleton(&self) -> bool {
        self.scope.as_ref().map_or(false, Scope::is_singleton)
    }

    /// Typed view of the value
    pub fn downcast<T: Injectable>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast_arc::<T>().ok()
    }
}

impl PartialEq for DependencyInstance {
    fn eq(&self, other: &Self) -> bool {
        same_value(&self.value, &other.value) && self.scope == other.scope
    }
}

impl fmt::Debug for DependencyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyInstance")
            .field("value", &(*self.value).type_name())
            .field("scope", &self.scope)
            .finish()
    }
}
