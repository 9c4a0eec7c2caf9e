//! Frozen/mutable lifecycle of a container

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::debug;

use crate::error::{DiError, DiResult};

/// One-way frozen flag.
///
/// Mutations hold a read guard for their whole duration, so `freeze` (which
/// takes the write lock) waits for in-flight registrations to finish and
/// none can start after it.
#[derive(Default)]
pub struct FreezeState {
    frozen: RwLock<bool>,
}

/// Proof that the container was not frozen when the guard was taken. The
/// container cannot be frozen while the guard lives.
pub struct NotFrozenGuard<'a> {
    _guard: RwLockReadGuard<'a, bool>,
}

impl FreezeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_frozen(&self) -> bool {
        *self.frozen.read()
    }

    /// Freeze, returning `true` if this call performed the transition
    pub fn freeze(&self) -> bool {
        let mut frozen = self.frozen.write();
        if *frozen {
            return false;
        }
        *frozen = true;
        debug!("Frozen");
        true
    }

    /// Guard mutation of whatever this state protects
    pub fn ensure_not_frozen(&self, operation: &'static str) -> DiResult<NotFrozenGuard<'_>> {
        let guard = self.frozen.read_recursive();
        if *guard {
            return Err(DiError::FrozenWorld { operation });
        }
        Ok(NotFrozenGuard { _guard: guard })
    }
}
