//! Reentrancy guard for cycle detection.
//!
//! Each thread keeps the stack of keys it is currently resolving, tagged with
//! the container resolving them. Nested `get` calls on the same thread push
//! onto the same stack, so a key showing up twice for one container is a
//! cycle.

use std::cell::RefCell;

use crate::error::{DiError, DiResult};
use crate::key::DependencyKey;

thread_local! {
    static RESOLVING: RefCell<Vec<(u64, DependencyKey)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a key as being resolved until dropped
pub(crate) struct ResolutionGuard {
    depth: usize,
}

impl ResolutionGuard {
    /// Push `key` onto this thread's stack, failing if it is already there
    pub(crate) fn enter(container_id: u64, key: &DependencyKey) -> DiResult<Self> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(start) = stack
                .iter()
                .position(|(id, visiting)| *id == container_id && visiting == key)
            {
                let mut chain: Vec<DependencyKey> = stack[start..]
                    .iter()
                    .filter(|(id, _)| *id == container_id)
                    .map(|(_, visiting)| visiting.clone())
                    .collect();
                chain.push(key.clone());
                return Err(DiError::DependencyCycle { chain });
            }

            stack.push((container_id, key.clone()));
            Ok(Self { depth: stack.len() })
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        // `try_with` as the thread-local may already be gone during thread teardown
        let _ = RESOLVING.try_with(|stack| {
            stack.borrow_mut().truncate(self.depth - 1);
        });
    }
}

#[cfg(test)]
pub(crate) fn depth() -> usize {
    RESOLVING.with(|stack| stack.borrow().len())
}
