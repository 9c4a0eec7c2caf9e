//! Isolated containers for tests

use std::sync::Arc;
use tracing::debug;

use crate::chain::ProviderChain;
use crate::container::Container;
use crate::error::DiResult;
use crate::provider::Provider;

/// What a sandbox inherits from the container it is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxOptions {
    /// Carry over cached singletons
    pub keep_singletons: bool,
    /// Carry over scopes with their cached values
    pub keep_scopes: bool,
    /// Gather the cloned providers into one [`ProviderChain`]
    pub overridable: bool,
}

impl SandboxOptions {
    /// Start from a fresh, empty container
    pub fn empty() -> Option<SandboxOptions> {
        None
    }

    pub fn new(keep_singletons: bool, keep_scopes: bool) -> Self {
        Self {
            keep_singletons,
            keep_scopes,
            overridable: false,
        }
    }

    pub fn overridable(mut self) -> Self {
        self.overridable = true;
        self
    }
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl Container {
    /// Unfrozen container isolated from this one.
    ///
    /// `None` yields an empty container. Otherwise the sandbox is a
    /// [`Container::clone_container`]; when `overridable` is set its
    /// providers are wrapped into a single [`ProviderChain`], reachable with
    /// `sandbox.provider::<ProviderChain>()`, so tests can shadow any
    /// definition with `override_with`.
    pub fn sandbox(&self, options: Option<SandboxOptions>) -> DiResult<Container> {
        let options = match options {
            Some(options) => options,
            None => {
                debug!("Empty sandbox");
                return Ok(Container::new());
            }
        };

        let cloned = self.clone_container(options.keep_singletons, options.keep_scopes)?;
        if !options.overridable {
            return Ok(cloned);
        }

        let chained = cloned.providers();
        let count = chained.len();
        let chain: Arc<dyn Provider> = Arc::new(ProviderChain::from_providers(chained));
        let sandbox = cloned.with_providers(vec![chain]);
        debug!("Overridable sandbox with {} chained provider(s)", count);
        Ok(sandbox)
    }
}
