//! Dependency resolution runtime for Keystone
//!
//! A [`Container`] turns opaque [`DependencyKey`]s into values by asking its
//! registered [`Provider`]s in order. Results are cached according to the
//! [`Scope`] the provider declares: forever in the singleton cache, until
//! reset in a named scope, or not at all. Re-entrant resolution of a key
//! already being resolved on the same thread is reported as a cycle.
//!
//! Containers can be frozen once set up, and cloned or sandboxed for tests.

pub mod cache;
pub mod chain;
pub mod container;
pub mod error;
mod guard;
pub mod instance;
pub mod key;
pub mod lifecycle;
pub mod provider;
pub mod sandbox;
pub mod scope;

#[cfg(feature = "config")]
pub mod config;

pub use cache::SingletonMap;
pub use chain::ProviderChain;
pub use container::Container;
pub use error::{DiError, DiResult};
pub use instance::{same_value, DependencyInstance, DependencyValue, Injectable};
pub use key::{DependencyKey, KeyValue, TypeKey};
pub use lifecycle::NotFrozenGuard;
pub use provider::{clone_providers, DependencyDebug, Provider};
pub use sandbox::SandboxOptions;
pub use scope::Scope;

#[cfg(feature = "config")]
pub use config::{ConfigBuilder, ContainerConfig};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        Container, DependencyInstance, DependencyKey, DiError, DiResult, Injectable, Provider,
        ProviderChain, SandboxOptions, Scope, SingletonMap,
    };
}
