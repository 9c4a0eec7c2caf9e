//! Error types for the resolution container

use crate::key::DependencyKey;
use thiserror::Error;

/// Result type alias for container operations
pub type DiResult<T> = Result<T, DiError>;

/// Errors that can occur while registering or resolving dependencies
#[derive(Error, Debug)]
pub enum DiError {
    /// No cache entry and no provider matched the key
    #[error("Dependency not found: {key}")]
    NotFound { key: DependencyKey },

    /// The key is already defined as a singleton or claimed by a provider
    #[error("Duplicate dependency {key}: {existing}")]
    DuplicateDependency {
        key: DependencyKey,
        /// Description of the existing definition
        existing: String,
    },

    /// Re-entrant resolution of a key already being resolved on this thread
    #[error("Dependency cycle detected: {}", format_chain(.chain))]
    DependencyCycle { chain: Vec<DependencyKey> },

    /// A provider failed while computing a dependency
    #[error("Failed to instantiate {key} (resolving {}): {source}", format_chain(.path))]
    Instantiation {
        /// Innermost key whose provider failed
        key: DependencyKey,
        /// Resolution path, outermost request first
        path: Vec<DependencyKey>,
        #[source]
        source: Box<DiError>,
    },

    /// Mutation attempted on a frozen container
    #[error("Container is frozen: cannot {operation}")]
    FrozenWorld { operation: &'static str },

    /// A provider broke its contract (duplicate kind, shared clone state)
    #[error("Provider contract violation by {provider}: {reason}")]
    ProviderContract {
        provider: &'static str,
        reason: String,
    },

    /// A scope with this name was already created
    #[error("Scope already exists: {name}")]
    DuplicateScope { name: String },

    /// Empty or reserved scope name
    #[error("Invalid scope name: {name:?}")]
    InvalidScopeName { name: String },

    /// The scope was not created by this container
    #[error("Unknown scope: {name}")]
    UnknownScope { name: String },

    /// The resolved value does not have the requested type
    #[error("Dependency {key} is a {found}, not a {expected}")]
    TypeMismatch {
        key: DependencyKey,
        expected: &'static str,
        found: &'static str,
    },

    /// Error raised by provider code
    #[error("Provider error: {0}")]
    Provider(#[from] anyhow::Error),

    /// Configuration error
    #[cfg(feature = "config")]
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DiError {
    /// Innermost key responsible for the failure, if the error carries one
    pub fn failing_key(&self) -> Option<&DependencyKey> {
        match self {
            DiError::NotFound { key }
            | DiError::DuplicateDependency { key, .. }
            | DiError::Instantiation { key, .. }
            | DiError::TypeMismatch { key, .. } => Some(key),
            DiError::DependencyCycle { chain } => chain.last(),
            _ => None,
        }
    }

    /// Wrap a provider failure for `key`.
    ///
    /// Cycle errors pass through untouched. Nested instantiation errors keep
    /// their innermost key and get `key` prepended to their path.
    pub(crate) fn instantiating(key: &DependencyKey, error: DiError) -> DiError {
        match error {
            cycle @ DiError::DependencyCycle { .. } => cycle,
            DiError::Instantiation {
                key: inner,
                mut path,
                source,
            } => {
                if path.first() != Some(key) {
                    path.insert(0, key.clone());
                }
                DiError::Instantiation {
                    key: inner,
                    path,
                    source,
                }
            }
            other => DiError::Instantiation {
                key: key.clone(),
                path: vec![key.clone()],
                source: Box::new(other),
            },
        }
    }
}

fn format_chain(chain: &[DependencyKey]) -> String {
    chain
        .iter()
        .map(|key| key.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
