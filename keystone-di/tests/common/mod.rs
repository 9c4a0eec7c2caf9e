//! Providers shared by the integration tests

#![allow(dead_code)]

use keystone_di::prelude::*;
use keystone_di::DependencyDebug;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

type Factory = Arc<dyn Fn(&Container) -> DiResult<DependencyInstance> + Send + Sync>;

/// Maps keys to closures producing instances
#[derive(Default)]
pub struct FactoryProvider {
    factories: Mutex<FxHashMap<DependencyKey, Factory>>,
}

impl FactoryProvider {
    pub fn define<F>(&self, key: impl Into<DependencyKey>, factory: F)
    where
        F: Fn(&Container) -> DiResult<DependencyInstance> + Send + Sync + 'static,
    {
        self.factories.lock().insert(key.into(), Arc::new(factory));
    }

    /// Define `key` as the value of `build`, cached in `scope`
    pub fn value<T, F>(&self, key: impl Into<DependencyKey>, scope: Option<Scope>, build: F)
    where
        T: Injectable,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.define(key, move |_| {
            Ok(DependencyInstance::new(Arc::new(build()), scope.clone()))
        });
    }

    fn copy(&self) -> Self {
        Self {
            factories: Mutex::new(self.factories.lock().clone()),
        }
    }
}

impl Provider for FactoryProvider {
    fn maybe_provide(
        &self,
        key: &DependencyKey,
        container: &Container,
    ) -> DiResult<Option<DependencyInstance>> {
        // Release the lock before running user code that may recurse
        let factory = self.factories.lock().get(key).cloned();
        factory.map(|factory| factory(container)).transpose()
    }

    fn exists(&self, key: &DependencyKey) -> bool {
        self.factories.lock().contains_key(key)
    }

    fn clone_provider(&self, _keep_singletons_cache: bool) -> DiResult<Arc<dyn Provider>> {
        Ok(Arc::new(self.copy()))
    }

    fn debug(&self, key: &DependencyKey) -> Option<DependencyDebug> {
        self.exists(key)
            .then(|| DependencyDebug::new(format!("factory for {}", key)))
    }
}

/// Second provider kind, so provider order can be observed
#[derive(Default)]
pub struct OtherFactoryProvider(pub FactoryProvider);

impl Provider for OtherFactoryProvider {
    fn maybe_provide(
        &self,
        key: &DependencyKey,
        container: &Container,
    ) -> DiResult<Option<DependencyInstance>> {
        self.0.maybe_provide(key, container)
    }

    fn exists(&self, key: &DependencyKey) -> bool {
        self.0.exists(key)
    }

    fn clone_provider(&self, _keep_singletons_cache: bool) -> DiResult<Arc<dyn Provider>> {
        Ok(Arc::new(OtherFactoryProvider(self.0.copy())))
    }
}

/// Provider memoizing its own values, dropped on clone unless asked
#[derive(Default)]
pub struct MemoProvider {
    pub memo: Mutex<FxHashMap<DependencyKey, i32>>,
}

impl Provider for MemoProvider {
    fn maybe_provide(
        &self,
        key: &DependencyKey,
        _container: &Container,
    ) -> DiResult<Option<DependencyInstance>> {
        Ok(self
            .memo
            .lock()
            .get(key)
            .map(|value| DependencyInstance::transient(*value)))
    }

    fn exists(&self, key: &DependencyKey) -> bool {
        self.memo.lock().contains_key(key)
    }

    fn clone_provider(&self, keep_singletons_cache: bool) -> DiResult<Arc<dyn Provider>> {
        let memo = if keep_singletons_cache {
            self.memo.lock().clone()
        } else {
            FxHashMap::default()
        };
        Ok(Arc::new(MemoProvider {
            memo: Mutex::new(memo),
        }))
    }
}
