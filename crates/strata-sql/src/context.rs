use crate::executor::LazyExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::{DataContext, Datasource, GenericDataContext, Result};

/// A data context over one or more named SQL connections. Executors are
/// registered up front; datasource factories grab their executor handle at
/// registration time and the shared registry caches each datasource on
/// first resolution.
pub struct SqlDataContext {
    executors: HashMap<String, LazyExecutor>,
    inner: GenericDataContext,
}

impl SqlDataContext {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
            inner: GenericDataContext::new(),
        }
    }

    pub fn with_executor(mut self, name: impl Into<String>, executor: LazyExecutor) -> Self {
        self.executors.insert(name.into(), executor);
        self
    }

    /// Look up a named executor. Asking for an unregistered name is a
    /// wiring mistake and panics.
    pub fn executor(&self, name: &str) -> LazyExecutor {
        self.executors.get(name).cloned().unwrap_or_else(|| {
            panic!("Programmer: no SQL executor named `{name}` is registered on this context")
        })
    }

    pub fn register<F>(mut self, json_api_type: &str, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Datasource>> + Send + Sync + 'static,
    {
        self.inner = self.inner.register(json_api_type, factory);
        self
    }
}

impl Default for SqlDataContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DataContext for SqlDataContext {
    fn datasource_for_type(&self, json_api_type: &str) -> Result<Arc<dyn Datasource>> {
        self.inner.datasource_for_type(json_api_type)
    }
}
