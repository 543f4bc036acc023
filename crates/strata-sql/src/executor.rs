use crate::statement::SqlStatement;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::sync::Arc;
use strata_core::{Error, Result};

/// What a statement produced: a row set for queries, or write metadata.
#[derive(Debug, Clone)]
pub enum SqlOutcome {
    Rows(Vec<serde_json::Map<String, Value>>),
    Write {
        rows_affected: u64,
        /// Driver-reported id of the inserted row, when the statement was
        /// an insert and the driver knows it.
        last_insert_id: Option<String>,
    },
}

impl SqlOutcome {
    /// The row set, or a backend error when the driver answered a row
    /// query with write metadata.
    pub fn into_rows(self) -> Result<Vec<serde_json::Map<String, Value>>> {
        match self {
            SqlOutcome::Rows(rows) => Ok(rows),
            SqlOutcome::Write { .. } => Err(Error::Backend(
                "Driver returned a write outcome for a row query".to_string(),
            )),
        }
    }

    pub fn last_insert_id(&self) -> Option<&str> {
        match self {
            SqlOutcome::Write { last_insert_id, .. } => last_insert_id.as_deref(),
            SqlOutcome::Rows(_) => None,
        }
    }
}

/// The single capability a SQL backend must provide. Driver errors are
/// translated to the core taxonomy inside the implementation; nothing
/// driver-specific crosses this boundary.
pub trait SqlExecutor: Send + Sync {
    fn execute(&self, statement: &SqlStatement) -> Result<SqlOutcome>;
}

/// A compute-once handle to a [`SqlExecutor`]: constructed either around a
/// ready executor or around a factory that connects on first use. Cheap to
/// clone; all clones share the realized executor.
#[derive(Clone)]
pub struct LazyExecutor {
    inner: Arc<LazyExecutorInner>,
}

struct LazyExecutorInner {
    cell: OnceCell<Arc<dyn SqlExecutor>>,
    factory: Option<Box<dyn Fn() -> Result<Arc<dyn SqlExecutor>> + Send + Sync>>,
}

impl LazyExecutor {
    /// Defer connection until the first statement executes.
    pub fn connecting<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn SqlExecutor>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(LazyExecutorInner {
                cell: OnceCell::new(),
                factory: Some(Box::new(factory)),
            }),
        }
    }

    /// Wrap an already-connected executor.
    pub fn ready(executor: Arc<dyn SqlExecutor>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(executor);
        Self {
            inner: Arc::new(LazyExecutorInner {
                cell,
                factory: None,
            }),
        }
    }

    /// The realized executor, connecting on first use.
    pub fn get(&self) -> Result<&Arc<dyn SqlExecutor>> {
        self.inner.cell.get_or_try_init(|| match &self.inner.factory {
            Some(factory) => factory(),
            None => Err(Error::Backend(
                "Lazy executor has neither a connection nor a factory".to_string(),
            )),
        })
    }

    /// Execute through the realized executor.
    pub fn execute(&self, statement: &SqlStatement) -> Result<SqlOutcome> {
        self.get()?.execute(statement)
    }
}
