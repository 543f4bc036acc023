//! # strata-sql
//!
//! SQL backend adapter for the Strata persistence layer. The adapter is
//! split along a narrow capability seam: [`SqlExecutor`] is the one trait
//! a driver must implement (execute a parameterized [`SqlStatement`],
//! answer with rows or write metadata), and everything above it is
//! generic in [`SqlDatasource`]: query translation, field mapping, and
//! the CRUD statements themselves.
//!
//! [`RusqliteExecutor`] is the batteries-included driver; production
//! deployments provide their own executor over whatever connection
//! machinery they already run.

pub mod context;
pub mod datasource;
pub mod executor;
pub mod sqlite;
pub mod statement;
pub mod table;

pub use context::SqlDataContext;
pub use datasource::{AdjustHook, DuplicateProbe, SqlDatasource};
pub use executor::{LazyExecutor, SqlExecutor, SqlOutcome};
pub use sqlite::RusqliteExecutor;
pub use statement::SqlStatement;
pub use table::{RelationshipSpec, TableSpec};
