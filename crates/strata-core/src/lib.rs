//! # strata-core
//!
//! Core abstractions for the Strata persistence layer: a resource-oriented
//! CRUD interface over heterogeneous storage backends, addressed through a
//! small filter DSL.
//!
//! The crate provides:
//!
//! - [`query`]: the DSL parser and its SQL/canonical-string translators,
//!   driven by per-datasource [`QuerySpec`] registration tables
//! - [`resource`]: the JSON:API resource model ([`JsonApiData`], the
//!   [`Resource`] contract, changeset-tracking [`GenericResource`])
//! - [`datasource`]: the backend protocol and the save/inflate lifecycle
//!   engine shared by every adapter
//! - [`context`]: datasource registries with lazy, cached instantiation
//! - [`error`]: the unified error taxonomy
//!
//! Backend adapters live in sibling crates (`strata-sql`, `strata-rest`,
//! `strata-memory`) and implement [`Datasource`] plus a matching
//! [`DataContext`].

pub mod context;
pub mod datasource;
pub mod error;
pub mod query;
pub mod resource;

pub use context::{camel_case, DataContext, DatasourceFactory, DatasourceRegistry, GenericDataContext};
pub use datasource::{Datasource, DeleteTarget, Fetched};
pub use error::{Error, Result, ValidationError};
pub use query::{Comparison, DslQuery, LogicalOp, QuerySpec, QuerySpecBuilder, Value};
pub use resource::{
    generate_id, GenericResource, JsonApiData, Relationship, RelationshipData, Resource,
    ResourceFactory, ResourceIdentifier, ResourceVariant, StagedRow, VariantTable,
};
