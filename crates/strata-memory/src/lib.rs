//! # strata-memory
//!
//! In-memory backend adapter for the Strata persistence layer: a
//! datasource over a shared vector of raw JSON:API rows. Useful as a test
//! double and for small fixture-backed deployments.
//!
//! Query support is deliberately thin: `id` lookups are exact, and every
//! other query returns the full collection for the caller to filter.
//! General predicate evaluation belongs to the SQL and REST backends.

use std::sync::{Arc, RwLock};
use strata_core::{
    generate_id, Datasource, DeleteTarget, DslQuery, Error, Fetched, JsonApiData, QuerySpec,
    Resource, Result, VariantTable,
};
use tracing::debug;

/// The shared row store. Clone the `Arc` to share one collection between
/// datasources and test assertions.
pub type MemoryStore = Arc<RwLock<Vec<JsonApiData>>>;

pub fn store_from(rows: Vec<JsonApiData>) -> MemoryStore {
    Arc::new(RwLock::new(rows))
}

pub struct MemoryDatasource {
    resource_type: String,
    store: MemoryStore,
    query_spec: Arc<QuerySpec>,
    variants: VariantTable,
}

impl MemoryDatasource {
    /// Panics when `resource_type` is empty.
    pub fn new(resource_type: impl Into<String>, store: MemoryStore) -> Self {
        let resource_type = resource_type.into();
        assert!(
            !resource_type.is_empty(),
            "Programmer: a memory datasource requires a non-empty resource type"
        );
        Self {
            resource_type,
            store,
            query_spec: QuerySpec::generic(),
            variants: VariantTable::generic(),
        }
    }

    pub fn with_query_spec(mut self, query_spec: Arc<QuerySpec>) -> Self {
        self.query_spec = query_spec;
        self
    }

    pub fn with_variants(mut self, variants: VariantTable) -> Self {
        self.variants = variants;
        self
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<JsonApiData>> {
        self.store.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<JsonApiData>> {
        self.store.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Datasource for MemoryDatasource {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn variants(&self) -> &VariantTable {
        &self.variants
    }

    fn get(&self, query: Option<&str>) -> Result<Fetched> {
        let q = DslQuery::parse(&self.query_spec, query)?;
        let rows: Vec<JsonApiData> = match q.get_id() {
            Some(id) => self
                .read()
                .iter()
                .filter(|r| r.id.as_deref() == Some(id))
                .cloned()
                .collect(),
            None => self.read().clone(),
        };
        self.inflate(rows, q.requesting_collection())
    }

    fn get_duplicate(&self, _resource: &dyn Resource) -> Result<Box<dyn Resource>> {
        Err(Error::not_found(format!(
            "`{}` rows carry no uniqueness constraint in memory",
            self.resource_type
        )))
    }

    fn save_new(&self, resource: &mut dyn Resource) -> Result<()> {
        let mut row = resource.to_json_api();
        let id = match row.id.clone() {
            Some(id) => id,
            None => {
                let id = generate_id();
                resource.set_id(id.clone())?;
                id
            }
        };
        row.id = Some(id);
        debug!(
            resource_type = %self.resource_type,
            id = row.id.as_deref(),
            "Appending row"
        );
        self.write().push(row.clone());
        resource.restore_from(row)
    }

    fn save_existing(&self, resource: &mut dyn Resource) -> Result<()> {
        let row = resource.to_json_api();
        let mut store = self.write();
        match store.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => *existing = row.clone(),
            // an identified row we never stored gets appended, so restores
            // from fixtures behave like inserts
            None => store.push(row.clone()),
        }
        drop(store);
        resource.restore_from(row)
    }

    fn delete(&self, target: DeleteTarget<'_>) -> Result<()> {
        let id = target.id()?;
        debug!(resource_type = %self.resource_type, id, "Removing row");
        self.write().retain(|r| r.id.as_deref() != Some(id));
        Ok(())
    }
}
