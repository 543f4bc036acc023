use crate::executor::LazyExecutor;
use crate::statement::SqlStatement;
use crate::table::TableSpec;
use serde_json::Value;
use std::sync::Arc;
use strata_core::{
    generate_id, Datasource, DeleteTarget, DslQuery, Error, Fetched, QuerySpec, Resource, Result,
    VariantTable,
};

/// Builds the DSL filter that would find the already-persisted duplicate
/// of a not-yet-saved resource, or `None` when the resource has no
/// uniqueness constraint to check.
pub type DuplicateProbe = Box<dyn Fn(&dyn Resource) -> Option<String> + Send + Sync>;

/// Last-chance hook over the final write statement (tenant scoping,
/// soft-delete columns and the like).
pub type AdjustHook = Box<dyn Fn(&mut SqlStatement) + Send + Sync>;

/// A generic datasource over one SQL table, driven entirely by its
/// [`TableSpec`] and [`QuerySpec`].
pub struct SqlDatasource {
    resource_type: String,
    table: TableSpec,
    query_spec: Arc<QuerySpec>,
    variants: VariantTable,
    executor: LazyExecutor,
    duplicate_probe: Option<DuplicateProbe>,
    adjust: Option<AdjustHook>,
}

impl SqlDatasource {
    /// Panics when `resource_type` is empty; a datasource that does not
    /// know its type is a programming error, not a runtime condition.
    pub fn new(
        resource_type: impl Into<String>,
        table: TableSpec,
        query_spec: Arc<QuerySpec>,
        executor: LazyExecutor,
    ) -> Self {
        let resource_type = resource_type.into();
        assert!(
            !resource_type.is_empty(),
            "Programmer: a SQL datasource requires a non-empty resource type"
        );
        Self {
            resource_type,
            table,
            query_spec,
            variants: VariantTable::generic(),
            executor,
            duplicate_probe: None,
            adjust: None,
        }
    }

    pub fn with_variants(mut self, variants: VariantTable) -> Self {
        self.variants = variants;
        self
    }

    pub fn with_duplicate_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn(&dyn Resource) -> Option<String> + Send + Sync + 'static,
    {
        self.duplicate_probe = Some(Box::new(probe));
        self
    }

    pub fn with_adjust<F>(mut self, adjust: F) -> Self
    where
        F: Fn(&mut SqlStatement) + Send + Sync + 'static,
    {
        self.adjust = Some(Box::new(adjust));
        self
    }

    pub fn table(&self) -> &TableSpec {
        &self.table
    }

    fn execute_write(&self, mut stmt: SqlStatement) -> Result<crate::executor::SqlOutcome> {
        if let Some(adjust) = &self.adjust {
            adjust(&mut stmt);
        }
        self.executor.execute(&stmt)
    }
}

impl Datasource for SqlDatasource {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn variants(&self) -> &VariantTable {
        &self.variants
    }

    fn get(&self, query: Option<&str>) -> Result<Fetched> {
        let q = DslQuery::parse(&self.query_spec, query)?;
        let stmt = SqlStatement::new(format!("SELECT * FROM {}", self.table.address()))
            .with_where(q.where_clause())
            .with_params(q.params().into_iter().map(Value::String).collect());
        let rows = self.executor.execute(&stmt)?.into_rows()?;
        let rows = rows
            .into_iter()
            .map(|r| self.table.row_to_json_api(&self.resource_type, r))
            .collect();
        self.inflate(rows, q.requesting_collection())
    }

    fn get_duplicate(&self, resource: &dyn Resource) -> Result<Box<dyn Resource>> {
        let dsl = self
            .duplicate_probe
            .as_ref()
            .and_then(|probe| probe(resource));
        let dsl = match dsl {
            Some(dsl) => dsl,
            None => {
                return Err(Error::not_found(format!(
                    "`{}` resources carry no uniqueness constraint",
                    self.resource_type
                )))
            }
        };
        self.get(Some(&dsl))?
            .into_collection()
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::not_found(format!(
                    "No duplicate `{}` resource exists",
                    self.resource_type
                ))
            })
    }

    fn save_new(&self, resource: &mut dyn Resource) -> Result<()> {
        let mut row = resource.to_json_api();
        if self.table.generate_primary_key {
            let id = generate_id();
            // a resource refusing its own fresh id is corruption, not a
            // condition to paper over
            resource.set_id(id.clone())?;
            row.id = Some(id);
        }

        let mut columns = self.table.columns_for_write(&row)?;
        if let Some(id) = &row.id {
            columns.insert(0, (self.table.primary_key.clone(), Value::String(id.clone())));
        }
        let names = columns
            .iter()
            .map(|(c, _)| format!("`{c}`"))
            .collect::<Vec<_>>()
            .join(", ");
        let marks = vec!["?"; columns.len()].join(", ");
        let params = columns.into_iter().map(|(_, v)| v).collect();
        let stmt = SqlStatement::new(format!(
            "INSERT INTO {} ({names}) VALUES ({marks})",
            self.table.address()
        ))
        .with_params(params);

        let outcome = self.execute_write(stmt)?;
        if !self.table.generate_primary_key {
            let id = outcome
                .last_insert_id()
                .ok_or_else(|| {
                    Error::Backend(format!(
                        "Driver did not report an insert id for new `{}` resource",
                        self.resource_type
                    ))
                })?
                .to_string();
            resource.set_id(id.clone())?;
            row.id = Some(id);
        }
        resource.restore_from(row)
    }

    fn save_existing(&self, resource: &mut dyn Resource) -> Result<()> {
        let id = resource
            .id()
            .ok_or_else(|| Error::bad_input("Cannot update a resource that has no id", Vec::new()))?
            .to_string();
        let changes = resource.changes();
        let columns = self.table.columns_for_write(&changes)?;
        if columns.is_empty() {
            // nothing changed; skip the round trip entirely
            return Ok(());
        }

        let sets = columns
            .iter()
            .map(|(c, _)| format!("`{c}` = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut params: Vec<Value> = columns.into_iter().map(|(_, v)| v).collect();
        params.push(Value::String(id));
        let stmt = SqlStatement::new(format!("UPDATE {} SET {sets}", self.table.address()))
            .with_where(Some(format!("`{}` = ?", self.table.primary_key)))
            .with_params(params);

        self.execute_write(stmt)?;
        let data = resource.to_json_api();
        resource.restore_from(data)
    }

    fn delete(&self, target: DeleteTarget<'_>) -> Result<()> {
        let id = target.id()?;
        let stmt = SqlStatement::new(format!("DELETE FROM {}", self.table.address()))
            .with_where(Some(format!("`{}` = ?", self.table.primary_key)))
            .with_params(vec![Value::String(id.to_string())]);
        self.execute_write(stmt)?;
        Ok(())
    }
}
