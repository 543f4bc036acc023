use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_core::{Error, JsonApiData, Relationship, ResourceIdentifier, Result};

/// A to-one relationship stored as a foreign-key column. The column name
/// defaults to `<name>Id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipSpec {
    pub name: String,
    pub resource_type: String,
    pub column: String,
}

impl RelationshipSpec {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let name = name.into();
        let column = format!("{name}Id");
        Self {
            name,
            resource_type: resource_type.into(),
            column,
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_true() -> bool {
    true
}

/// How one JSON:API type maps onto a SQL table: the table address, the
/// primary key, attribute renames and exclusions, and which columns carry
/// relationships.
///
/// Attributes pass through under their own name unless a `fields` entry
/// renames them (`Some(column)`) or excludes them from storage (`None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    pub table: String,
    #[serde(default)]
    pub db: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// When true the application generates string primary keys; when false
    /// the database assigns them and the driver reports the insert id.
    #[serde(default = "default_true")]
    pub generate_primary_key: bool,
    #[serde(default)]
    pub fields: Vec<(String, Option<String>)>,
    #[serde(default)]
    pub relationships: Vec<RelationshipSpec>,
}

impl TableSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            db: None,
            primary_key: default_primary_key(),
            generate_primary_key: true,
            fields: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn with_db(mut self, db: impl Into<String>) -> Self {
        self.db = Some(db.into());
        self
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn db_generated_primary_key(mut self) -> Self {
        self.generate_primary_key = false;
        self
    }

    /// Store attribute `logical` in column `physical`.
    pub fn field_as(mut self, logical: impl Into<String>, physical: impl Into<String>) -> Self {
        self.fields.push((logical.into(), Some(physical.into())));
        self
    }

    /// Never store attribute `logical` (computed or virtual fields).
    pub fn skip_field(mut self, logical: impl Into<String>) -> Self {
        self.fields.push((logical.into(), None));
        self
    }

    pub fn relationship(mut self, rel: RelationshipSpec) -> Self {
        self.relationships.push(rel);
        self
    }

    /// The backtick-escaped table address, db-qualified when configured.
    pub fn address(&self) -> String {
        match &self.db {
            Some(db) => format!("`{db}`.`{}`", self.table),
            None => format!("`{}`", self.table),
        }
    }

    fn mapping(&self, logical: &str) -> Option<&Option<String>> {
        self.fields.iter().find(|(l, _)| l == logical).map(|(_, p)| p)
    }

    /// Re-nest a raw storage row into JSON:API shape: primary key becomes
    /// `id`, relationship columns become relationship objects, everything
    /// else becomes an attribute under its logical name.
    pub fn row_to_json_api(
        &self,
        resource_type: &str,
        mut raw: serde_json::Map<String, Value>,
    ) -> JsonApiData {
        let mut data = JsonApiData::new(resource_type);
        if let Some(id) = raw.remove(&self.primary_key) {
            data.id = coerce_id(id);
        }
        for rel in &self.relationships {
            if let Some(v) = raw.remove(&rel.column) {
                let target = coerce_id(v)
                    .map(|id| ResourceIdentifier::new(rel.resource_type.clone(), id));
                data.relationships
                    .insert(rel.name.clone(), Relationship::to_one(target));
            }
        }
        for (column, value) in raw {
            let logical = self
                .fields
                .iter()
                .find(|(_, p)| p.as_deref() == Some(column.as_str()))
                .map(|(l, _)| l.clone())
                .unwrap_or(column);
            data.attributes.insert(logical, value);
        }
        data
    }

    /// Flatten JSON:API data into `(column, value)` pairs for an insert or
    /// update. Excluded fields are dropped; to-many relationships have no
    /// column representation and are rejected.
    pub fn columns_for_write(&self, data: &JsonApiData) -> Result<Vec<(String, Value)>> {
        let mut out = Vec::new();
        for (logical, value) in &data.attributes {
            match self.mapping(logical) {
                Some(None) => {}
                Some(Some(physical)) => out.push((physical.clone(), value.clone())),
                None => out.push((logical.clone(), value.clone())),
            }
        }
        for (name, rel) in &data.relationships {
            let spec = self
                .relationships
                .iter()
                .find(|r| &r.name == name)
                .ok_or_else(|| {
                    Error::bad_input(
                        format!(
                            "Unknown relationship `{name}` for table `{}`",
                            self.table
                        ),
                        Vec::new(),
                    )
                })?;
            let value = match &rel.data {
                None => Value::Null,
                Some(strata_core::RelationshipData::One(ident)) => {
                    Value::String(ident.id.clone())
                }
                Some(strata_core::RelationshipData::Many(_)) => {
                    return Err(Error::bad_input(
                        format!(
                            "Relationship `{name}` is to-many and cannot be stored as a \
                             column on `{}`",
                            self.table
                        ),
                        Vec::new(),
                    ))
                }
            };
            out.push((spec.column.clone(), value));
        }
        Ok(out)
    }
}

fn coerce_id(v: Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
