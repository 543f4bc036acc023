//! The JSON:API resource model: raw data shapes, the [`Resource`] contract
//! datasources program against, and the default [`GenericResource`]
//! implementation with changeset tracking.

use crate::error::{Error, Result, ValidationError};
use downcast_rs::{impl_downcast, Downcast};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

/// Generate an application-side primary key: 32 lowercase hex characters
/// of random UUID.
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A `{type, id}` pair referencing another resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

impl ResourceIdentifier {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

/// The linkage payload of a relationship: a single identifier or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    One(ResourceIdentifier),
    Many(Vec<ResourceIdentifier>),
}

/// A JSON:API relationship object, `{"data": <linkage>}`. `data: null`
/// models an emptied to-one relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub data: Option<RelationshipData>,
}

impl Relationship {
    pub fn to_one(target: Option<ResourceIdentifier>) -> Self {
        Self {
            data: target.map(RelationshipData::One),
        }
    }

    pub fn to_many(targets: Vec<ResourceIdentifier>) -> Self {
        Self {
            data: Some(RelationshipData::Many(targets)),
        }
    }

    /// The single target identifier, when this is a populated to-one.
    pub fn one(&self) -> Option<&ResourceIdentifier> {
        match &self.data {
            Some(RelationshipData::One(ident)) => Some(ident),
            _ => None,
        }
    }
}

/// The raw JSON:API resource shape used at every backend boundary: rows
/// coming out of storage, wire payloads, and changesets all use this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JsonApiData {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Relationship>,
}

impl JsonApiData {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_relationship(mut self, name: impl Into<String>, rel: Relationship) -> Self {
        self.relationships.insert(name.into(), rel);
        self
    }
}

/// A row handed to a resource factory. Take-once: the factory must
/// consume the row via [`take`](StagedRow::take); the inflate path
/// verifies consumption afterwards and reports leftover data as
/// corruption.
#[derive(Debug)]
pub struct StagedRow {
    row: Option<JsonApiData>,
    fetched: bool,
}

impl StagedRow {
    /// Stage a row fetched from storage. Factories build it clean and
    /// initialized.
    pub fn new(row: JsonApiData) -> Self {
        Self {
            row: Some(row),
            fetched: true,
        }
    }

    /// Stage user-supplied data for a brand-new resource. Factories treat
    /// the contents as pending changes.
    pub fn incoming(row: JsonApiData) -> Self {
        Self {
            row: Some(row),
            fetched: false,
        }
    }

    /// True when the row came out of storage rather than from user input.
    pub fn is_fetched(&self) -> bool {
        self.fetched
    }

    /// Consume the staged row. Fails if it was already taken.
    pub fn take(&mut self) -> Result<JsonApiData> {
        self.row.take().ok_or_else(|| {
            Error::CorruptData("Staged row was already consumed by another factory".to_string())
        })
    }

    /// Inspect the row without consuming it (variant selection).
    pub fn peek(&self) -> Option<&JsonApiData> {
        self.row.as_ref()
    }

    pub fn is_consumed(&self) -> bool {
        self.row.is_none()
    }
}

/// The contract every persistable resource object honors. Backends only
/// ever see `dyn Resource`; concrete types are recovered through
/// [`Downcast`] at the application boundary.
pub trait Resource: Downcast + Send + Sync {
    fn resource_type(&self) -> &str;

    fn id(&self) -> Option<&str>;

    /// Assign the storage-generated id. Reassigning a different id to an
    /// already-identified resource is data corruption.
    fn set_id(&mut self, id: String) -> Result<()>;

    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    /// Field-level validation failures accumulated by the resource.
    fn errors(&self) -> &[ValidationError];

    /// The changed subset of this resource (same type and id, only the
    /// attributes and relationships touched since the last clean point).
    fn changes(&self) -> JsonApiData;

    fn has_changes(&self) -> bool;

    /// Full current state as raw JSON:API data.
    fn to_json_api(&self) -> JsonApiData;

    /// Replace state wholesale from freshly-fetched data and mark the
    /// resource clean and initialized.
    fn restore_from(&mut self, data: JsonApiData) -> Result<()>;

    /// False until the resource has been through a fetch or restore.
    fn is_initialized(&self) -> bool;
}

impl_downcast!(Resource);

/// Default [`Resource`] implementation: raw data plus changeset tracking
/// and validation-error accumulation. Domain crates embed or wrap this
/// rather than reimplementing the bookkeeping.
#[derive(Debug, Clone)]
pub struct GenericResource {
    data: JsonApiData,
    changed_attributes: BTreeSet<String>,
    changed_relationships: BTreeSet<String>,
    errors: Vec<ValidationError>,
    initialized: bool,
}

impl GenericResource {
    /// A blank, uninitialized resource of the given type.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            data: JsonApiData::new(resource_type),
            changed_attributes: BTreeSet::new(),
            changed_relationships: BTreeSet::new(),
            errors: Vec::new(),
            initialized: false,
        }
    }

    /// Build from user-supplied data. Every provided attribute and
    /// relationship counts as a pending change, so a subsequent save
    /// writes all of it.
    pub fn from_data(data: JsonApiData) -> Self {
        let changed_attributes = data.attributes.keys().cloned().collect();
        let changed_relationships = data.relationships.keys().cloned().collect();
        Self {
            data,
            changed_attributes,
            changed_relationships,
            errors: Vec::new(),
            initialized: false,
        }
    }

    /// Build from a staged row, consuming it. A fetched row starts clean
    /// and initialized; incoming user data counts entirely as pending
    /// changes.
    pub fn from_staged(staged: &mut StagedRow) -> Result<Self> {
        let fetched = staged.is_fetched();
        let data = staged.take()?;
        if !fetched {
            return Ok(Self::from_data(data));
        }
        Ok(Self {
            data,
            changed_attributes: BTreeSet::new(),
            changed_relationships: BTreeSet::new(),
            errors: Vec::new(),
            initialized: true,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.data.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: serde_json::Value) {
        let name = name.into();
        if self.data.attributes.get(&name) != Some(&value) {
            self.changed_attributes.insert(name.clone());
            self.data.attributes.insert(name, value);
        }
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.data.relationships.get(name)
    }

    pub fn set_relationship(&mut self, name: impl Into<String>, rel: Relationship) {
        let name = name.into();
        if self.data.relationships.get(&name) != Some(&rel) {
            self.changed_relationships.insert(name.clone());
            self.data.relationships.insert(name, rel);
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Forget pending changes without touching the data (post-save).
    pub fn mark_clean(&mut self) {
        self.changed_attributes.clear();
        self.changed_relationships.clear();
    }
}

impl Resource for GenericResource {
    fn resource_type(&self) -> &str {
        &self.data.resource_type
    }

    fn id(&self) -> Option<&str> {
        self.data.id.as_deref()
    }

    fn set_id(&mut self, id: String) -> Result<()> {
        match &self.data.id {
            Some(existing) if *existing != id => Err(Error::CorruptData(format!(
                "Refusing to overwrite id `{existing}` with `{id}` on a `{}` resource",
                self.data.resource_type
            ))),
            _ => {
                self.data.id = Some(id);
                Ok(())
            }
        }
    }

    fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    fn changes(&self) -> JsonApiData {
        let mut out = JsonApiData::new(self.data.resource_type.clone());
        out.id = self.data.id.clone();
        for name in &self.changed_attributes {
            if let Some(v) = self.data.attributes.get(name) {
                out.attributes.insert(name.clone(), v.clone());
            }
        }
        for name in &self.changed_relationships {
            if let Some(r) = self.data.relationships.get(name) {
                out.relationships.insert(name.clone(), r.clone());
            }
        }
        out
    }

    fn has_changes(&self) -> bool {
        !self.changed_attributes.is_empty() || !self.changed_relationships.is_empty()
    }

    fn to_json_api(&self) -> JsonApiData {
        self.data.clone()
    }

    fn restore_from(&mut self, data: JsonApiData) -> Result<()> {
        if data.resource_type != self.data.resource_type {
            return Err(Error::CorruptData(format!(
                "Cannot restore a `{}` resource from `{}` data",
                self.data.resource_type, data.resource_type
            )));
        }
        self.data = data;
        self.mark_clean();
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Which face of a resource a datasource materializes. Private variants
/// carry internal-only fields; public ones are safe to hand outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceVariant {
    Public,
    Private,
}

/// Factory producing a concrete resource from a staged storage row.
pub type ResourceFactory = Box<dyn Fn(&mut StagedRow) -> Result<Box<dyn Resource>> + Send + Sync>;

/// Variant-keyed strategy table mapping each [`ResourceVariant`] a
/// datasource serves to the factory that builds it. Registration happens
/// at datasource construction; asking for an unregistered variant is a
/// programmer error and panics.
pub struct VariantTable {
    factories: HashMap<ResourceVariant, ResourceFactory>,
}

impl VariantTable {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A table serving [`GenericResource`] for both variants.
    pub fn generic() -> Self {
        Self::new()
            .register(ResourceVariant::Public, |staged| {
                Ok(Box::new(GenericResource::from_staged(staged)?) as Box<dyn Resource>)
            })
            .register(ResourceVariant::Private, |staged| {
                Ok(Box::new(GenericResource::from_staged(staged)?) as Box<dyn Resource>)
            })
    }

    pub fn register<F>(mut self, variant: ResourceVariant, factory: F) -> Self
    where
        F: Fn(&mut StagedRow) -> Result<Box<dyn Resource>> + Send + Sync + 'static,
    {
        self.factories.insert(variant, Box::new(factory));
        self
    }

    pub fn supports(&self, variant: ResourceVariant) -> bool {
        self.factories.contains_key(&variant)
    }

    /// Run the factory for `variant` over a fetched storage row, verifying
    /// that the factory actually consumed it.
    pub fn create(&self, variant: ResourceVariant, row: JsonApiData) -> Result<Box<dyn Resource>> {
        self.run(variant, StagedRow::new(row))
    }

    /// Build a brand-new resource of `variant` from user-supplied data;
    /// every provided field becomes a pending change.
    pub fn create_incoming(
        &self,
        variant: ResourceVariant,
        data: JsonApiData,
    ) -> Result<Box<dyn Resource>> {
        self.run(variant, StagedRow::incoming(data))
    }

    fn run(&self, variant: ResourceVariant, mut staged: StagedRow) -> Result<Box<dyn Resource>> {
        let factory = self.factories.get(&variant).unwrap_or_else(|| {
            panic!("Programmer: no resource factory registered for variant {variant:?}")
        });
        let resource = factory(&mut staged)?;
        if !staged.is_consumed() {
            return Err(Error::CorruptData(
                "Resource factory left staged row data unconsumed".to_string(),
            ));
        }
        Ok(resource)
    }
}

impl Default for VariantTable {
    fn default() -> Self {
        Self::generic()
    }
}
