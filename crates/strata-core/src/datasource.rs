//! The datasource protocol: the object-safe [`Datasource`] trait every
//! backend adapter implements, plus the save/inflate lifecycle engine
//! shipped as provided methods so all backends honor the same state
//! machine.

use crate::context::DataContext;
use crate::error::{Error, Result};
use crate::resource::{JsonApiData, Resource, ResourceVariant, VariantTable};
use downcast_rs::{impl_downcast, Downcast};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// The result of a fetch: a single resource for point queries, a list for
/// collection queries.
pub enum Fetched {
    One(Box<dyn Resource>),
    Collection(Vec<Box<dyn Resource>>),
}

impl Fetched {
    /// The single resource, or `CorruptData` when the fetch produced a
    /// collection.
    pub fn into_single(self) -> Result<Box<dyn Resource>> {
        match self {
            Fetched::One(r) => Ok(r),
            Fetched::Collection(_) => Err(Error::CorruptData(
                "Expected a single resource but the query produced a collection".to_string(),
            )),
        }
    }

    /// The resources as a list; a single result becomes a one-element list.
    pub fn into_collection(self) -> Vec<Box<dyn Resource>> {
        match self {
            Fetched::One(r) => vec![r],
            Fetched::Collection(rs) => rs,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Fetched::One(_) => 1,
            Fetched::Collection(rs) => rs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Fetched {
    /// Summary form: the id of the single resource, or the element count.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fetched::One(r) => f.debug_tuple("One").field(&r.id()).finish(),
            Fetched::Collection(rs) => f.debug_tuple("Collection").field(&rs.len()).finish(),
        }
    }
}

/// What a delete call targets: a bare id, or a resource that knows its id.
pub enum DeleteTarget<'a> {
    Id(&'a str),
    Resource(&'a dyn Resource),
}

impl<'a> DeleteTarget<'a> {
    /// The id to delete. A resource that was never saved has no id and
    /// cannot be deleted.
    pub fn id(&self) -> Result<&'a str> {
        match self {
            DeleteTarget::Id(id) => Ok(id),
            DeleteTarget::Resource(r) => r.id().ok_or_else(|| {
                Error::bad_input("Cannot delete a resource that has no id", Vec::new())
            }),
        }
    }
}

/// A source of resources of one JSON:API type.
///
/// Backends implement the required methods; the provided methods are the
/// lifecycle engine and should not normally be overridden (except
/// `get_related` for types the surrounding context cannot resolve, and
/// `validate_incoming` for server-side checks).
pub trait Datasource: Downcast + Send + Sync {
    /// The JSON:API type this datasource serves, e.g. `people`. Must be
    /// non-empty.
    fn resource_type(&self) -> &str;

    /// The variant strategy table used to materialize fetched rows.
    fn variants(&self) -> &VariantTable;

    /// Fetch by DSL query string. `None` or blank requests the full
    /// collection.
    fn get(&self, query: Option<&str>) -> Result<Fetched>;

    /// Look up the already-persisted duplicate of a not-yet-saved
    /// resource. Must return `Err(ResourceNotFound)` when there is none;
    /// any `Ok` is taken as a real duplicate.
    fn get_duplicate(&self, resource: &dyn Resource) -> Result<Box<dyn Resource>>;

    /// Persist a brand-new resource and assign its id.
    fn save_new(&self, resource: &mut dyn Resource) -> Result<()>;

    /// Persist the pending changes of an already-identified resource.
    fn save_existing(&self, resource: &mut dyn Resource) -> Result<()>;

    fn delete(&self, target: DeleteTarget<'_>) -> Result<()>;

    /// Which variant a raw row should materialize as.
    fn variant_for(&self, _row: &JsonApiData) -> ResourceVariant {
        ResourceVariant::Public
    }

    /// Server-side acceptance check run before any save. Default: accept.
    fn validate_incoming(&self, _resource: &dyn Resource) -> Result<()> {
        Ok(())
    }

    /// Build a fresh, unsaved resource of this datasource's type from
    /// optional user data, routed through the variant table so custom
    /// factories decide the concrete type.
    fn create(
        &self,
        data: Option<JsonApiData>,
        variant: ResourceVariant,
    ) -> Result<Box<dyn Resource>> {
        let mut d = data.unwrap_or_default();
        d.resource_type = self.resource_type().to_string();
        self.variants().create_incoming(variant, d)
    }

    /// Re-materialize a resource as another variant of the same type.
    fn convert(
        &self,
        resource: &dyn Resource,
        variant: ResourceVariant,
    ) -> Result<Box<dyn Resource>> {
        self.variants().create(variant, resource.to_json_api())
    }

    /// Save a resource, routing through the lifecycle state machine:
    /// validation errors block the save, an id means update, otherwise the
    /// duplicate gate decides between conflict and insert.
    fn save(&self, resource: &mut dyn Resource) -> Result<()> {
        self.validate_incoming(resource)?;
        if resource.has_errors() {
            return Err(Error::bad_input(
                format!(
                    "Cannot save a `{}` resource that has validation errors",
                    self.resource_type()
                ),
                resource.errors().to_vec(),
            ));
        }
        if resource.id().is_some() {
            debug!(
                resource_type = self.resource_type(),
                id = resource.id(),
                "Saving changes to existing resource"
            );
            return self.save_existing(resource);
        }
        match self.get_duplicate(resource) {
            Ok(duplicate) => Err(Error::duplicate(
                format!(
                    "A duplicate `{}` resource already exists",
                    self.resource_type()
                ),
                Some(duplicate.to_json_api()),
            )),
            Err(e) if e.is_not_found() => {
                debug!(resource_type = self.resource_type(), "Saving new resource");
                self.save_new(resource)
            }
            Err(e) => Err(e),
        }
    }

    /// Turn raw backend rows into resources. Point queries must produce
    /// exactly one row: zero is `ResourceNotFound`, more than one is
    /// corruption. Collection queries accept any count, including zero.
    fn inflate(&self, rows: Vec<JsonApiData>, requesting_collection: bool) -> Result<Fetched> {
        if !requesting_collection {
            if rows.is_empty() {
                return Err(Error::not_found(format!(
                    "No `{}` resource matched the given query",
                    self.resource_type()
                )));
            }
            if rows.len() > 1 {
                return Err(Error::CorruptData(format!(
                    "Multiple `{}` resources were found when exactly one was expected",
                    self.resource_type()
                )));
            }
        }
        let mut resources = Vec::with_capacity(rows.len());
        for row in rows {
            let variant = self.variant_for(&row);
            resources.push(self.variants().create(variant, row)?);
        }
        if requesting_collection {
            Ok(Fetched::Collection(resources))
        } else {
            // len checked above
            Ok(Fetched::One(resources.remove(0)))
        }
    }

    /// Fetch a single related resource by type and id through the
    /// surrounding context.
    fn get_related(
        &self,
        context: &dyn DataContext,
        resource_type: &str,
        id: &str,
    ) -> Result<Box<dyn Resource>> {
        let ds = context.datasource_for_type(resource_type).map_err(|e| match e {
            Error::UnknownDatasource(t) => Error::UnknownDatasource(format!(
                "Don't know how to fetch related resources of type `{t}`. Override \
                 `get_related` on the `{}` datasource to resolve them.",
                self.resource_type()
            )),
            other => other,
        })?;
        ds.get(Some(&format!("id={id}")))?.into_single()
    }

    /// Resolve every populated relationship of a raw row into fetched
    /// resources, keyed by relationship name.
    fn inflate_related(
        &self,
        context: &dyn DataContext,
        data: &JsonApiData,
    ) -> Result<HashMap<String, Fetched>> {
        use crate::resource::RelationshipData;
        let mut out = HashMap::new();
        for (name, rel) in &data.relationships {
            match &rel.data {
                None => {}
                Some(RelationshipData::One(ident)) => {
                    let r = self.get_related(context, &ident.resource_type, &ident.id)?;
                    out.insert(name.clone(), Fetched::One(r));
                }
                Some(RelationshipData::Many(idents)) => {
                    let mut rs = Vec::with_capacity(idents.len());
                    for ident in idents {
                        rs.push(self.get_related(context, &ident.resource_type, &ident.id)?);
                    }
                    out.insert(name.clone(), Fetched::Collection(rs));
                }
            }
        }
        Ok(out)
    }

    /// Bring a lazily-constructed resource up to date by re-fetching it by
    /// id. No-op when the resource is already initialized.
    fn initialize(&self, resource: &mut dyn Resource) -> Result<()> {
        if resource.is_initialized() {
            return Ok(());
        }
        let id = resource.id().ok_or_else(|| {
            Error::CorruptData(format!(
                "Cannot initialize a `{}` resource that has no id",
                self.resource_type()
            ))
        })?;
        let fetched = self.get(Some(&format!("id={id}")))?.into_single()?;
        resource.restore_from(fetched.to_json_api())
    }
}

impl_downcast!(Datasource);
