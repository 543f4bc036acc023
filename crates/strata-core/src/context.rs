//! Data contexts: the registry layer that resolves JSON:API type names to
//! datasources, instantiating each one lazily and exactly once.

use crate::datasource::Datasource;
use crate::error::{Error, Result};
use crate::resource::{JsonApiData, Resource, ResourceVariant};
use downcast_rs::{impl_downcast, Downcast};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Convert a dash-case JSON:API type name to the camelCase datasource
/// name, e.g. `payment-methods` to `paymentMethods`.
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, segment) in name.split('-').enumerate() {
        if i == 0 {
            out.push_str(segment);
            continue;
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// A family of datasources sharing one backend. Consumers address
/// datasources by JSON:API type; the context owns instantiation, caching,
/// and the public error vocabulary (`UnknownResourceType` rather than the
/// internal `UnknownDatasource`).
pub trait DataContext: Downcast + Send + Sync {
    /// Resolve the datasource serving a JSON:API type (dash-case accepted).
    fn datasource_for_type(&self, json_api_type: &str) -> Result<Arc<dyn Datasource>>;

    /// Build a fresh, unsaved resource of the given type in its public
    /// variant.
    fn new_resource(
        &self,
        data: Option<JsonApiData>,
        resource_type: &str,
    ) -> Result<Box<dyn Resource>> {
        let ds = self
            .datasource_for_type(resource_type)
            .map_err(to_public_error)?;
        ds.create(data, ResourceVariant::Public)
    }

    /// Re-materialize a resource as another variant via its datasource.
    fn convert_resource(
        &self,
        resource: &dyn Resource,
        variant: ResourceVariant,
    ) -> Result<Box<dyn Resource>> {
        let ds = self
            .datasource_for_type(resource.resource_type())
            .map_err(to_public_error)?;
        ds.convert(resource, variant)
    }
}

impl_downcast!(DataContext);

fn to_public_error(e: Error) -> Error {
    match e {
        Error::UnknownDatasource(name) => Error::UnknownResourceType(name),
        other => other,
    }
}

/// Compute-once cache of instantiated datasources, shared by every context
/// implementation. Thread-safe; the builder runs at most once per name for
/// callers that serialize on the write lock.
pub struct DatasourceRegistry {
    cache: RwLock<HashMap<String, Arc<dyn Datasource>>>,
}

impl DatasourceRegistry {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the cached datasource for `name`, building and caching it on
    /// first use.
    pub fn get_or_build<F>(&self, name: &str, build: F) -> Result<Arc<dyn Datasource>>
    where
        F: FnOnce() -> Result<Arc<dyn Datasource>>,
    {
        // Poisoned locks only mean a panicking builder on another thread;
        // the map itself is still coherent.
        if let Some(ds) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Ok(Arc::clone(ds));
        }
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if let Some(ds) = cache.get(name) {
            return Ok(Arc::clone(ds));
        }
        debug!(datasource = name, "Instantiating datasource");
        let ds = build()?;
        cache.insert(name.to_string(), Arc::clone(&ds));
        Ok(ds)
    }
}

impl Default for DatasourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory producing a datasource on first resolution.
pub type DatasourceFactory = Box<dyn Fn() -> Result<Arc<dyn Datasource>> + Send + Sync>;

/// A context driven by an explicit registration table: each datasource
/// name maps to the factory that builds it. The backend-specific contexts
/// follow the same shape with their own construction state folded in.
pub struct GenericDataContext {
    registry: DatasourceRegistry,
    factories: HashMap<String, DatasourceFactory>,
}

impl GenericDataContext {
    pub fn new() -> Self {
        Self {
            registry: DatasourceRegistry::new(),
            factories: HashMap::new(),
        }
    }

    /// Register a datasource factory under a JSON:API type name
    /// (dash-case accepted).
    pub fn register<F>(mut self, json_api_type: &str, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Datasource>> + Send + Sync + 'static,
    {
        self.factories
            .insert(camel_case(json_api_type), Box::new(factory));
        self
    }
}

impl Default for GenericDataContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DataContext for GenericDataContext {
    fn datasource_for_type(&self, json_api_type: &str) -> Result<Arc<dyn Datasource>> {
        let name = camel_case(json_api_type);
        let factory = self
            .factories
            .get(&name)
            .ok_or_else(|| Error::UnknownDatasource(json_api_type.to_string()))?;
        self.registry.get_or_build(&name, || factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{DeleteTarget, Fetched};
    use crate::resource::VariantTable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullSource {
        variants: VariantTable,
    }

    impl NullSource {
        fn new() -> Self {
            Self {
                variants: VariantTable::generic(),
            }
        }
    }

    impl Datasource for NullSource {
        fn resource_type(&self) -> &str {
            "payment-methods"
        }

        fn variants(&self) -> &VariantTable {
            &self.variants
        }

        fn get(&self, _query: Option<&str>) -> Result<Fetched> {
            Ok(Fetched::Collection(Vec::new()))
        }

        fn get_duplicate(&self, _resource: &dyn Resource) -> Result<Box<dyn Resource>> {
            Err(Error::not_found("no duplicate"))
        }

        fn save_new(&self, _resource: &mut dyn Resource) -> Result<()> {
            Ok(())
        }

        fn save_existing(&self, _resource: &mut dyn Resource) -> Result<()> {
            Ok(())
        }

        fn delete(&self, _target: DeleteTarget<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("people"), "people");
        assert_eq!(camel_case("payment-methods"), "paymentMethods");
        assert_eq!(camel_case("a-b-c"), "aBC");
        assert_eq!(camel_case(""), "");
    }

    #[test]
    fn test_registry_builds_each_datasource_once() {
        static BUILDS: AtomicUsize = AtomicUsize::new(0);
        let ctx = GenericDataContext::new().register("payment-methods", || {
            BUILDS.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NullSource::new()) as Arc<dyn Datasource>)
        });
        // Dash-case and camelCase resolve to the same cached instance.
        let a = ctx.datasource_for_type("payment-methods").unwrap();
        let b = ctx.datasource_for_type("paymentMethods").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_type_is_public_facing_through_new_resource() {
        let ctx = GenericDataContext::new();
        let err = ctx
            .datasource_for_type("orders")
            .err()
            .expect("must be unknown");
        assert!(matches!(err, Error::UnknownDatasource(_)));

        let err = ctx
            .new_resource(None, "orders")
            .err()
            .expect("must be unknown");
        assert!(matches!(err, Error::UnknownResourceType(_)));
    }

    #[test]
    fn test_new_resource_takes_the_datasource_type() {
        let ctx = GenericDataContext::new().register("payment-methods", || {
            Ok(Arc::new(NullSource::new()) as Arc<dyn Datasource>)
        });
        let r = ctx.new_resource(None, "payment-methods").unwrap();
        assert_eq!(r.resource_type(), "payment-methods");
        assert_eq!(r.id(), None);
    }
}
