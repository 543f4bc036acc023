//! End-to-end lifecycle scenarios against a scripted in-process datasource:
//! the full save state machine, point-vs-collection fetch semantics, and
//! related-resource resolution through a context.

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use strata_core::{
    generate_id, DataContext, Datasource, DeleteTarget, DslQuery, Error, Fetched,
    GenericDataContext, GenericResource, JsonApiData, QuerySpec, Resource, ResourceVariant,
    Result, ValidationError, VariantTable,
};

/// A scripted datasource over a shared row vector, with email-uniqueness
/// duplicate detection and a write counter for no-op assertions.
struct PeopleSource {
    store: Arc<Mutex<Vec<JsonApiData>>>,
    spec: Arc<QuerySpec>,
    variants: VariantTable,
    writes: Arc<AtomicUsize>,
}

impl PeopleSource {
    fn new(store: Arc<Mutex<Vec<JsonApiData>>>, writes: Arc<AtomicUsize>) -> Self {
        Self {
            store,
            spec: QuerySpec::builder().field("name").field("email").build(),
            variants: VariantTable::generic(),
            writes,
        }
    }
}

impl Datasource for PeopleSource {
    fn resource_type(&self) -> &str {
        "people"
    }

    fn variants(&self) -> &VariantTable {
        &self.variants
    }

    fn get(&self, query: Option<&str>) -> Result<Fetched> {
        let q = DslQuery::parse(&self.spec, query)?;
        let store = self.store.lock().unwrap();
        let rows: Vec<JsonApiData> = match q.get_id() {
            Some(id) => store
                .iter()
                .filter(|r| r.id.as_deref() == Some(id))
                .cloned()
                .collect(),
            None => store.clone(),
        };
        drop(store);
        self.inflate(rows, q.requesting_collection())
    }

    fn get_duplicate(&self, resource: &dyn Resource) -> Result<Box<dyn Resource>> {
        let email = resource.to_json_api().attributes.get("email").cloned();
        let store = self.store.lock().unwrap();
        let hit = email
            .as_ref()
            .and_then(|e| store.iter().find(|r| r.attributes.get("email") == Some(e)))
            .cloned();
        drop(store);
        match hit {
            Some(row) => self.variants.create(ResourceVariant::Public, row),
            None => Err(Error::not_found("no duplicate")),
        }
    }

    fn save_new(&self, resource: &mut dyn Resource) -> Result<()> {
        let mut row = resource.to_json_api();
        row.id = Some(generate_id());
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.store.lock().unwrap().push(row.clone());
        resource.restore_from(row)
    }

    fn save_existing(&self, resource: &mut dyn Resource) -> Result<()> {
        let changes = resource.changes();
        if changes.attributes.is_empty() && changes.relationships.is_empty() {
            return Ok(());
        }
        let id = changes.id.clone();
        let mut store = self.store.lock().unwrap();
        let row = store
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found("no such person"))?;
        for (k, v) in changes.attributes {
            row.attributes.insert(k, v);
        }
        for (k, v) in changes.relationships {
            row.relationships.insert(k, v);
        }
        let merged = row.clone();
        drop(store);
        self.writes.fetch_add(1, Ordering::SeqCst);
        resource.restore_from(merged)
    }

    fn delete(&self, target: DeleteTarget<'_>) -> Result<()> {
        let id = target.id()?;
        self.store
            .lock()
            .unwrap()
            .retain(|r| r.id.as_deref() != Some(id));
        Ok(())
    }
}

struct Fixture {
    store: Arc<Mutex<Vec<JsonApiData>>>,
    writes: Arc<AtomicUsize>,
    ctx: GenericDataContext,
}

fn fixture(seed: Vec<JsonApiData>) -> Fixture {
    let store = Arc::new(Mutex::new(seed));
    let writes = Arc::new(AtomicUsize::new(0));
    let (s, w) = (Arc::clone(&store), Arc::clone(&writes));
    let ctx = GenericDataContext::new().register("people", move || {
        Ok(Arc::new(PeopleSource::new(Arc::clone(&s), Arc::clone(&w))) as Arc<dyn Datasource>)
    });
    Fixture { store, writes, ctx }
}

fn person(id: &str, name: &str, email: &str) -> JsonApiData {
    JsonApiData::new("people")
        .with_id(id)
        .with_attribute("name", json!(name))
        .with_attribute("email", json!(email))
}

#[test]
fn test_saving_a_new_resource_inserts_and_assigns_an_id() {
    let f = fixture(vec![]);
    let ds = f.ctx.datasource_for_type("people").unwrap();

    let mut r = ds
        .create(
            Some(
                JsonApiData::new("people")
                    .with_attribute("name", json!("Kael"))
                    .with_attribute("email", json!("kael@example.com")),
            ),
            ResourceVariant::Public,
        )
        .unwrap();
    ds.save(r.as_mut()).unwrap();

    let id = r.id().expect("id must be assigned").to_string();
    assert_eq!(id.len(), 32);
    assert!(r.is_initialized());
    assert!(!r.has_changes());
    assert_eq!(f.store.lock().unwrap().len(), 1);
    assert_eq!(f.writes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_saving_a_duplicate_is_rejected_with_the_existing_resource() {
    let f = fixture(vec![person("77", "Old Kael", "kael@example.com")]);
    let ds = f.ctx.datasource_for_type("people").unwrap();

    let mut r = ds
        .create(
            Some(JsonApiData::new("people").with_attribute("email", json!("kael@example.com"))),
            ResourceVariant::Public,
        )
        .unwrap();
    let err = ds.save(r.as_mut()).expect_err("must be a duplicate");
    match err {
        Error::DuplicateResource { duplicate, .. } => {
            assert_eq!(duplicate.unwrap().id.as_deref(), Some("77"));
        }
        other => panic!("expected DuplicateResource, got {other:?}"),
    }
    assert_eq!(f.writes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_saving_with_validation_errors_never_reaches_the_backend() {
    let f = fixture(vec![]);
    let ds = f.ctx.datasource_for_type("people").unwrap();

    let mut r = GenericResource::new("people");
    r.add_error(ValidationError::new("email", "is required"));
    let err = ds.save(&mut r).expect_err("must be bad input");
    match err {
        Error::BadInput { errors, .. } => {
            assert_eq!(errors[0].title, "email");
        }
        other => panic!("expected BadInput, got {other:?}"),
    }
    assert_eq!(f.writes.load(Ordering::SeqCst), 0);
    assert!(f.store.lock().unwrap().is_empty());
}

#[test]
fn test_updating_writes_only_the_changed_fields() {
    let f = fixture(vec![person("5", "Kael", "kael@example.com")]);
    let ds = f.ctx.datasource_for_type("people").unwrap();

    let fetched = ds.get(Some("id=5")).unwrap().into_single().unwrap();
    let mut r = fetched
        .downcast::<GenericResource>()
        .unwrap_or_else(|_| panic!("expected a GenericResource"));
    r.set_attribute("name", json!("Kael the Second"));
    ds.save(r.as_mut()).unwrap();

    let store = f.store.lock().unwrap();
    assert_eq!(store[0].attributes["name"], json!("Kael the Second"));
    // untouched fields survive the partial update
    assert_eq!(store[0].attributes["email"], json!("kael@example.com"));
    drop(store);
    assert!(!r.has_changes());
    assert_eq!(f.writes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_saving_an_unchanged_resource_is_a_no_op() {
    let f = fixture(vec![person("5", "Kael", "kael@example.com")]);
    let ds = f.ctx.datasource_for_type("people").unwrap();

    let mut r = ds.get(Some("id=5")).unwrap().into_single().unwrap();
    ds.save(r.as_mut()).unwrap();
    assert_eq!(f.writes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_point_fetch_miss_and_corrupt_multi_row() {
    let f = fixture(vec![]);
    let ds = f.ctx.datasource_for_type("people").unwrap();
    assert!(ds.get(Some("id=missing")).expect_err("miss").is_not_found());

    // Two rows under the same id is storage corruption, not a collection.
    f.store.lock().unwrap().extend(vec![
        person("5", "A", "a@example.com"),
        person("5", "B", "b@example.com"),
    ]);
    let err = ds.get(Some("id=5")).expect_err("must be corrupt");
    assert!(matches!(err, Error::CorruptData(_)));
}

#[test]
fn test_collection_fetch_returns_everything() {
    let f = fixture(vec![
        person("1", "A", "a@example.com"),
        person("2", "B", "b@example.com"),
    ]);
    let ds = f.ctx.datasource_for_type("people").unwrap();
    let all = ds.get(None).unwrap().into_collection();
    assert_eq!(all.len(), 2);
    let empty = ds.get(Some("name=nobody")).unwrap();
    assert!(matches!(empty, Fetched::Collection(_)));
}

#[test]
fn test_delete_by_id_and_by_resource() {
    let f = fixture(vec![
        person("1", "A", "a@example.com"),
        person("2", "B", "b@example.com"),
    ]);
    let ds = f.ctx.datasource_for_type("people").unwrap();

    ds.delete(DeleteTarget::Id("1")).unwrap();
    assert_eq!(f.store.lock().unwrap().len(), 1);

    let r = ds.get(Some("id=2")).unwrap().into_single().unwrap();
    ds.delete(DeleteTarget::Resource(r.as_ref())).unwrap();
    assert!(f.store.lock().unwrap().is_empty());

    let unsaved = GenericResource::new("people");
    assert!(matches!(
        ds.delete(DeleteTarget::Resource(&unsaved)),
        Err(Error::BadInput { .. })
    ));
}

#[test]
fn test_get_related_resolves_through_the_context() {
    let f = fixture(vec![person("9", "Friend", "friend@example.com")]);
    let ds = f.ctx.datasource_for_type("people").unwrap();

    let related = ds.get_related(&f.ctx, "people", "9").unwrap();
    assert_eq!(related.id(), Some("9"));

    let err = ds
        .get_related(&f.ctx, "addresses", "1")
        .err()
        .expect("unknown related type");
    match err {
        Error::UnknownDatasource(msg) => {
            assert!(msg.contains("Override `get_related`"));
        }
        other => panic!("expected UnknownDatasource, got {other:?}"),
    }
}

#[test]
fn test_initialize_refreshes_a_shell_resource() {
    let f = fixture(vec![person("5", "Kael", "kael@example.com")]);
    let ds = f.ctx.datasource_for_type("people").unwrap();

    let mut shell = GenericResource::new("people");
    shell.set_id("5".to_string()).unwrap();
    ds.initialize(&mut shell).unwrap();
    assert!(shell.is_initialized());
    assert_eq!(shell.attribute("name"), Some(&json!("Kael")));
}
