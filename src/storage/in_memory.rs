//! In-memory store, the default backing handle for record resources

use crate::core::capability::CapabilitySet;
use crate::core::error::StoreError;
use crate::core::identifier::{IdentifierKind, IdentifierValue, Key};
use crate::core::record::Record;
use crate::core::store::{Page, PageRequest, ResourceStore};
use anyhow::anyhow;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

type Records = IndexMap<String, Value>;

/// In-memory JSON record store
///
/// Records are kept in insertion order and keyed by the canonical form of
/// their identifier. Integer identifiers come from a sequence that starts at
/// 1; UUID and string identifiers are random v4 UUIDs. A record submitted
/// with its identifier field missing, `null`, `0`, `""` or the nil UUID gets
/// one assigned. Uses RwLock for thread-safe access.
#[derive(Clone)]
pub struct InMemoryStore {
    kind: IdentifierKind,
    id_field: String,
    capabilities: CapabilitySet,
    paged: bool,
    conform: Option<fn(Value) -> Result<Value, StoreError>>,
    records: Arc<RwLock<Records>>,
    sequence: Arc<AtomicI64>,
}

impl InMemoryStore {
    /// Create an empty store for identifiers of `kind` held in `id_field`
    pub fn new(kind: IdentifierKind, id_field: &str) -> Self {
        Self {
            kind,
            id_field: id_field.to_string(),
            capabilities: CapabilitySet::crud(),
            paged: false,
            conform: None,
            records: Arc::new(RwLock::new(IndexMap::new())),
            sequence: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Check every written record against the shape of `R`
    ///
    /// Records are round-tripped through `R`, so missing fields with serde
    /// defaults are filled in and unknown shapes are rejected.
    pub fn conforming_to<R: Record>(mut self) -> Self {
        self.conform = Some(conform::<R>);
        self
    }

    /// Serve `list` one page at a time
    pub fn with_paging(mut self) -> Self {
        self.paged = true;
        self
    }

    /// Restrict the advertised capabilities
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Records>, StoreError> {
        self.records
            .read()
            .map_err(|e| StoreError::Backend(anyhow!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Records>, StoreError> {
        self.records
            .write()
            .map_err(|e| StoreError::Backend(anyhow!("Failed to acquire write lock: {}", e)))
    }

    fn into_object(record: Value) -> Result<Map<String, Value>, StoreError> {
        match record {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::InvalidRecord {
                message: format!("expected a JSON object, got {}", json_type(&other)),
            }),
        }
    }

    /// Identifier carried by a submitted record, if it carries a real one
    fn submitted_id(&self, record: &Map<String, Value>) -> Result<Option<IdentifierValue>, StoreError> {
        let value = match record.get(&self.id_field) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(s)) if s.is_empty() => return Ok(None),
            Some(value) => value,
        };

        let id = self
            .kind
            .from_json(value)
            .ok_or_else(|| StoreError::InvalidRecord {
                message: format!("field '{}' is not a valid {} identifier", self.id_field, self.kind),
            })?;

        Ok((!id.is_placeholder()).then_some(id))
    }

    fn next_id(&self) -> Result<IdentifierValue, StoreError> {
        let value = match self.kind {
            IdentifierKind::Int64 => Value::from(self.advance()?),
            IdentifierKind::Int32 => {
                let next = i32::try_from(self.advance()?)
                    .map_err(|_| StoreError::Backend(anyhow!("identifier sequence exhausted")))?;
                Value::from(next)
            }
            IdentifierKind::Uuid | IdentifierKind::String => {
                Value::String(Uuid::new_v4().hyphenated().to_string())
            }
        };

        self.kind
            .from_json(&value)
            .ok_or_else(|| StoreError::Backend(anyhow!("generated identifier {} is invalid", value)))
    }

    fn advance(&self) -> Result<i64, StoreError> {
        self.sequence
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map(|previous| previous + 1)
            .map_err(|_| StoreError::Backend(anyhow!("identifier sequence exhausted")))
    }

    /// Keep the sequence ahead of client-chosen integer identifiers
    fn observe(&self, id: &IdentifierValue) {
        match id.key() {
            Key::Int64(n) => {
                self.sequence.fetch_max(*n, Ordering::SeqCst);
            }
            Key::Int32(n) => {
                self.sequence.fetch_max(i64::from(*n), Ordering::SeqCst);
            }
            _ => {}
        }
    }

    fn finish(&self, mut record: Map<String, Value>, id: &IdentifierValue) -> Result<Value, StoreError> {
        record.insert(self.id_field.clone(), id.to_json());
        let record = Value::Object(record);
        match self.conform {
            Some(conform) => conform(record),
            None => Ok(record),
        }
    }
}

fn conform<R: Record>(record: Value) -> Result<Value, StoreError> {
    let typed: R = serde_json::from_value(record).map_err(|e| StoreError::InvalidRecord {
        message: e.to_string(),
    })?;
    Ok(serde_json::to_value(typed)?)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    fn supports_paging(&self) -> bool {
        self.paged
    }

    async fn list(&self) -> Result<Vec<Value>, StoreError> {
        Ok(self.read()?.values().cloned().collect())
    }

    async fn list_page(&self, page: PageRequest) -> Result<Page, StoreError> {
        let records = self.read()?;
        let items = records
            .values()
            .skip(page.offset())
            .take(page.limit)
            .cloned()
            .collect();
        Ok(Page {
            items,
            total: records.len(),
        })
    }

    async fn find(&self, id: &IdentifierValue) -> Result<Option<Value>, StoreError> {
        Ok(self.read()?.get(&id.format()).cloned())
    }

    async fn create(&self, record: Value) -> Result<Value, StoreError> {
        let record = Self::into_object(record)?;
        let id = match self.submitted_id(&record)? {
            Some(id) => {
                if self.read()?.contains_key(&id.format()) {
                    return Err(StoreError::Conflict { id: id.format() });
                }
                self.observe(&id);
                id
            }
            None => self.next_id()?,
        };

        let stored = self.finish(record, &id)?;

        let mut records = self.write()?;
        if records.contains_key(&id.format()) {
            return Err(StoreError::Conflict { id: id.format() });
        }
        records.insert(id.format(), stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: &IdentifierValue, record: Value) -> Result<Option<Value>, StoreError> {
        let record = Self::into_object(record)?;
        let stored = self.finish(record, id)?;

        let mut records = self.write()?;
        match records.get_mut(&id.format()) {
            Some(slot) => {
                *slot = stored.clone();
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &IdentifierValue) -> Result<bool, StoreError> {
        Ok(self.write()?.shift_remove(&id.format()).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Note {
        #[serde(default)]
        id: i64,
        title: String,
        #[serde(default)]
        content: String,
    }

    impl Record for Note {
        type Id = i64;
    }

    fn notes() -> InMemoryStore {
        InMemoryStore::new(IdentifierKind::Int64, "id").conforming_to::<Note>()
    }

    fn int(raw: &str) -> IdentifierValue {
        IdentifierKind::Int64.parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let store = notes();
        let first = store.create(json!({"title": "a"})).await.unwrap();
        let second = store.create(json!({"id": 0, "title": "b"})).await.unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
        assert_eq!(first["content"], "");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_create_with_explicit_id_advances_sequence() {
        let store = notes();
        store.create(json!({"id": 10, "title": "a"})).await.unwrap();
        let next = store.create(json!({"title": "b"})).await.unwrap();
        assert_eq!(next["id"], 11);
    }

    #[tokio::test]
    async fn test_exhausted_sequence_is_an_error() {
        let store = notes();
        store
            .create(json!({"id": i64::MAX, "title": "last"}))
            .await
            .unwrap();

        let err = store.create(json!({"title": "one more"})).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(err.to_string().contains("exhausted"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_int32_sequence_stops_at_its_range() {
        let store = InMemoryStore::new(IdentifierKind::Int32, "id");
        store
            .create(json!({"id": i32::MAX, "title": "last"}))
            .await
            .unwrap();

        let err = store.create(json!({"title": "one more"})).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let store = notes();
        store.create(json!({"id": 3, "title": "a"})).await.unwrap();
        let err = store.create(json!({"id": 3, "title": "b"})).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { id } if id == "3"));
    }

    #[tokio::test]
    async fn test_create_rejects_wrong_shapes() {
        let store = notes();
        assert!(matches!(
            store.create(json!([1, 2])).await.unwrap_err(),
            StoreError::InvalidRecord { .. }
        ));
        assert!(matches!(
            store.create(json!({"id": "seven", "title": "a"})).await.unwrap_err(),
            StoreError::InvalidRecord { .. }
        ));
        assert!(matches!(
            store.create(json!({"content": "no title"})).await.unwrap_err(),
            StoreError::InvalidRecord { .. }
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_find_update_delete() {
        let store = notes();
        store.create(json!({"title": "a"})).await.unwrap();

        let found = store.find(&int("1")).await.unwrap().unwrap();
        assert_eq!(found["title"], "a");

        let updated = store
            .update(&int("1"), json!({"id": 99, "title": "b"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["id"], 1);
        assert_eq!(updated["title"], "b");

        assert!(store.update(&int("2"), json!({"title": "x"})).await.unwrap().is_none());

        assert!(store.delete(&int("1")).await.unwrap());
        assert!(!store.delete(&int("1")).await.unwrap());
        assert!(store.find(&int("1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uuid_and_string_ids_are_generated() {
        let store = InMemoryStore::new(IdentifierKind::Uuid, "id");
        let created = store.create(json!({"name": "x"})).await.unwrap();
        let raw = created["id"].as_str().unwrap();
        assert!(IdentifierKind::Uuid.parse(raw).is_ok());

        let store = InMemoryStore::new(IdentifierKind::String, "code");
        let created = store.create(json!({"code": "", "name": "x"})).await.unwrap();
        assert!(!created["code"].as_str().unwrap().is_empty());

        let kept = store.create(json!({"code": "eur"})).await.unwrap();
        assert_eq!(kept["code"], "eur");
    }

    #[tokio::test]
    async fn test_paging_keeps_insertion_order() {
        let store = notes().with_paging();
        assert!(store.supports_paging());
        for i in 0..5 {
            store.create(json!({"title": format!("n{}", i)})).await.unwrap();
        }

        let page = store.list_page(PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(page.total, 5);
        let titles: Vec<_> = page.items.iter().map(|n| n["title"].clone()).collect();
        assert_eq!(titles, vec![json!("n2"), json!("n3")]);

        let last = store.list_page(PageRequest::new(3, 2)).await.unwrap();
        assert_eq!(last.items.len(), 1);

        let beyond = store
            .list_page(PageRequest::new(usize::MAX, 100))
            .await
            .unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 5);
    }
}
