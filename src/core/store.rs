//! Store traits: the capability-tagged handle the dispatcher talks to
//!
//! [`ResourceStore`] is the object-safe, JSON-level interface every backing
//! handle is reduced to. Hosts either implement it directly or implement the
//! typed [`Repository`] trait and let [`RepositoryStore`] adapt it.

use crate::core::capability::{Capability, CapabilitySet};
use crate::core::error::StoreError;
use crate::core::identifier::{IdentifierKind, IdentifierValue};
use crate::core::record::Record;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// A page request (pages start at 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    /// Number of records to skip; saturates for pages far past the end
    pub fn offset(&self) -> usize {
        self.page.max(1).saturating_sub(1).saturating_mul(self.limit)
    }
}

/// One page of records plus the total number of records in the store
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub total: usize,
}

/// Capability-tagged, type-erased store handle
///
/// Every operation has a default that reports [`StoreError::Unsupported`],
/// so a store only implements what its [`capabilities`](Self::capabilities)
/// advertise.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Operations this store can perform
    fn capabilities(&self) -> CapabilitySet;

    /// Whether [`list_page`](Self::list_page) is implemented
    fn supports_paging(&self) -> bool {
        false
    }

    /// Every record in the store
    async fn list(&self) -> Result<Vec<Value>, StoreError> {
        Err(StoreError::Unsupported(Capability::List))
    }

    /// One page of records
    async fn list_page(&self, _page: PageRequest) -> Result<Page, StoreError> {
        Err(StoreError::Unsupported(Capability::List))
    }

    /// The record with this identifier, if any
    async fn find(&self, _id: &IdentifierValue) -> Result<Option<Value>, StoreError> {
        Err(StoreError::Unsupported(Capability::GetOne))
    }

    /// Store a new record and return it as stored (with its identifier)
    async fn create(&self, _record: Value) -> Result<Value, StoreError> {
        Err(StoreError::Unsupported(Capability::Create))
    }

    /// Replace an existing record; `None` if the identifier is unknown
    async fn update(
        &self,
        _id: &IdentifierValue,
        _record: Value,
    ) -> Result<Option<Value>, StoreError> {
        Err(StoreError::Unsupported(Capability::Update))
    }

    /// Remove a record; `false` if the identifier is unknown
    async fn delete(&self, _id: &IdentifierValue) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported(Capability::Delete))
    }
}

/// Typed repository over one record type
///
/// Implementations provide persistence for a specific record type. Errors are
/// `anyhow` errors; returning a [`StoreError`] inside them (e.g.
/// `StoreError::Conflict`) keeps its meaning across the adapter.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Element type of the repository
    type Record: Record;

    /// Operations this repository supports (full CRUD by default)
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::crud()
    }

    /// Whether [`find_page`](Self::find_page) is implemented
    fn supports_paging(&self) -> bool {
        false
    }

    /// All records
    async fn find_all(&self) -> Result<Vec<Self::Record>>;

    /// One page of records and the total count
    async fn find_page(&self, _page: PageRequest) -> Result<(Vec<Self::Record>, usize)> {
        Err(StoreError::Unsupported(Capability::List).into())
    }

    /// Record by identifier
    async fn find_by_id(
        &self,
        id: &<Self::Record as Record>::Id,
    ) -> Result<Option<Self::Record>>;

    /// Insert or replace a record, assigning an identifier if needed
    async fn save(&self, record: Self::Record) -> Result<Self::Record>;

    /// Delete by identifier; `false` if nothing was deleted
    async fn delete_by_id(&self, id: &<Self::Record as Record>::Id) -> Result<bool>;
}

/// Adapts a [`Repository`] to the JSON-level [`ResourceStore`]
pub struct RepositoryStore<P: Repository> {
    repository: Arc<P>,
    _record: PhantomData<fn() -> P::Record>,
}

impl<P: Repository> RepositoryStore<P> {
    pub fn new(repository: Arc<P>) -> Self {
        Self {
            repository,
            _record: PhantomData,
        }
    }

    fn decode(record: Value) -> Result<P::Record, StoreError> {
        serde_json::from_value(record).map_err(|e| StoreError::InvalidRecord {
            message: e.to_string(),
        })
    }

    fn encode(record: P::Record) -> Result<Value, StoreError> {
        Ok(serde_json::to_value(record)?)
    }

    /// Identifier a submitted record already carries, if it is a real one
    fn assigned_id(record: &Value) -> Option<IdentifierValue> {
        let kind = IdentifierKind::of::<<P::Record as Record>::Id>()?;
        let id = kind.from_json(record.get(<P::Record as Record>::id_field())?)?;
        (!id.is_placeholder()).then_some(id)
    }

    fn key(id: &IdentifierValue) -> Result<<P::Record as Record>::Id, StoreError> {
        Ok(serde_json::from_value(id.to_json())?)
    }
}

/// Recover a [`StoreError`] carried inside an `anyhow::Error`
fn classify(error: anyhow::Error) -> StoreError {
    match error.downcast::<StoreError>() {
        Ok(store_error) => store_error,
        Err(other) => StoreError::Backend(other),
    }
}

#[async_trait]
impl<P: Repository> ResourceStore for RepositoryStore<P> {
    fn capabilities(&self) -> CapabilitySet {
        self.repository.capabilities()
    }

    fn supports_paging(&self) -> bool {
        self.repository.supports_paging()
    }

    async fn list(&self) -> Result<Vec<Value>, StoreError> {
        let records = self.repository.find_all().await.map_err(classify)?;
        records.into_iter().map(Self::encode).collect()
    }

    async fn list_page(&self, page: PageRequest) -> Result<Page, StoreError> {
        let (records, total) = self.repository.find_page(page).await.map_err(classify)?;
        let items = records
            .into_iter()
            .map(Self::encode)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page { items, total })
    }

    async fn find(&self, id: &IdentifierValue) -> Result<Option<Value>, StoreError> {
        let key = Self::key(id)?;
        self.repository
            .find_by_id(&key)
            .await
            .map_err(classify)?
            .map(Self::encode)
            .transpose()
    }

    async fn create(&self, record: Value) -> Result<Value, StoreError> {
        // `save` replaces; create must not
        if let Some(id) = Self::assigned_id(&record) {
            let existing = self.repository.find_by_id(&Self::key(&id)?).await.map_err(classify)?;
            if existing.is_some() {
                return Err(StoreError::Conflict { id: id.format() });
            }
        }
        let record = Self::decode(record)?;
        let saved = self.repository.save(record).await.map_err(classify)?;
        Self::encode(saved)
    }

    async fn update(&self, id: &IdentifierValue, record: Value) -> Result<Option<Value>, StoreError> {
        let key = Self::key(id)?;
        if self
            .repository
            .find_by_id(&key)
            .await
            .map_err(classify)?
            .is_none()
        {
            return Ok(None);
        }
        let record = Self::decode(record)?;
        let saved = self.repository.save(record).await.map_err(classify)?;
        Self::encode(saved).map(Some)
    }

    async fn delete(&self, id: &IdentifierValue) -> Result<bool, StoreError> {
        let key = Self::key(id)?;
        self.repository.delete_by_id(&key).await.map_err(classify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Book {
        #[serde(default)]
        id: i64,
        title: String,
    }

    impl Record for Book {
        type Id = i64;
    }

    #[derive(Default)]
    struct BookRepository {
        books: Mutex<BTreeMap<i64, Book>>,
    }

    #[async_trait]
    impl Repository for BookRepository {
        type Record = Book;

        async fn find_all(&self) -> Result<Vec<Book>> {
            Ok(self.books.lock().unwrap().values().cloned().collect())
        }

        async fn find_by_id(&self, id: &i64) -> Result<Option<Book>> {
            Ok(self.books.lock().unwrap().get(id).cloned())
        }

        async fn save(&self, mut book: Book) -> Result<Book> {
            let mut books = self.books.lock().unwrap();
            if book.title.is_empty() {
                return Err(StoreError::Conflict { id: "empty".into() }.into());
            }
            if book.id == 0 {
                book.id = books.keys().max().copied().unwrap_or(0) + 1;
            }
            books.insert(book.id, book.clone());
            Ok(book)
        }

        async fn delete_by_id(&self, id: &i64) -> Result<bool> {
            Ok(self.books.lock().unwrap().remove(id).is_some())
        }
    }

    fn store() -> RepositoryStore<BookRepository> {
        RepositoryStore::new(Arc::new(BookRepository::default()))
    }

    #[tokio::test]
    async fn test_adapter_create_and_find() {
        let store = store();
        let created = store
            .create(serde_json::json!({"title": "Dune"}))
            .await
            .unwrap();
        assert_eq!(created["id"], 1);

        let id = IdentifierKind::Int64.parse("1").unwrap();
        let found = store.find(&id).await.unwrap().unwrap();
        assert_eq!(found["title"], "Dune");
    }

    #[tokio::test]
    async fn test_adapter_update_missing_returns_none() {
        let store = store();
        let id = IdentifierKind::Int64.parse("5").unwrap();
        let result = store
            .update(&id, serde_json::json!({"id": 5, "title": "Ghost"}))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adapter_rejects_bad_shape() {
        let err = store()
            .create(serde_json::json!({"title": 12}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { .. }));
    }

    #[tokio::test]
    async fn test_adapter_keeps_store_error_meaning() {
        let err = store()
            .create(serde_json::json!({"title": ""}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_adapter_create_never_replaces() {
        let store = store();
        store
            .create(serde_json::json!({"title": "Dune"}))
            .await
            .unwrap();

        let err = store
            .create(serde_json::json!({"id": 1, "title": "Emma"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { id } if id == "1"));

        let id = IdentifierKind::Int64.parse("1").unwrap();
        let kept = store.find(&id).await.unwrap().unwrap();
        assert_eq!(kept["title"], "Dune");

        let created = store
            .create(serde_json::json!({"id": 0, "title": "Emma"}))
            .await
            .unwrap();
        assert_eq!(created["id"], 2);
    }

    #[tokio::test]
    async fn test_adapter_paging_unsupported_by_default() {
        let store = store();
        assert!(!store.supports_paging());
        let err = store.list_page(PageRequest::new(1, 10)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(Capability::List)));
    }

    #[test]
    fn test_page_request_offset() {
        assert_eq!(PageRequest::new(1, 20).offset(), 0);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
        assert_eq!(PageRequest::new(0, 0), PageRequest::new(1, 1));
        assert_eq!(PageRequest::new(usize::MAX, 100).offset(), usize::MAX);
    }
}
