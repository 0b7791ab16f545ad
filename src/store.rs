//! Album Store
//!
//! Owns the catalog's albums. Every parameterized or mutating call is checked
//! against the registry's request contract before the collection is touched.
//!
//! The collection only ever grows: there is no update or delete, and ids are
//! taken from the caller as-is.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{CatalogError, Result};
use crate::record::{Album, AlbumQuery};
use crate::registry::SchemaRegistry;
use crate::schema::Direction;

/// Operation names the store validates against
pub mod operations {
    pub const LIST: &str = "list";
    pub const CREATE: &str = "create";
    pub const GET_BY_ID: &str = "get_by_id";
    pub const GET_BY_ANY_FIELD: &str = "get_by_any_field";
}

/// Store behaviour switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Also check returned albums against the response contracts
    pub validate_responses: bool,
}

/// In-memory album collection
#[derive(Debug)]
pub struct AlbumStore {
    registry: Arc<SchemaRegistry>,
    albums: RwLock<Vec<Album>>,
    options: StoreOptions,
}

impl AlbumStore {
    /// Create an empty store
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self::with_options(registry, StoreOptions::default())
    }

    pub fn with_options(registry: Arc<SchemaRegistry>, options: StoreOptions) -> Self {
        Self {
            registry,
            albums: RwLock::new(Vec::new()),
            options,
        }
    }

    /// Create a store holding `albums` without validating them
    pub fn with_albums(
        registry: Arc<SchemaRegistry>,
        options: StoreOptions,
        albums: Vec<Album>,
    ) -> Self {
        Self {
            registry,
            albums: RwLock::new(albums),
            options,
        }
    }

    /// Create a store and run every payload through [`AlbumStore::create`]
    pub fn seeded(
        registry: Arc<SchemaRegistry>,
        options: StoreOptions,
        payloads: impl IntoIterator<Item = Value>,
    ) -> Result<Self> {
        let store = Self::with_options(registry, options);
        for payload in payloads {
            store.create(&payload)?;
        }
        info!(albums = store.len(), "Seeded album store");
        Ok(store)
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Number of albums held
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// All albums in insertion order
    pub fn list(&self) -> Result<Vec<Album>> {
        let albums = self.read().clone();
        for album in &albums {
            self.check_response(operations::LIST, album)?;
        }
        Ok(albums)
    }

    /// Validate `payload` and append the album it describes.
    ///
    /// Nothing is stored when validation fails. Ids already present are not
    /// rejected.
    pub fn create(&self, payload: &Value) -> Result<Album> {
        self.check_request(operations::CREATE, payload)?;

        let album = Album::from_payload(payload).map_err(|violations| CatalogError::Validation {
            operation: operations::CREATE.to_string(),
            direction: Direction::Request,
            violations,
        })?;
        self.check_response(operations::CREATE, &album)?;

        let mut albums = self.write();
        if albums.iter().any(|existing| existing.id == album.id) {
            warn!(id = %album.id, "Appending album with an id already in the catalog");
        }
        albums.push(album.clone());
        info!(id = %album.id, title = %album.title, albums = albums.len(), "Created album");

        Ok(album)
    }

    /// Find the album with exactly this id
    pub fn get_by_id(&self, id: &str) -> Result<Album> {
        self.check_request(operations::GET_BY_ID, &json!({ "id": id }))?;

        let found = self.read().iter().find(|album| album.id == id).cloned();
        let album = found.ok_or_else(|| CatalogError::NotFound {
            query: format!("id={}", id),
        })?;

        self.check_response(operations::GET_BY_ID, &album)?;
        Ok(album)
    }

    /// First album, in insertion order, where ANY supplied query field matches
    pub fn get_by_any_field(&self, query: &AlbumQuery) -> Result<Album> {
        self.check_request(operations::GET_BY_ANY_FIELD, &query.to_payload())?;

        let found = self.read().iter().find(|album| query.matches(album)).cloned();
        let album = found.ok_or_else(|| CatalogError::NotFound {
            query: query.to_string(),
        })?;

        self.check_response(operations::GET_BY_ANY_FIELD, &album)?;
        Ok(album)
    }

    fn check_request(&self, operation: &str, payload: &Value) -> Result<()> {
        self.check(operation, Direction::Request, payload)
    }

    fn check_response(&self, operation: &str, album: &Album) -> Result<()> {
        if !self.options.validate_responses {
            return Ok(());
        }
        self.check(operation, Direction::Response, &album.to_value()?)
    }

    fn check(&self, operation: &str, direction: Direction, payload: &Value) -> Result<()> {
        let violations = self.registry.validate(operation, direction, payload)?;
        if violations.is_empty() {
            return Ok(());
        }
        debug!(
            operation,
            direction = %direction,
            violations = violations.len(),
            "Rejected payload"
        );
        Err(CatalogError::Validation {
            operation: operation.to_string(),
            direction,
            violations,
        })
    }

    // The collection is append-only, so a writer that panicked mid-push
    // still leaves a usable vector behind.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Album>> {
        self.albums.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Album>> {
        self.albums.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ContractSource;
    use crate::validation::ViolationReason;

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::builtin().unwrap())
    }

    fn clouds() -> Album {
        Album::new("1", "Clouds", "NF", 56.99)
    }

    fn inline_registry(doc: &str) -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::load(ContractSource::Json(doc.to_string())).unwrap())
    }

    fn clouds_store() -> AlbumStore {
        AlbumStore::with_albums(registry(), StoreOptions::default(), vec![clouds()])
    }

    #[test]
    fn test_create_appends_in_order() {
        let store = clouds_store();
        let created = store
            .create(&json!({
                "id": "2", "title": "Jeru", "artist": "Gerry Mulligan", "price": 17.99
            }))
            .unwrap();

        assert_eq!(created, Album::new("2", "Jeru", "Gerry Mulligan", 17.99));
        let ids: Vec<_> = store.list().unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_invalid_create_leaves_store_untouched() {
        let store = clouds_store();
        let before = store.list().unwrap();

        let err = store
            .create(&json!({ "id": "5", "title": "Cheap", "artist": "X", "price": -3 }))
            .unwrap_err();
        assert_eq!(err.violations()[0].reason, ViolationReason::BelowMinimum { minimum: 0.0 });
        assert_eq!(store.list().unwrap(), before);
    }

    #[test]
    fn test_duplicate_ids_are_kept() {
        let store = clouds_store();
        store
            .create(&json!({ "id": "1", "title": "Other", "artist": "Someone", "price": 1 }))
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get_by_id("1").unwrap(), clouds());
    }

    #[test]
    fn test_get_by_any_field_returns_first_match() {
        let albums = vec![clouds(), Album::new("2", "Jeru", "NF", 17.0)];
        let store = AlbumStore::with_albums(registry(), StoreOptions::default(), albums);
        let found = store.get_by_any_field(&AlbumQuery::by_artist("NF")).unwrap();
        assert_eq!(found.id, "1");

        let found = store.get_by_any_field(&AlbumQuery::by_price(17.0)).unwrap();
        assert_eq!(found.id, "2");
    }

    #[test]
    fn test_empty_query_is_not_found() {
        let store = clouds_store();
        let err = store.get_by_any_field(&AlbumQuery::default()).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[test]
    fn test_missing_contract_is_reported() {
        let doc = r#"{ "version": "1.0.0", "operations": [
            { "operation": "create", "direction": "request", "fields": [] }
        ] }"#;
        let store = AlbumStore::new(inline_registry(doc));

        let err = store.get_by_id("1").unwrap_err();
        assert!(matches!(err, CatalogError::UnknownOperation { .. }));
    }

    #[test]
    fn test_open_contract_that_cannot_form_an_album() {
        let doc = r#"{ "version": "1.0.0", "operations": [
            { "operation": "create", "direction": "request",
              "fields": [{ "name": "id", "type": "string", "required": true }] }
        ] }"#;
        let store = AlbumStore::new(inline_registry(doc));

        let err = store.create(&json!({ "id": "1" })).unwrap_err();
        let fields: Vec<_> = err.violations().iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["title", "artist", "price"]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_response_validation() {
        let options = StoreOptions {
            validate_responses: true,
        };
        let store = AlbumStore::seeded(registry(), options, crate::record::builtin_seed()).unwrap();
        assert_eq!(store.list().unwrap().len(), 3);
        assert_eq!(store.get_by_id("3").unwrap().title, "Real");
    }

    #[test]
    fn test_preloaded_albums_checked_on_the_way_out() {
        let doc = r#"{ "version": "1.0.0", "operations": [
            { "operation": "list", "direction": "response",
              "fields": [{ "name": "price", "type": "number", "maximum": 50 }] }
        ] }"#;
        let options = StoreOptions {
            validate_responses: true,
        };
        let store = AlbumStore::with_albums(inline_registry(doc), options, vec![clouds()]);

        assert!(store.options().validate_responses);
        let err = store.list().unwrap_err();
        assert_eq!(err.violations()[0].reason, ViolationReason::AboveMaximum { maximum: 50.0 });
    }

    #[test]
    fn test_concurrent_creates() {
        let store = AlbumStore::new(registry());
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for n in 0..25 {
                        let payload = json!({
                            "id": format!("{}-{}", worker, n),
                            "title": "Track",
                            "artist": "Band",
                            "price": n,
                        });
                        store.create(&payload).unwrap();
                    }
                });
            }
        });
        assert_eq!(store.len(), 200);
    }
}
