//! Resolution and revalidation of the cache's own schema objects.
//!
//! The cache needs three identifiers before it can do anything: its schema,
//! the store relation, and the opaque-identity marker function. They are
//! resolved once and memoized, but never trusted blindly: objects can be
//! dropped and recreated under new identifiers, so every use revalidates
//! the memo against the catalog and re-resolves when it has gone stale.

use parking_lot::Mutex;
use plancache_core::{CacheError, FunctionId, RelationId, Result, SchemaId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Schema the cache's own objects live in.
pub const CACHE_SCHEMA_NAME: &str = "plancache";
/// Relation backing the plan store.
pub const STORE_RELATION_NAME: &str = "cached_plans";
/// The opaque-identity function callers wrap parameter holes in.
pub const MARKER_FUNCTION_NAME: &str = "_p";

/// Catalog seam to the host engine. Lookups observe the caller's current
/// transaction, so a `None` may simply mean "not visible yet".
pub trait SchemaProvider: Send + Sync {
    fn schema_id(&self, name: &str) -> Option<SchemaId>;
    fn relation_id(&self, schema: SchemaId, name: &str) -> Option<RelationId>;
    fn function_id(&self, schema: SchemaId, name: &str) -> Option<FunctionId>;
    fn relation_exists(&self, id: RelationId) -> bool;
    fn function_exists(&self, id: FunctionId) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedIds {
    pub schema: SchemaId,
    pub store_relation: RelationId,
    pub marker_fn: FunctionId,
}

/// Process-local memo of [`ResolvedIds`] with revalidation-on-use.
pub struct IdResolver {
    provider: Arc<dyn SchemaProvider>,
    cached: Mutex<Option<ResolvedIds>>,
    /// Misconfiguration is warned about once, not on every planning call
    warned: AtomicBool,
}

impl IdResolver {
    pub fn new(provider: Arc<dyn SchemaProvider>) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
            warned: AtomicBool::new(false),
        }
    }

    /// Return live identifiers, re-resolving if the memoized ones no longer
    /// denote existing objects.
    ///
    /// Errors: [`CacheError::SchemaNotReady`] when the schema is absent
    /// (expected during install/restore, callers bypass silently);
    /// [`CacheError::SchemaMisconfigured`] when the schema exists but a
    /// required object is missing.
    pub fn get(&self) -> Result<ResolvedIds> {
        let mut cached = self.cached.lock();
        if let Some(ids) = *cached {
            if self.provider.relation_exists(ids.store_relation)
                && self.provider.function_exists(ids.marker_fn)
            {
                return Ok(ids);
            }
            *cached = None;
        }

        let ids = self.resolve()?;
        *cached = Some(ids);
        Ok(ids)
    }

    /// Drop the memo; the next use resolves from scratch. Called when the
    /// host signals a schema change involving the cache's own objects.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    fn resolve(&self) -> Result<ResolvedIds> {
        let schema = self
            .provider
            .schema_id(CACHE_SCHEMA_NAME)
            .ok_or(CacheError::SchemaNotReady)?;

        let store_relation = self.provider.relation_id(schema, STORE_RELATION_NAME);
        let marker_fn = self.provider.function_id(schema, MARKER_FUNCTION_NAME);

        match (store_relation, marker_fn) {
            (Some(store_relation), Some(marker_fn)) => {
                self.warned.store(false, Ordering::Relaxed);
                Ok(ResolvedIds {
                    schema,
                    store_relation,
                    marker_fn,
                })
            }
            (missing_rel, _) => {
                let missing = if missing_rel.is_none() {
                    STORE_RELATION_NAME
                } else {
                    MARKER_FUNCTION_NAME
                };
                if !self.warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(missing, "plan cache installed incorrectly; standing down");
                }
                Err(CacheError::SchemaMisconfigured(missing.to_string()))
            }
        }
    }
}

/// In-memory catalog, the reference [`SchemaProvider`] used by demos and
/// tests. Registration hands out sequential identifiers; dropping an object
/// makes its identifier dead, and re-registration allocates a fresh one.
#[derive(Default)]
pub struct MemoryCatalog {
    inner: Mutex<CatalogInner>,
}

#[derive(Default)]
struct CatalogInner {
    next_id: u32,
    schemas: Vec<(String, SchemaId)>,
    relations: Vec<(SchemaId, String, RelationId)>,
    functions: Vec<(SchemaId, String, FunctionId)>,
}

impl CatalogInner {
    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the cache's full schema (schema, store relation, marker
    /// function) in one call.
    pub fn with_cache_schema() -> Arc<Self> {
        let catalog = Arc::new(Self::new());
        let schema = catalog.register_schema(CACHE_SCHEMA_NAME);
        catalog.register_relation(schema, STORE_RELATION_NAME);
        catalog.register_function(schema, MARKER_FUNCTION_NAME);
        catalog
    }

    pub fn register_schema(&self, name: &str) -> SchemaId {
        let mut inner = self.inner.lock();
        let id = SchemaId(inner.allocate());
        inner.schemas.push((name.to_string(), id));
        id
    }

    pub fn register_relation(&self, schema: SchemaId, name: &str) -> RelationId {
        let mut inner = self.inner.lock();
        let id = RelationId(inner.allocate());
        inner.relations.push((schema, name.to_string(), id));
        id
    }

    pub fn register_function(&self, schema: SchemaId, name: &str) -> FunctionId {
        let mut inner = self.inner.lock();
        let id = FunctionId(inner.allocate());
        inner.functions.push((schema, name.to_string(), id));
        id
    }

    pub fn drop_relation(&self, id: RelationId) {
        self.inner.lock().relations.retain(|(_, _, rel)| *rel != id);
    }

    pub fn drop_function(&self, id: FunctionId) {
        self.inner.lock().functions.retain(|(_, _, f)| *f != id);
    }
}

impl SchemaProvider for MemoryCatalog {
    fn schema_id(&self, name: &str) -> Option<SchemaId> {
        self.inner
            .lock()
            .schemas
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    fn relation_id(&self, schema: SchemaId, name: &str) -> Option<RelationId> {
        self.inner
            .lock()
            .relations
            .iter()
            .find(|(s, n, _)| *s == schema && n == name)
            .map(|(_, _, id)| *id)
    }

    fn function_id(&self, schema: SchemaId, name: &str) -> Option<FunctionId> {
        self.inner
            .lock()
            .functions
            .iter()
            .find(|(s, n, _)| *s == schema && n == name)
            .map(|(_, _, id)| *id)
    }

    fn relation_exists(&self, id: RelationId) -> bool {
        self.inner.lock().relations.iter().any(|(_, _, r)| *r == id)
    }

    fn function_exists(&self, id: FunctionId) -> bool {
        self.inner.lock().functions.iter().any(|(_, _, f)| *f == id)
    }
}
