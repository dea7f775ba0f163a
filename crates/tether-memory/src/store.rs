use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use arc_swap::ArcSwap;
use bson::Bson;
use imbl::Vector;
use tether_core::{FetchError, FetchRequest, IdKey, QueryExecutor};
use tracing::trace;

use crate::exec;

pub(crate) type Rows = Vector<bson::Document>;

/// In-memory collections of bson rows, queryable by id set.
///
/// Readers work on a snapshot of each collection; writers replace the
/// snapshot. Every request served is recorded so callers can inspect how
/// many round trips a population took.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Arc<ArcSwap<Rows>>>>,
    write_lock: Mutex<()>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn create_collection(&self, name: &str) {
        self.collection(name);
    }

    fn collection(&self, name: &str) -> Arc<ArcSwap<Rows>> {
        if let Some(rows) = self.snapshot_handle(name) {
            return rows;
        }
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            collections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(ArcSwap::from_pointee(Vector::new()))),
        )
    }

    fn snapshot_handle(&self, name: &str) -> Option<Arc<ArcSwap<Rows>>> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        collections.get(name).cloned()
    }

    /// Insert a row, replacing any row with the same `_id`.
    pub fn insert(&self, collection: &str, row: bson::Document) {
        self.insert_many(collection, [row]);
    }

    pub fn insert_many(&self, collection: &str, rows: impl IntoIterator<Item = bson::Document>) {
        let handle = self.collection(collection);
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut data = (**handle.load()).clone();
        for row in rows {
            let key = row.get("_id").and_then(IdKey::of);
            let existing = key.as_ref().and_then(|key| {
                data.iter()
                    .position(|r| r.get("_id").and_then(IdKey::of).as_ref() == Some(key))
            });
            match existing {
                Some(idx) => {
                    data.set(idx, row);
                }
                None => data.push_back(row),
            }
        }
        handle.store(Arc::new(data));
    }

    /// Remove the row with `_id == id`. Returns whether a row was removed.
    pub fn remove(&self, collection: &str, id: impl Into<Bson>) -> bool {
        let (Some(handle), Some(key)) = (self.snapshot_handle(collection), IdKey::of(&id.into()))
        else {
            return false;
        };
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut data = (**handle.load()).clone();
        let Some(idx) = data
            .iter()
            .position(|r| r.get("_id").and_then(IdKey::of).as_ref() == Some(&key))
        else {
            return false;
        };
        data.remove(idx);
        handle.store(Arc::new(data));
        true
    }

    pub fn len(&self, collection: &str) -> usize {
        self.snapshot_handle(collection)
            .map_or(0, |handle| handle.load().len())
    }

    /// Requests served so far, oldest first.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear_requests(&self) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Rows of `request.collection` whose `_id` is requested, filtered,
    /// sorted, windowed and projected. Unknown collections have no rows.
    pub fn find_by_ids(&self, request: &FetchRequest) -> Result<Vec<bson::Document>, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let Some(handle) = self.snapshot_handle(&request.collection) else {
            trace!(collection = %request.collection, "unknown collection, no rows");
            return Ok(Vec::new());
        };
        let snapshot = handle.load_full();
        let rows = exec::execute(snapshot.iter(), request)?;
        trace!(
            collection = %request.collection,
            requested = request.ids.len(),
            returned = rows.len(),
            "find by ids"
        );
        Ok(rows)
    }
}

impl QueryExecutor for MemoryStore {
    fn fetch_by_ids(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<Vec<bson::Document>, FetchError>> + Send {
        std::future::ready(self.find_by_ids(request))
    }
}
