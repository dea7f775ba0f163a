use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bson::Bson;
use tether_query::{FilterGroup, Projection, QueryOptions};

use crate::document::Document;
use crate::error::{FetchError, PopulateError};
use crate::id::IdKey;
use crate::populator::Materializer;

/// One "find by id set" query.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub collection: String,
    pub ids: Vec<Bson>,
    pub projection: Option<Projection>,
    pub filter: Option<FilterGroup>,
    pub options: QueryOptions,
}

impl FetchRequest {
    pub fn new(collection: impl Into<String>, ids: Vec<Bson>) -> Self {
        Self {
            collection: collection.into(),
            ids,
            projection: None,
            filter: None,
            options: QueryOptions::default(),
        }
    }

    /// Set the projection. `_id` is always kept: results are matched back
    /// to references by it.
    pub fn projection(mut self, projection: Option<Projection>) -> Self {
        self.projection = projection.map(|p| match p {
            Projection::Include { fields, .. } => Projection::Include {
                fields,
                keep_id: true,
            },
            Projection::Exclude(fields) => {
                Projection::Exclude(fields.into_iter().filter(|f| f != "_id").collect())
            }
        });
        self
    }

    pub fn filter(mut self, filter: Option<FilterGroup>) -> Self {
        self.filter = filter;
        self
    }

    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }
}

/// The store the engine fetches referenced documents from.
///
/// Implementations return the rows whose `_id` is in `request.ids` and that
/// match `request.filter`, ordered by `request.options.sort`, windowed by
/// skip/limit, with the projection applied.
pub trait QueryExecutor: Send + Sync {
    fn fetch_by_ids(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<Vec<bson::Document>, FetchError>> + Send;
}

impl<E: QueryExecutor> QueryExecutor for Arc<E> {
    fn fetch_by_ids(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<Vec<bson::Document>, FetchError>> + Send {
        (**self).fetch_by_ids(request)
    }
}

impl<E: QueryExecutor> QueryExecutor for &E {
    fn fetch_by_ids(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<Vec<bson::Document>, FetchError>> + Send {
        (**self).fetch_by_ids(request)
    }
}

/// Hydrate fetched rows into documents of `collection`.
pub(crate) fn hydrate<M: Materializer + ?Sized>(
    materializer: &M,
    collection: &str,
    rows: Vec<bson::Document>,
) -> Result<Vec<Document>, PopulateError> {
    rows.into_iter()
        .map(|row| materializer.hydrate(collection, row))
        .collect()
}

/// Fetched documents keyed by identifier, with their position in the
/// result set. The first row for an identifier wins.
#[derive(Debug, Default)]
pub(crate) struct Fetched {
    by_id: HashMap<IdKey, (usize, Document)>,
}

impl Fetched {
    pub fn new(docs: Vec<Document>) -> Self {
        let mut by_id = HashMap::with_capacity(docs.len());
        for (rank, doc) in docs.into_iter().enumerate() {
            let Some(key) = doc.id().and_then(IdKey::of) else {
                continue;
            };
            by_id.entry(key).or_insert((rank, doc));
        }
        Self { by_id }
    }

    pub fn get(&self, id: &Bson) -> Option<(usize, &Document)> {
        let (rank, doc) = self.by_id.get(&IdKey::of(id)?)?;
        Some((*rank, doc))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }
}
