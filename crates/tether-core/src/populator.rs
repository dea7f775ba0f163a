use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::assign;
use crate::config::PopulateConfig;
use crate::document::{self, Document};
use crate::error::PopulateError;
use crate::fetch::{self, Fetched, QueryExecutor};
use crate::resolve::{self, Batch};
use crate::schema::Schema;
use crate::spec::{self, PopulateArgs};

/// Turns fetched rows into documents of a known model.
pub trait Materializer: Send + Sync {
    fn knows(&self, collection: &str) -> bool;

    fn hydrate(&self, collection: &str, row: bson::Document) -> Result<Document, PopulateError>;
}

/// Registered models by collection name.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<Schema>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model under its schema name, replacing any previous one.
    pub fn register(&mut self, schema: impl Into<Arc<Schema>>) -> Arc<Schema> {
        let schema = schema.into();
        self.models
            .insert(schema.name().to_string(), Arc::clone(&schema));
        schema
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Schema>> {
        self.models.get(name)
    }

    /// An empty top-level document of the named model.
    pub fn document(&self, name: &str) -> Result<Document, PopulateError> {
        self.get(name)
            .map(|schema| Document::new(Arc::clone(schema)))
            .ok_or_else(|| unknown_model(name))
    }
}

impl Materializer for ModelRegistry {
    fn knows(&self, collection: &str) -> bool {
        self.models.contains_key(collection)
    }

    fn hydrate(&self, collection: &str, row: bson::Document) -> Result<Document, PopulateError> {
        self.get(collection)
            .map(|schema| Document::from_row(Arc::clone(schema), row))
            .ok_or_else(|| unknown_model(collection))
    }
}

fn unknown_model(name: &str) -> PopulateError {
    PopulateError::Validation(format!("model `{name}` is not registered"))
}

/// Resolves references on documents against a store.
///
/// Holds its collaborators by value and only needs `&self`, so one
/// populator can serve concurrent calls on different documents.
pub struct Populator<M, E> {
    models: M,
    executor: E,
    config: PopulateConfig,
}

impl<M: Materializer, E: QueryExecutor> Populator<M, E> {
    pub fn new(models: M, executor: E) -> Self {
        Self::with_config(models, executor, PopulateConfig::default())
    }

    pub fn with_config(models: M, executor: E, config: PopulateConfig) -> Self {
        Self {
            models,
            executor,
            config,
        }
    }

    pub fn models(&self) -> &M {
        &self.models
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &PopulateConfig {
        &self.config
    }

    /// Queue `args` on `doc` and execute everything pending on it.
    pub async fn populate(
        &self,
        doc: &mut Document,
        args: impl Into<PopulateArgs>,
    ) -> Result<(), PopulateError> {
        doc.populate(args)?;
        self.execute(doc).await
    }

    /// Queue `args` on every document and execute them in one pass, so
    /// identifiers are batched across the whole slice.
    pub async fn populate_many(
        &self,
        docs: &mut [Document],
        args: impl Into<PopulateArgs>,
    ) -> Result<(), PopulateError> {
        reject_embedded(docs)?;
        let specs = spec::normalize(args.into())?;
        for doc in docs.iter_mut() {
            doc.merge_pending(specs.iter().cloned());
        }
        self.execute_many(docs).await
    }

    pub async fn execute(&self, doc: &mut Document) -> Result<(), PopulateError> {
        self.execute_many(std::slice::from_mut(doc)).await
    }

    /// Execute the pending plans of `docs`.
    ///
    /// Pending state is cleared up front, whatever the outcome. The first
    /// failing batch aborts the call; batches assigned before it stay
    /// assigned.
    pub async fn execute_many(&self, docs: &mut [Document]) -> Result<(), PopulateError> {
        reject_embedded(docs)?;
        let pending: Vec<_> = docs.iter_mut().map(Document::take_pending).collect();
        if pending.iter().all(Vec::is_empty) {
            return Ok(());
        }

        let plan = resolve::plan(docs, pending, &self.models, self.config.batch_policy)?;
        debug!(
            documents = docs.len(),
            paths = plan.jobs.len(),
            batches = plan.batches.len(),
            "population planned"
        );

        let mut results = stream::iter(
            plan.batches
                .iter()
                .enumerate()
                .filter(|(_, batch)| !batch.is_empty()),
        )
        .map(|(idx, batch)| async move { (idx, self.fetch_batch(batch).await) })
        .buffer_unordered(self.config.max_concurrent_batches.max(1));

        let mut written = HashSet::new();
        while let Some((idx, fetched)) = results.next().await {
            assign::apply_batch(docs, &plan, idx, &fetched?, &self.config, &mut written);
        }
        Ok(())
    }

    async fn fetch_batch(&self, batch: &Batch) -> Result<Fetched, PopulateError> {
        let request = batch.request();
        debug!(
            collection = %request.collection,
            path = %batch.spec.path,
            ids = request.ids.len(),
            "fetching batch"
        );
        let rows = self
            .executor
            .fetch_by_ids(&request)
            .await
            .map_err(|source| PopulateError::Fetch {
                collection: batch.collection.clone(),
                source,
            })?;

        let mut docs = fetch::hydrate(&self.models, &batch.collection, rows)?;
        if !batch.spec.populate.is_empty() {
            for doc in docs.iter_mut() {
                doc.merge_pending(batch.spec.populate.iter().cloned());
            }
            Box::pin(self.execute_many(&mut docs)).await?;
        }
        let fetched = Fetched::new(docs);
        debug!(collection = %batch.collection, found = fetched.len(), "batch fetched");
        Ok(fetched)
    }
}

fn reject_embedded(docs: &[Document]) -> Result<(), PopulateError> {
    if docs.iter().any(Document::is_embedded) {
        return Err(document::nested_populate_error());
    }
    Ok(())
}
