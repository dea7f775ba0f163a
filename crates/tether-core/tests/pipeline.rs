use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bson::{Bson, doc};
use tether_core::{
    BatchPolicy, Document, FetchError, FetchRequest, FieldDescriptor, IdKey, ModelRegistry,
    PathSpec, PopulateConfig, PopulateError, Populator, Projection, QueryExecutor, Schema, Value,
};

/// Returns every seeded row whose `_id` was requested and records each request.
#[derive(Default)]
struct FakeExecutor {
    rows: HashMap<String, Vec<bson::Document>>,
    failing: HashMap<String, FetchError>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FakeExecutor {
    fn seed(mut self, collection: &str, rows: Vec<bson::Document>) -> Self {
        self.rows.insert(collection.to_string(), rows);
        self
    }

    fn fail(mut self, collection: &str, error: FetchError) -> Self {
        self.failing.insert(collection.to_string(), error);
        self
    }

    fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl QueryExecutor for FakeExecutor {
    async fn fetch_by_ids(&self, request: &FetchRequest) -> Result<Vec<bson::Document>, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(err) = self.failing.get(&request.collection) {
            return Err(err.clone());
        }
        let wanted: Vec<IdKey> = request.ids.iter().filter_map(IdKey::of).collect();
        Ok(self
            .rows
            .get(&request.collection)
            .into_iter()
            .flatten()
            .filter(|row| {
                row.get("_id")
                    .and_then(IdKey::of)
                    .is_some_and(|key| wanted.contains(&key))
            })
            .cloned()
            .collect())
    }
}

fn models() -> ModelRegistry {
    let mut models = ModelRegistry::new();
    models.register(Schema::new("User"));
    models.register(Schema::new("Company"));
    models.register(
        Schema::new("BlogPost")
            .field("_creator", FieldDescriptor::reference("User"))
            .field("fans", FieldDescriptor::reference_array("User"))
            .field("sponsor", FieldDescriptor::reference("Company"))
            .field(
                "comments",
                FieldDescriptor::embedded_array(Arc::new(
                    Schema::new("Comment").field("_creator", FieldDescriptor::reference("User")),
                )),
            ),
    );
    models
}

fn users() -> Vec<bson::Document> {
    (1..=4)
        .map(|i| doc! { "_id": i, "name": format!("user {i}") })
        .collect()
}

fn post(models: &ModelRegistry, row: bson::Document) -> Document {
    Document::from_row(Arc::clone(models.get("BlogPost").unwrap()), row)
}

#[tokio::test]
async fn one_request_per_path_across_documents() {
    let models = models();
    let mut docs = vec![
        post(&models, doc! { "_creator": 1, "fans": [2, 3] }),
        post(&models, doc! { "_creator": 2, "fans": [3, 4] }),
    ];
    let populator = Populator::new(models, FakeExecutor::default().seed("User", users()));

    populator
        .populate_many(&mut docs, "_creator fans")
        .await
        .unwrap();

    let requests = populator.executor().requests();
    assert_eq!(requests.len(), 2);
    let mut sizes: Vec<usize> = requests.iter().map(|r| r.ids.len()).collect();
    sizes.sort();
    assert_eq!(sizes, vec![2, 3]);
    for doc in &docs {
        assert!(doc.is_populated("_creator"));
        assert!(doc.is_populated("fans"));
    }
}

#[tokio::test]
async fn by_signature_shares_one_request() {
    let models = models();
    let mut docs = vec![post(&models, doc! { "_creator": 1, "fans": [1, 2] })];
    let config = PopulateConfig {
        batch_policy: BatchPolicy::BySignature,
        ..PopulateConfig::default()
    };
    let populator =
        Populator::with_config(models, FakeExecutor::default().seed("User", users()), config);

    populator
        .populate_many(&mut docs, "_creator fans")
        .await
        .unwrap();

    let requests = populator.executor().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].ids.len(), 2);
    assert!(docs[0].is_populated("_creator"));
    assert!(docs[0].is_populated("fans"));
}

#[tokio::test]
async fn different_options_split_batches() {
    let models = models();
    let mut doc = post(&models, doc! { "_creator": 1, "fans": [1, 2] });
    let config = PopulateConfig {
        batch_policy: BatchPolicy::BySignature,
        ..PopulateConfig::default()
    };
    let populator =
        Populator::with_config(models, FakeExecutor::default().seed("User", users()), config);

    doc.populate("_creator")
        .unwrap()
        .populate(PathSpec::new("fans").select("name"))
        .unwrap()
        .execute(&populator)
        .await
        .unwrap();

    let requests = populator.executor().requests();
    assert_eq!(requests.len(), 2);
    let projected = requests.iter().find(|r| r.projection.is_some()).unwrap();
    assert_eq!(
        projected.projection,
        Some(Projection::Include {
            fields: vec!["name".into()],
            keep_id: true
        })
    );
}

#[tokio::test]
async fn fetch_failure_surfaces_and_keeps_earlier_batches() {
    let models = models();
    let mut doc = post(&models, doc! { "_creator": 1, "sponsor": 9 });
    let config = PopulateConfig {
        max_concurrent_batches: 1,
        ..PopulateConfig::default()
    };
    let executor = FakeExecutor::default()
        .seed("User", users())
        .fail("Company", FetchError::Transport("connection reset".into()));
    let populator = Populator::with_config(models, executor, config);

    let err = populator
        .populate(&mut doc, "_creator sponsor")
        .await
        .unwrap_err();

    match err {
        PopulateError::Fetch { collection, source } => {
            assert_eq!(collection, "Company");
            assert_eq!(source, FetchError::Transport("connection reset".into()));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(doc.is_populated("_creator"));
    assert!(!doc.is_populated("sponsor"));
    assert_eq!(doc.get("sponsor"), Some(&Value::from(9)));
    assert!(doc.pending().is_empty());
}

#[tokio::test]
async fn timeout_is_a_fetch_error() {
    let models = models();
    let mut doc = post(&models, doc! { "_creator": 1 });
    let executor = FakeExecutor::default().fail("User", FetchError::Timeout);
    let populator = Populator::new(models, executor);

    let err = populator.populate(&mut doc, "_creator").await.unwrap_err();
    assert!(matches!(
        err,
        PopulateError::Fetch {
            source: FetchError::Timeout,
            ..
        }
    ));
    assert!(err.to_string().contains("User"));
}

#[tokio::test]
async fn nothing_pending_fetches_nothing() {
    let models = models();
    let mut doc = post(&models, doc! { "_creator": 1 });
    let populator = Populator::new(models, FakeExecutor::default());

    populator.execute(&mut doc).await.unwrap();
    populator.populate(&mut doc, ()).await.unwrap();

    assert!(populator.executor().requests().is_empty());
    assert_eq!(doc.get("_creator"), Some(&Value::from(1)));
}

#[tokio::test]
async fn empty_values_skip_the_fetch() {
    let models = models();
    let mut doc = post(&models, doc! { "_creator": null, "fans": [] });
    let populator = Populator::new(models, FakeExecutor::default());

    populator.populate(&mut doc, "_creator fans").await.unwrap();

    assert!(populator.executor().requests().is_empty());
    assert_eq!(doc.get("_creator"), Some(&Value::Null));
    assert_eq!(doc.get("fans"), Some(&Value::Array(vec![])));
    assert!(!doc.is_populated("fans"));
}

#[tokio::test]
async fn pending_is_cleared_even_on_validation_failure() {
    let models = models();
    let mut doc = post(&models, doc! { "extra": 1 });
    let populator = Populator::new(models, FakeExecutor::default());

    doc.populate(PathSpec::new("extra").model("Nope")).unwrap();
    let err = populator.execute(&mut doc).await.unwrap_err();

    assert!(matches!(err, PopulateError::Validation(_)));
    assert!(doc.pending().is_empty());
    assert!(populator.executor().requests().is_empty());
}

#[tokio::test]
async fn subdocuments_cannot_be_executed() {
    let models = models();
    let doc = post(&models, doc! { "comments": [ { "_creator": 1 } ] });
    let mut comment = doc
        .get("comments")
        .and_then(Value::as_array)
        .and_then(|c| c[0].as_document())
        .cloned()
        .unwrap();
    let populator = Populator::new(models, FakeExecutor::default());

    let err = populator.execute(&mut comment).await.unwrap_err();
    assert!(err.to_string().contains("on nested docs"));
}

#[tokio::test]
async fn cast_ids_reach_the_executor() {
    let mut models = ModelRegistry::new();
    models.register(Schema::new("User"));
    let schema = models.register(
        Schema::new("Note").field(
            "author",
            FieldDescriptor::reference("User").id_kind(tether_core::IdKind::ObjectId),
        ),
    );
    let oid = bson::oid::ObjectId::new();
    let mut doc = Document::from_row(schema, doc! { "author": oid.to_hex() });
    let executor = FakeExecutor::default().seed("User", vec![doc! { "_id": oid, "name": "n" }]);
    let populator = Populator::new(models, executor);

    populator.populate(&mut doc, "author").await.unwrap();

    assert_eq!(
        populator.executor().requests()[0].ids,
        vec![Bson::ObjectId(oid)]
    );
    assert!(doc.is_populated("author"));
}
