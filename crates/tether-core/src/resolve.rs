use std::collections::HashSet;

use bson::Bson;
use tether_query::Projection;
use tracing::debug;

use crate::config::BatchPolicy;
use crate::document::Document;
use crate::error::PopulateError;
use crate::fetch::FetchRequest;
use crate::id::{IdKey, IdKind};
use crate::path::{self, ParsedPath};
use crate::populator::Materializer;
use crate::schema::{FieldDescriptor, RefTarget, SchemaLookup};
use crate::spec::PathSpec;
use crate::value::Value;

/// How the target collection of one reference site was decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// `model` on the path spec.
    Explicit(String),
    /// Read from a discriminator field of the document.
    Dynamic(String),
    /// Declared on the schema.
    Static(String),
}

impl Resolution {
    pub fn collection(&self) -> &str {
        match self {
            Resolution::Explicit(c) | Resolution::Dynamic(c) | Resolution::Static(c) => c,
        }
    }
}

fn resolve(
    spec: &PathSpec,
    descriptor: Option<&FieldDescriptor>,
    owner: &Document,
    root_discriminator: Option<&str>,
) -> Option<Resolution> {
    if let Some(model) = &spec.model {
        return Some(Resolution::Explicit(model.clone()));
    }
    match &descriptor?.as_reference()?.target {
        RefTarget::Static(collection) => Some(Resolution::Static(collection.clone())),
        RefTarget::Dynamic(field) => owner
            .get(field)
            .and_then(Value::as_str)
            .or(root_discriminator)
            .map(|c| Resolution::Dynamic(c.to_string())),
    }
}

/// One reference site that takes part in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Site {
    pub batch: usize,
    pub id_kind: IdKind,
}

/// One pending path on one document.
#[derive(Debug)]
pub(crate) struct Job {
    pub doc: usize,
    pub path: ParsedPath,
    /// Order populated arrays by result order instead of identifier order.
    pub ordered: bool,
    /// Every owner visited along the path, in walk order.
    pub sites: Vec<Option<Site>>,
}

impl Job {
    pub fn uses(&self, batch: usize) -> bool {
        self.sites.iter().flatten().any(|s| s.batch == batch)
    }
}

/// Identifiers for one fetch, shared by every site resolving to it.
#[derive(Debug)]
pub(crate) struct Batch {
    pub collection: String,
    pub spec: PathSpec,
    projection: Option<Projection>,
    ids: Vec<Bson>,
    seen: HashSet<IdKey>,
}

impl Batch {
    fn new(collection: &str, spec: &PathSpec, projection: Option<Projection>) -> Self {
        Self {
            collection: collection.to_string(),
            spec: spec.clone(),
            projection,
            ids: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn accepts(&self, collection: &str, spec: &PathSpec, policy: BatchPolicy) -> bool {
        self.collection == collection
            && self.spec.select == spec.select
            && self.spec.filter == spec.filter
            && self.spec.options == spec.options
            && self.spec.populate == spec.populate
            && (policy == BatchPolicy::BySignature || self.spec.path == spec.path)
    }

    fn add(&mut self, ids: impl IntoIterator<Item = Bson>) {
        for id in ids {
            let fresh = IdKey::of(&id).is_some_and(|key| self.seen.insert(key));
            if fresh {
                self.ids.push(id);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn request(&self) -> FetchRequest {
        FetchRequest::new(&self.collection, self.ids.clone())
            .projection(self.projection.clone())
            .filter(self.spec.filter.clone())
            .options(self.spec.options.clone())
    }
}

#[derive(Debug, Default)]
pub(crate) struct Plan {
    pub jobs: Vec<Job>,
    pub batches: Vec<Batch>,
}

/// Resolve every pending path of every document and group the identifiers
/// into batches.
///
/// Fails before anything is fetched when a resolved model is unknown or a
/// live value contradicts the declared cardinality of its field.
pub(crate) fn plan<M: Materializer + ?Sized>(
    docs: &mut [Document],
    pending: Vec<Vec<PathSpec>>,
    materializer: &M,
    policy: BatchPolicy,
) -> Result<Plan, PopulateError> {
    let mut plan = Plan::default();
    for (idx, (doc, specs)) in docs.iter_mut().zip(pending).enumerate() {
        for spec in specs {
            let job = plan_path(doc, idx, &spec, materializer, policy, &mut plan.batches)?;
            plan.jobs.push(job);
        }
    }
    Ok(plan)
}

fn plan_path<M: Materializer + ?Sized>(
    doc: &mut Document,
    idx: usize,
    spec: &PathSpec,
    materializer: &M,
    policy: BatchPolicy,
    batches: &mut Vec<Batch>,
) -> Result<Job, PopulateError> {
    let path = ParsedPath::parse(doc.schema.as_ref(), &spec.path);
    let projection = spec.projection()?;
    let root_discriminator = match doc
        .schema
        .describe(&spec.path)
        .and_then(|d| d.as_reference().map(|r| r.target.clone()))
    {
        Some(RefTarget::Dynamic(field)) => doc.get(&field).and_then(Value::as_str).map(str::to_string),
        _ => None,
    };

    let mut sites = Vec::new();
    path::visit_owners(doc, &path, &mut |owner, leaf| {
        let descriptor = owner.schema.describe(leaf);
        let site = match owner.fields.get(leaf) {
            None => None,
            Some(value) => {
                check_cardinality(&spec.path, descriptor.as_ref(), value)?;
                match resolve(spec, descriptor.as_ref(), owner, root_discriminator.as_deref()) {
                    None => {
                        debug!(path = %spec.path, model = %owner.model(), "no model resolved, skipping");
                        None
                    }
                    Some(resolution) => {
                        let collection = resolution.collection();
                        if !materializer.knows(collection) {
                            return Err(PopulateError::Validation(format!(
                                "unknown model `{collection}` for path `{}`",
                                spec.path
                            )));
                        }
                        let id_kind = descriptor
                            .as_ref()
                            .and_then(FieldDescriptor::as_reference)
                            .map_or(IdKind::Any, |r| r.id_kind);
                        let batch = match batches
                            .iter()
                            .position(|b| b.accepts(collection, spec, policy))
                        {
                            Some(i) => i,
                            None => {
                                batches.push(Batch::new(collection, spec, projection.clone()));
                                batches.len() - 1
                            }
                        };
                        batches[batch].add(identifiers(value, id_kind));
                        Some(Site { batch, id_kind })
                    }
                }
            }
        };
        sites.push(site);
        Ok(())
    })?;

    Ok(Job {
        doc: idx,
        ordered: !spec.options.sort.is_empty(),
        path,
        sites,
    })
}

fn check_cardinality(
    path: &str,
    descriptor: Option<&FieldDescriptor>,
    value: &Value,
) -> Result<(), PopulateError> {
    let Some(descriptor) = descriptor.filter(|d| d.as_reference().is_some()) else {
        return Ok(());
    };
    match (descriptor.is_array, value) {
        (true, Value::Scalar(_) | Value::Populated(_) | Value::Embedded(_)) => Err(
            PopulateError::assignment(path, "declared as an array of references, found a single value"),
        ),
        (false, Value::Array(_)) => Err(PopulateError::assignment(
            path,
            "declared as a single reference, found an array",
        )),
        _ => Ok(()),
    }
}

/// Identifiers a value stands for; placeholders and invalid values yield
/// nothing.
fn identifiers(value: &Value, kind: IdKind) -> Vec<Bson> {
    match value {
        Value::Array(items) => items.iter().filter_map(|v| v.identifier(kind)).collect(),
        other => other.identifier(kind).into_iter().collect(),
    }
}
