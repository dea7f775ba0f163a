use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bson::Bson;

use crate::error::PopulateError;
use crate::id::{IdKey, IdKind};
use crate::path::{self, ParsedPath};
use crate::pending::{Pending, PendingPopulation};
use crate::schema::{FieldDescriptor, Schema, SchemaLookup};
use crate::spec::{self, PathSpec, PopulateArgs};
use crate::state::{self, PopulatedMarker};
use crate::value::Value;

/// A live document: a tree of [`Value`]s plus its population state.
///
/// Top-level documents have their own identity and can be populated.
/// Embedded documents (subdocuments) belong to a parent and reject
/// `populate`; populate the nested path from the parent instead.
#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) model: String,
    pub(crate) schema: Arc<Schema>,
    pub(crate) embedded: bool,
    pub(crate) fields: BTreeMap<String, Value>,
    modified: BTreeSet<String>,
    pending: PendingPopulation,
    populated: BTreeMap<String, PopulatedMarker>,
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.model == other.model && self.embedded == other.embedded && self.fields == other.fields
    }
}

impl Document {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_schema(schema, false)
    }

    /// Build a top-level document from a stored row.
    pub fn from_row(schema: Arc<Schema>, row: bson::Document) -> Self {
        Self::from_row_inner(schema, row, false)
    }

    pub(crate) fn adhoc_embedded(row: bson::Document) -> Self {
        Self::from_row_inner(Arc::new(Schema::default()), row, true)
    }

    fn with_schema(schema: Arc<Schema>, embedded: bool) -> Self {
        Self {
            model: schema.name().to_string(),
            schema,
            embedded,
            fields: BTreeMap::new(),
            modified: BTreeSet::new(),
            pending: PendingPopulation::default(),
            populated: BTreeMap::new(),
        }
    }

    fn from_row_inner(schema: Arc<Schema>, row: bson::Document, embedded: bool) -> Self {
        let mut doc = Self::with_schema(schema, embedded);
        for (key, raw) in row {
            let value = hydrate_value(doc.schema.describe(&key).as_ref(), raw);
            doc.fields.insert(key, value);
        }
        doc
    }

    pub(crate) fn into_embedded(mut self) -> Self {
        self.embedded = true;
        self.pending = PendingPopulation::default();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    pub fn id(&self) -> Option<&Bson> {
        self.fields.get("_id").and_then(Value::as_scalar)
    }

    /// Read a dot-separated path, descending through subdocuments and
    /// populated documents (not through arrays).
    pub fn get(&self, path: &str) -> Option<&Value> {
        match path.split_once('.') {
            None => self.fields.get(path),
            Some((head, rest)) => self.fields.get(head)?.as_document()?.get(rest),
        }
    }

    /// True when the field holds a value, i.e. it was present in the
    /// hydrated row (not projected away) or has been assigned.
    pub fn is_init(&self, path: &str) -> bool {
        self.get(path).is_some_and(|v| !matches!(v, Value::Undefined))
    }

    pub fn is_modified(&self, path: &str) -> bool {
        self.modified
            .iter()
            .any(|m| path::is_within(m, path) || path::is_within(path, m))
    }

    /// Assign a value to a path.
    ///
    /// Writes to reference fields pass through the populated-state
    /// classifier: assigning documents marks the path populated, assigning
    /// raw identifiers clears the marker.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), PopulateError> {
        let descriptor = self.schema.describe(path);
        let (value, marker) = state::classify(descriptor.as_ref(), value.into());
        self.write(path, value)?;
        self.modified.insert(path.to_string());
        self.populated.retain(|p, _| !path::is_within(p, path));
        if let Some(marker) = marker {
            self.populated.insert(path.to_string(), marker);
        }
        Ok(())
    }

    /// Append to an array field, creating it when missing.
    pub fn push(&mut self, path: &str, value: impl Into<Value>) -> Result<(), PopulateError> {
        let mut items = match self.get(path) {
            None => Vec::new(),
            Some(v) if v.is_placeholder() => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => return Err(PopulateError::assignment(path, "cannot push onto a non-array")),
        };
        items.push(value.into());
        self.set(path, Value::Array(items))
    }

    /// Remove every array element standing for `id`, whether it is the raw
    /// identifier or a populated document with that `_id`. Returns the
    /// number of removed elements.
    pub fn pull(&mut self, path: &str, id: impl Into<Bson>) -> Result<usize, PopulateError> {
        let Some(target) = IdKey::of(&id.into()) else {
            return Ok(0);
        };
        let items = match self.get(path) {
            None => return Ok(0),
            Some(v) if v.is_placeholder() => return Ok(0),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => return Err(PopulateError::assignment(path, "cannot pull from a non-array")),
        };
        let before = items.len();
        let kept: Vec<Value> = items
            .into_iter()
            .filter(|v| {
                v.identifier(IdKind::Any)
                    .and_then(|id| IdKey::of(&id))
                    .is_none_or(|key| key != target)
            })
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.set(path, Value::Array(kept))?;
        }
        Ok(removed)
    }

    /// The persisted form of this document; populated documents are
    /// written as their `_id`.
    pub fn to_bson(&self) -> bson::Document {
        self.fields
            .iter()
            .filter(|(_, v)| !matches!(v, Value::Undefined))
            .map(|(k, v)| (k.clone(), v.to_bson()))
            .collect()
    }

    /// Queue paths for population without fetching anything.
    ///
    /// Fails on embedded documents and on malformed specs; in both cases
    /// the pending plan is left untouched.
    pub fn populate(&mut self, args: impl Into<PopulateArgs>) -> Result<Pending<'_>, PopulateError> {
        if self.embedded {
            return Err(nested_populate_error());
        }
        let specs = spec::normalize(args.into())?;
        self.pending.merge(specs);
        Ok(Pending::new(self))
    }

    pub fn pending(&self) -> &PendingPopulation {
        &self.pending
    }

    pub(crate) fn take_pending(&mut self) -> Vec<PathSpec> {
        self.pending.take()
    }

    pub(crate) fn merge_pending(&mut self, specs: impl IntoIterator<Item = PathSpec>) {
        self.pending.merge(specs);
    }

    pub fn is_populated(&self, path: &str) -> bool {
        self.populated.contains_key(path)
    }

    pub fn populated(&self, path: &str) -> Option<&PopulatedMarker> {
        self.populated.get(path)
    }

    pub fn populated_paths(&self) -> impl Iterator<Item = &str> {
        self.populated.keys().map(String::as_str)
    }

    pub fn mark_populated(&mut self, path: impl Into<String>, marker: PopulatedMarker) {
        self.populated.insert(path.into(), marker);
    }

    pub(crate) fn unmark_populated(&mut self, path: &str) {
        self.populated.remove(path);
    }

    /// Drop the markers of every path strictly under `path`.
    pub(crate) fn unmark_below(&mut self, path: &str) {
        self.populated
            .retain(|p, _| p == path || !path::is_within(p, path));
    }

    /// Revert populated paths to raw identifiers: one path, or every
    /// populated path when `path` is `None`. Unpopulated paths are left
    /// alone.
    pub fn depopulate(&mut self, path: Option<&str>) -> &mut Self {
        let paths: Vec<String> = match path {
            Some(p) if self.populated.contains_key(p) => vec![p.to_string()],
            Some(_) => Vec::new(),
            None => self.populated.keys().cloned().collect(),
        };
        for p in paths {
            let parsed = ParsedPath::parse(self.schema.as_ref(), &p);
            path::for_each_owner(self, &parsed, &mut |owner, leaf| {
                if let Some(value) = owner.fields.get_mut(leaf) {
                    state::depopulate_value(value);
                }
            });
            self.populated.remove(&p);
        }
        self
    }

    fn write(&mut self, path: &str, value: Value) -> Result<(), PopulateError> {
        let Some((head, rest)) = path.split_once('.') else {
            self.fields.insert(path.to_string(), value);
            return Ok(());
        };
        let sub_schema = self
            .schema
            .describe(head)
            .and_then(|d| d.embedded_schema().cloned())
            .unwrap_or_default();
        let entry = self.fields.entry(head.to_string()).or_insert(Value::Null);
        if entry.is_placeholder() {
            *entry = Value::Embedded(Document::with_schema(sub_schema, true));
        }
        match entry {
            Value::Embedded(child) => child.write(rest, value),
            Value::Populated(child) => child.write(rest, value),
            _ => Err(PopulateError::assignment(
                path,
                format!("`{head}` is not a document"),
            )),
        }
    }
}

pub(crate) fn nested_populate_error() -> PopulateError {
    PopulateError::Validation(
        "populate() is not supported on nested docs; populate the path from the top-level document"
            .into(),
    )
}

fn hydrate_value(descriptor: Option<&FieldDescriptor>, raw: Bson) -> Value {
    if let Some(reference) = descriptor.and_then(FieldDescriptor::as_reference) {
        return state::cast_ids(Value::from_bson(raw), reference.id_kind);
    }
    let Some(schema) = descriptor.and_then(FieldDescriptor::embedded_schema) else {
        return Value::from_bson(raw);
    };
    match raw {
        Bson::Document(row) => {
            Value::Embedded(Document::from_row_inner(Arc::clone(schema), row, true))
        }
        Bson::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Bson::Document(row) => {
                        Value::Embedded(Document::from_row_inner(Arc::clone(schema), row, true))
                    }
                    other => Value::from_bson(other),
                })
                .collect(),
        ),
        other => Value::from_bson(other),
    }
}
