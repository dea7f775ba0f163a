use std::collections::HashSet;

use tracing::trace;

use crate::config::PopulateConfig;
use crate::document::Document;
use crate::fetch::Fetched;
use crate::id::IdKind;
use crate::path;
use crate::resolve::{Job, Plan};
use crate::state::{self, PopulatedMarker};
use crate::value::Value;

/// Write the results of one batch into every site that resolved to it,
/// then refresh the populated markers of the affected paths.
///
/// `written` collects the jobs assigned so far in this call. A job whose
/// path runs under one of them is skipped: its owners were replaced by
/// freshly fetched documents and its sites no longer line up.
pub(crate) fn apply_batch(
    docs: &mut [Document],
    plan: &Plan,
    batch: usize,
    fetched: &Fetched,
    config: &PopulateConfig,
    written: &mut HashSet<usize>,
) {
    let collection = &plan.batches[batch].collection;
    for (idx, job) in plan.jobs.iter().enumerate().filter(|(_, j)| j.uses(batch)) {
        if written.iter().any(|&w| replaces(&plan.jobs[w], job)) {
            trace!(path = %job.path.raw, "owners replaced in this call, skipped");
            continue;
        }
        let doc = &mut docs[job.doc];
        let assigned = assign_job(doc, job, batch, fetched, config.compact_missing);
        written.insert(idx);
        trace!(path = %job.path.raw, collection = %collection, assigned, "batch assigned");

        doc.unmark_below(&job.path.raw);
        if holds_documents(doc, job) {
            if assigned > 0 || !doc.is_populated(&job.path.raw) {
                doc.mark_populated(job.path.raw.clone(), PopulatedMarker::new(collection.as_str()));
            }
        } else {
            doc.unmark_populated(&job.path.raw);
        }
    }
}

/// True when `outer` rewrites a field that `inner` walks through.
fn replaces(outer: &Job, inner: &Job) -> bool {
    outer.doc == inner.doc
        && outer.path.raw != inner.path.raw
        && path::is_within(&inner.path.raw, &outer.path.raw)
}

fn assign_job(
    doc: &mut Document,
    job: &Job,
    batch: usize,
    fetched: &Fetched,
    compact: bool,
) -> usize {
    let mut site = 0;
    let mut assigned = 0;
    path::for_each_owner(doc, &job.path, &mut |owner, leaf| {
        let current = job.sites.get(site).copied().flatten();
        site += 1;
        let Some(current) = current.filter(|s| s.batch == batch) else {
            return;
        };
        if let Some(value) = owner.fields.get_mut(leaf) {
            assigned += assign_value(value, fetched, current.id_kind, job.ordered, compact);
        }
    });
    assigned
}

fn holds_documents(doc: &mut Document, job: &Job) -> bool {
    let mut found = false;
    path::for_each_owner(doc, &job.path, &mut |owner, leaf| {
        found |= owner.fields.get(leaf).is_some_and(Value::contains_documents);
    });
    found
}

/// Substitute fetched documents into one reference value. Returns how many
/// documents were written.
fn assign_value(
    value: &mut Value,
    fetched: &Fetched,
    kind: IdKind,
    ordered: bool,
    compact: bool,
) -> usize {
    if let Value::Array(items) = value {
        return assign_array(items, fetched, kind, ordered, compact);
    }
    let Some(id) = value.identifier(kind) else {
        return 0;
    };
    match fetched.get(&id) {
        Some((_, doc)) => {
            *value = Value::Populated(Box::new(doc.clone()));
            1
        }
        None => {
            state::depopulate_value(value);
            0
        }
    }
}

fn assign_array(
    items: &mut Vec<Value>,
    fetched: &Fetched,
    kind: IdKind,
    ordered: bool,
    compact: bool,
) -> usize {
    let mut out = Vec::with_capacity(items.len());
    // (slot index, result rank) of every populated slot
    let mut slots = Vec::new();

    for mut item in items.drain(..) {
        if item.is_placeholder() {
            out.push(item);
            continue;
        }
        let Some(id) = item.identifier(kind) else {
            out.push(item);
            continue;
        };
        match fetched.get(&id) {
            Some((rank, doc)) => {
                slots.push((out.len(), rank));
                out.push(Value::Populated(Box::new(doc.clone())));
            }
            None if compact => {}
            None => {
                state::depopulate_value(&mut item);
                out.push(item);
            }
        }
    }

    if ordered && slots.len() > 1 {
        let mut by_rank = slots.clone();
        by_rank.sort_by_key(|&(_, rank)| rank);
        let docs: Vec<Value> = by_rank
            .iter()
            .map(|&(idx, _)| std::mem::replace(&mut out[idx], Value::Null))
            .collect();
        for ((idx, _), doc) in slots.iter().zip(docs) {
            out[*idx] = doc;
        }
    }

    *items = out;
    slots.len()
}
