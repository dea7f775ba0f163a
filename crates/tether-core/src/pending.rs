use crate::document::Document;
use crate::error::PopulateError;
use crate::fetch::QueryExecutor;
use crate::populator::{Materializer, Populator};
use crate::spec::{PathSpec, PopulateArgs};

/// Paths queued on one document, waiting for execution.
///
/// Keyed by path; re-queuing a path replaces its spec entirely and keeps
/// its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingPopulation {
    specs: Vec<PathSpec>,
}

impl PendingPopulation {
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&PathSpec> {
        self.specs.iter().find(|s| s.path == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathSpec> {
        self.specs.iter()
    }

    pub(crate) fn merge(&mut self, specs: impl IntoIterator<Item = PathSpec>) {
        for spec in specs {
            match self.specs.iter_mut().find(|s| s.path == spec.path) {
                Some(existing) => *existing = spec,
                None => self.specs.push(spec),
            }
        }
    }

    pub(crate) fn take(&mut self) -> Vec<PathSpec> {
        std::mem::take(&mut self.specs)
    }
}

/// Chainable handle returned by [`Document::populate`].
///
/// Each `populate` call only merges into the document's pending plan;
/// nothing is fetched until [`execute`](Pending::execute). Dropping the
/// handle keeps the plan on the document for a later
/// [`Populator::execute`].
pub struct Pending<'a> {
    doc: &'a mut Document,
}

impl<'a> Pending<'a> {
    pub(crate) fn new(doc: &'a mut Document) -> Self {
        Self { doc }
    }

    pub fn populate(self, args: impl Into<PopulateArgs>) -> Result<Pending<'a>, PopulateError> {
        let doc = self.doc;
        doc.populate(args)
    }

    pub async fn execute<M, E>(self, populator: &Populator<M, E>) -> Result<(), PopulateError>
    where
        M: Materializer,
        E: QueryExecutor,
    {
        populator.execute(self.doc).await
    }
}
