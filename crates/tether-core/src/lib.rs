mod assign;
mod config;
mod document;
mod error;
mod fetch;
mod id;
mod path;
mod pending;
mod populator;
mod resolve;
mod schema;
mod spec;
mod state;
mod value;

pub use bson::Bson;
pub use config::{BatchPolicy, PopulateConfig};
pub use document::Document;
pub use error::{FetchError, PopulateError};
pub use fetch::{FetchRequest, QueryExecutor};
pub use id::{IdKey, IdKind};
pub use pending::{Pending, PendingPopulation};
pub use populator::{Materializer, ModelRegistry, Populator};
pub use schema::{FieldDescriptor, FieldKind, RefTarget, Reference, Schema, SchemaLookup};
pub use spec::{PathSpec, PopulateArgs};
pub use state::PopulatedMarker;
pub use tether_query::{
    Filter, FilterGroup, FilterNode, LogicalOp, Operator, Projection, QueryOptions, Sort,
    SortDirection,
};
pub use value::Value;
