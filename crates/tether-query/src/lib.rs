mod filter;
mod operator;
mod options;
mod projection;
mod sort;

pub use filter::{Filter, FilterGroup, FilterNode, LogicalOp};
pub use operator::Operator;
pub use options::QueryOptions;
pub use projection::{Projection, ProjectionError};
pub use sort::{Sort, SortDirection, parse_sort};
