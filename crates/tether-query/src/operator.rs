use serde::{Deserialize, Serialize};

/// Comparison applied by a [`Filter`](crate::Filter) to one field of a
/// fetched row. Numeric comparisons treat int32, int64 and double alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    /// Field equals any element of an array value.
    In,
    /// Case-insensitive substring match; string values only.
    IContains,
    IStartsWith,
    IEndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    /// `true` matches missing or null fields, `false` present ones.
    IsNull,
}
