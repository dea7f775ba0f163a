use serde::{Deserialize, Serialize};

use crate::sort::{Sort, deserialize_sort};

/// Query modifiers applied to one fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default, deserialize_with = "deserialize_sort")]
    pub sort: Vec<Sort>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}
