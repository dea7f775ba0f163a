use bson::Bson;
use serde::{Deserialize, Serialize};

use crate::operator::Operator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub value: Bson,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Eq,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterNode {
    Condition(Filter),
    Group(FilterGroup),
}

/// A tree of conditions evaluated against each candidate row.
///
/// Used as the `match` clause of a populate path: rows that fail it are
/// treated exactly like missing identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub logical: LogicalOp,
    pub children: Vec<FilterNode>,
}

impl FilterGroup {
    /// AND of the given conditions.
    pub fn all(conditions: impl IntoIterator<Item = Filter>) -> Self {
        Self {
            logical: LogicalOp::And,
            children: conditions.into_iter().map(FilterNode::Condition).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_nested_groups() {
        let group: FilterGroup = serde_json::from_str(
            r#"{ "logical": "or", "children": [
                 { "condition": { "field": "name", "operator": "in", "value": ["a", "b"] } },
                 { "group": { "logical": "and", "children": [
                     { "condition": { "field": "addr.city", "operator": "eq", "value": "Austin" } } ] } } ] }"#,
        )
        .unwrap();

        assert_eq!(group.logical, LogicalOp::Or);
        assert_eq!(
            group.children[1],
            FilterNode::Group(FilterGroup::all([Filter::eq("addr.city", "Austin")]))
        );
        let FilterNode::Condition(first) = &group.children[0] else {
            panic!("expected a condition");
        };
        assert_eq!(first.operator, Operator::In);
        assert_eq!(first.value, Bson::Array(vec!["a".into(), "b".into()]));
    }
}
