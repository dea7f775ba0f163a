use std::cmp::Ordering;
use std::collections::HashSet;

use bson::Bson;
use tether_core::{FetchError, FetchRequest, IdKey};
use tether_query::{Filter, FilterGroup, FilterNode, LogicalOp, Operator, Projection, Sort, SortDirection};

/// Run a find-by-ids request over one collection's rows.
///
/// Pipeline: id match → filter → sort → skip → limit → projection.
pub(crate) fn execute<'a, I>(rows: I, request: &FetchRequest) -> Result<Vec<bson::Document>, FetchError>
where
    I: Iterator<Item = &'a bson::Document>,
{
    let wanted: HashSet<IdKey> = request.ids.iter().filter_map(IdKey::of).collect();

    let mut matched = Vec::new();
    for row in rows {
        let hit = row
            .get("_id")
            .and_then(IdKey::of)
            .is_some_and(|key| wanted.contains(&key));
        if !hit {
            continue;
        }
        if let Some(group) = &request.filter {
            if !matches_group(row, group)? {
                continue;
            }
        }
        matched.push(row);
    }

    if !request.options.sort.is_empty() {
        apply_sort(&mut matched, &request.options.sort);
    }

    let windowed = matched
        .into_iter()
        .skip(request.options.skip.unwrap_or(0))
        .take(request.options.limit.unwrap_or(usize::MAX));

    Ok(windowed
        .map(|row| {
            let mut row = row.clone();
            if let Some(projection) = &request.projection {
                apply_projection(&mut row, projection);
            }
            row
        })
        .collect())
}

/// Walk a dot-separated path through nested documents.
fn get_path<'a>(doc: &'a bson::Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => doc.get(path),
        Some((head, rest)) => match doc.get(head)? {
            Bson::Document(sub) => get_path(sub, rest),
            _ => None,
        },
    }
}

// --- Filter matching ---

fn matches_group(row: &bson::Document, group: &FilterGroup) -> Result<bool, FetchError> {
    match group.logical {
        LogicalOp::And => {
            for child in &group.children {
                if !matches_node(row, child)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        LogicalOp::Or => {
            for child in &group.children {
                if matches_node(row, child)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn matches_node(row: &bson::Document, node: &FilterNode) -> Result<bool, FetchError> {
    match node {
        FilterNode::Condition(filter) => matches_filter(row, filter),
        FilterNode::Group(group) => matches_group(row, group),
    }
}

fn matches_filter(row: &bson::Document, filter: &Filter) -> Result<bool, FetchError> {
    let field_value = get_path(row, &filter.field).filter(|v| !matches!(v, Bson::Null));

    match filter.operator {
        Operator::IsNull => match &filter.value {
            Bson::Boolean(false) => Ok(field_value.is_some()),
            _ => Ok(field_value.is_none()),
        },
        Operator::Eq => Ok(field_value.is_some_and(|v| values_eq(v, &filter.value))),
        Operator::Ne => Ok(!field_value.is_some_and(|v| values_eq(v, &filter.value))),
        Operator::In => match &filter.value {
            Bson::Array(options) => {
                Ok(field_value.is_some_and(|v| options.iter().any(|o| values_eq(v, o))))
            }
            other => Err(FetchError::Query(format!(
                "`in` on `{}` expects an array, got {other}",
                filter.field
            ))),
        },
        Operator::IContains => text_match(field_value, filter, |h, n| h.contains(n)),
        Operator::IStartsWith => text_match(field_value, filter, |h, n| h.starts_with(n)),
        Operator::IEndsWith => text_match(field_value, filter, |h, n| h.ends_with(n)),
        Operator::Gt => Ok(compare_values(field_value, &filter.value, |ord| {
            ord == Ordering::Greater
        })),
        Operator::Gte => Ok(compare_values(field_value, &filter.value, |ord| {
            ord != Ordering::Less
        })),
        Operator::Lt => Ok(compare_values(field_value, &filter.value, |ord| {
            ord == Ordering::Less
        })),
        Operator::Lte => Ok(compare_values(field_value, &filter.value, |ord| {
            ord != Ordering::Greater
        })),
    }
}

fn text_match(
    field_value: Option<&Bson>,
    filter: &Filter,
    predicate: fn(&str, &str) -> bool,
) -> Result<bool, FetchError> {
    let Bson::String(needle) = &filter.value else {
        return Err(FetchError::Query(format!(
            "{:?} on `{}` expects a string",
            filter.operator, filter.field
        )));
    };
    match field_value {
        Some(Bson::String(haystack)) => Ok(predicate(
            &haystack.to_lowercase(),
            &needle.to_lowercase(),
        )),
        _ => Ok(false),
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

fn values_eq(store_val: &Bson, query_val: &Bson) -> bool {
    match (as_number(store_val), as_number(query_val)) {
        (Some(a), Some(b)) => a == b,
        _ => store_val == query_val,
    }
}

fn compare_values(
    field_value: Option<&Bson>,
    query_val: &Bson,
    predicate: fn(Ordering) -> bool,
) -> bool {
    field_value
        .and_then(|v| compare_two_values(v, query_val))
        .is_some_and(predicate)
}

fn compare_two_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_number(a), as_number(b)) {
        return a.partial_cmp(&b);
    }
    match (a, b) {
        (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
        (Bson::Boolean(a), Bson::Boolean(b)) => Some(a.cmp(b)),
        (Bson::DateTime(a), Bson::DateTime(b)) => Some(a.cmp(b)),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

// --- Sorting ---

fn apply_sort(rows: &mut [&bson::Document], sorts: &[Sort]) {
    rows.sort_by(|a, b| {
        for sort in sorts {
            let ord = compare_field_values(get_path(a, &sort.field), get_path(b, &sort.field));
            let ord = match sort.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn compare_field_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_two_values(a, b).unwrap_or(Ordering::Equal),
    }
}

// --- Projection ---

fn apply_projection(row: &mut bson::Document, projection: &Projection) {
    match projection {
        Projection::Include { fields, keep_id } => {
            let id = row.get("_id").cloned();
            include_fields(row, fields);
            match id {
                Some(id) if *keep_id => {
                    row.insert("_id", id);
                }
                _ => {
                    row.remove("_id");
                }
            }
        }
        Projection::Exclude(fields) => {
            for field in fields {
                exclude_path(row, field);
            }
        }
    }
}

/// Keep only `fields` (dot paths trim nested documents to the sub-path).
fn include_fields(row: &mut bson::Document, fields: &[String]) {
    let mut flat: HashSet<&str> = HashSet::new();
    let mut nested: Vec<(&str, String)> = Vec::new();
    for field in fields {
        match field.split_once('.') {
            Some((top, rest)) => nested.push((top, rest.to_string())),
            None => {
                flat.insert(field.as_str());
            }
        }
    }

    let keys_to_remove: Vec<String> = row
        .keys()
        .filter(|k| !flat.contains(k.as_str()) && !nested.iter().any(|(top, _)| top == k))
        .cloned()
        .collect();
    for key in keys_to_remove {
        row.remove(&key);
    }

    let tops: HashSet<&str> = nested
        .iter()
        .map(|(top, _)| *top)
        .filter(|top| !flat.contains(top))
        .collect();
    for top in tops {
        if let Some(Bson::Document(sub)) = row.get_mut(top) {
            let sub_fields: Vec<String> = nested
                .iter()
                .filter(|(t, _)| *t == top)
                .map(|(_, rest)| rest.clone())
                .collect();
            include_fields(sub, &sub_fields);
        }
    }
}

fn exclude_path(row: &mut bson::Document, path: &str) {
    match path.split_once('.') {
        None => {
            row.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(sub)) = row.get_mut(head) {
                exclude_path(sub, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use tether_query::parse_sort;

    use super::*;

    fn rows() -> Vec<bson::Document> {
        vec![
            doc! { "_id": 1, "name": "Guillermo", "age": 30, "email": "g@x.com", "addr": { "city": "Austin", "zip": "1" } },
            doc! { "_id": 2, "name": "aaron", "age": 21, "email": "a@x.com" },
            doc! { "_id": 3, "name": "Zed", "age": 45, "email": null },
        ]
    }

    fn run(request: &FetchRequest) -> Result<Vec<bson::Document>, FetchError> {
        let rows = rows();
        execute(rows.iter(), request)
    }

    fn ids(found: &[bson::Document]) -> Vec<i32> {
        found.iter().filter_map(|d| d.get_i32("_id").ok()).collect()
    }

    fn all() -> Vec<Bson> {
        vec![Bson::Int32(1), Bson::Int32(2), Bson::Int32(3)]
    }

    #[test]
    fn only_requested_ids() {
        let found = run(&FetchRequest::new("User", vec![Bson::Int64(2), Bson::Double(3.0)])).unwrap();
        assert_eq!(ids(&found), vec![2, 3]);
    }

    #[test]
    fn filter_operators() {
        let request = |filter: Filter| {
            FetchRequest::new("User", all()).filter(Some(FilterGroup::all([filter])))
        };
        let gte = Filter {
            field: "age".into(),
            operator: Operator::Gte,
            value: Bson::Int32(30),
        };
        assert_eq!(ids(&run(&request(gte)).unwrap()), vec![1, 3]);

        let contains = Filter {
            field: "name".into(),
            operator: Operator::IContains,
            value: Bson::String("AR".into()),
        };
        assert_eq!(ids(&run(&request(contains)).unwrap()), vec![2]);

        let starts = Filter {
            field: "name".into(),
            operator: Operator::IStartsWith,
            value: Bson::String("gUI".into()),
        };
        assert_eq!(ids(&run(&request(starts)).unwrap()), vec![1]);

        let ends = Filter {
            field: "name".into(),
            operator: Operator::IEndsWith,
            value: Bson::String("ED".into()),
        };
        assert_eq!(ids(&run(&request(ends)).unwrap()), vec![3]);

        let is_null = Filter {
            field: "email".into(),
            operator: Operator::IsNull,
            value: Bson::Boolean(true),
        };
        assert_eq!(ids(&run(&request(is_null)).unwrap()), vec![3]);

        let within = Filter {
            field: "name".into(),
            operator: Operator::In,
            value: Bson::Array(vec!["Zed".into(), "aaron".into()]),
        };
        assert_eq!(ids(&run(&request(within)).unwrap()), vec![2, 3]);

        let nested = Filter::eq("addr.city", "Austin");
        assert_eq!(ids(&run(&request(nested)).unwrap()), vec![1]);
    }

    #[test]
    fn or_groups() {
        let group = FilterGroup {
            logical: LogicalOp::Or,
            children: vec![
                FilterNode::Condition(Filter::eq("_id", 1)),
                FilterNode::Condition(Filter::eq("name", "Zed")),
            ],
        };
        let found = run(&FetchRequest::new("User", all()).filter(Some(group))).unwrap();
        assert_eq!(ids(&found), vec![1, 3]);
    }

    #[test]
    fn malformed_filters_error() {
        let bad_in = Filter {
            field: "name".into(),
            operator: Operator::In,
            value: Bson::String("Zed".into()),
        };
        let request = FetchRequest::new("User", all()).filter(Some(FilterGroup::all([bad_in])));
        assert!(matches!(run(&request), Err(FetchError::Query(_))));
    }

    #[test]
    fn sort_skip_limit() {
        let mut options = tether_query::QueryOptions::default();
        options.sort = parse_sort("-age");
        options.skip = Some(1);
        options.limit = Some(1);
        let found = run(&FetchRequest::new("User", all()).options(options)).unwrap();
        assert_eq!(ids(&found), vec![1]);
    }

    #[test]
    fn projection_include_and_exclude() {
        let request = FetchRequest::new("User", vec![Bson::Int32(1)])
            .projection(Some(Projection::parse("name addr.city").unwrap()));
        let found = run(&request).unwrap();
        assert_eq!(
            found[0],
            doc! { "name": "Guillermo", "addr": { "city": "Austin" }, "_id": 1 }
        );

        let request = FetchRequest::new("User", vec![Bson::Int32(1)])
            .projection(Some(Projection::parse("-email -addr.zip").unwrap()));
        let found = run(&request).unwrap();
        assert!(found[0].get("email").is_none());
        assert_eq!(found[0].get_document("addr").unwrap(), &doc! { "city": "Austin" });
        assert!(found[0].contains_key("age"));
    }
}
