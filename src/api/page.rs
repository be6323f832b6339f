//! Pagination and sort engine for locally evaluated queries.

use serde_json::Value;

use super::error::{ApiError, ApiResult};
use super::filter::{apply_filters, lookup_path};
use super::query::{PaginationOptions, QueryFilter, SortOptions, SortOrder};

/// One page of results plus the size of the full (filtered) set.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub items: Vec<Value>,
    pub total_results: usize,
}

impl QueryResult {
    pub fn new(items: Vec<Value>, total_results: usize) -> Self {
        Self {
            items,
            total_results,
        }
    }

    /// Wrap an already-final set (no slicing applied).
    pub fn whole(items: Vec<Value>) -> Self {
        let total = items.len();
        Self::new(items, total)
    }
}

/// Stable sort by a field. Ties keep their original relative order.
///
/// Sorting by a field no record carries is a [`ApiError::FieldNotFound`];
/// records individually missing the field sort after all present values.
pub fn sort_records(records: &mut [Value], sort: &SortOptions) -> ApiResult<()> {
    if records.is_empty() {
        return Ok(());
    }
    if !records
        .iter()
        .any(|r| lookup_path(r, &sort.field).is_some())
    {
        return Err(ApiError::FieldNotFound(sort.field.clone()));
    }

    records.sort_by(|a, b| {
        let ordering = compare_fields(a, b, &sort.field);
        match sort.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    Ok(())
}

/// Slice a full result set. A window past the end is an empty page, not an
/// error; `total_results` always reflects the full set.
pub fn paginate(records: Vec<Value>, pagination: &PaginationOptions) -> QueryResult {
    let total = records.len();
    let items = records
        .into_iter()
        .skip(pagination.offset)
        .take(pagination.limit)
        .collect();
    QueryResult::new(items, total)
}

/// Run the full local pipeline: filter, sort, slice.
pub fn apply(
    records: &[Value],
    filters: &[QueryFilter],
    sort: Option<&SortOptions>,
    pagination: Option<&PaginationOptions>,
) -> ApiResult<QueryResult> {
    let mut filtered = apply_filters(records, filters)?;
    if let Some(sort) = sort {
        sort_records(&mut filtered, sort)?;
    }
    match pagination {
        Some(p) => Ok(paginate(filtered, p)),
        None => Ok(QueryResult::whole(filtered)),
    }
}

fn compare_fields(a: &Value, b: &Value, field: &str) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match (lookup_path(a, field), lookup_path(b, field)) {
        (Some(av), Some(bv)) => compare_values(av, bv),
        // Missing fields sort last regardless of direction handling above;
        // the direction reversal flips this, which matches how the upstream
        // orders sparse fields.
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    if let (Value::Number(an), Value::Number(bn)) = (a, b) {
        return an
            .as_f64()
            .partial_cmp(&bn.as_f64())
            .unwrap_or(Ordering::Equal);
    }
    text_of(a).cmp(&text_of(b))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
