//! Local filter evaluation against JSON records.
//!
//! Used when the upstream cannot filter server-side, and by tools that
//! post-process result sets (e.g. narrowing blocked rules to one
//! interface). Field access is an explicit dotted-path lookup; a missing
//! segment yields "no match" rather than an error.

use regex::Regex;
use serde_json::Value;

use super::error::{ApiError, ApiResult};
use super::query::{FilterOperator, QueryFilter};

/// Look up a dotted field path (`a.b.c`) in a JSON object.
pub fn lookup_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Evaluate one filter against one record.
pub fn matches(record: &Value, filter: &QueryFilter) -> ApiResult<bool> {
    let Some(field_value) = lookup_path(record, &filter.field) else {
        return Ok(false);
    };

    match filter.operator {
        FilterOperator::Exact => Ok(exact_match(field_value, &filter.value)),
        FilterOperator::Contains => {
            Ok(as_text(field_value).contains(&as_text(&filter.value)))
        }
        FilterOperator::StartsWith => {
            Ok(as_text(field_value).starts_with(&as_text(&filter.value)))
        }
        FilterOperator::EndsWith => {
            Ok(as_text(field_value).ends_with(&as_text(&filter.value)))
        }
        FilterOperator::Lt | FilterOperator::Lte | FilterOperator::Gt | FilterOperator::Gte => {
            ordered_match(field_value, filter)
        }
        FilterOperator::Regex => regex_match(field_value, filter),
    }
}

/// Evaluate all filters (logical AND); the empty list matches everything.
pub fn matches_all(record: &Value, filters: &[QueryFilter]) -> ApiResult<bool> {
    for filter in filters {
        if !matches(record, filter)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Filter a record set, preserving original order.
pub fn apply_filters(records: &[Value], filters: &[QueryFilter]) -> ApiResult<Vec<Value>> {
    let mut out = Vec::new();
    for record in records {
        if matches_all(record, filters)? {
            out.push(record.clone());
        }
    }
    Ok(out)
}

/// Equality after coercing the filter value to the field's native type.
fn exact_match(field_value: &Value, filter_value: &Value) -> bool {
    if field_value == filter_value {
        return true;
    }
    match field_value {
        // Numeric field: accept "1024" for 1024.
        Value::Number(_) => match (as_number(field_value), as_number(filter_value)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        Value::Bool(b) => match filter_value {
            Value::String(s) => s.eq_ignore_ascii_case(if *b { "true" } else { "false" }),
            _ => false,
        },
        Value::String(s) => *s == as_text(filter_value),
        _ => false,
    }
}

/// Numeric comparison when both sides coerce, lexical when the field is a
/// string and the filter value is not numeric.
fn ordered_match(field_value: &Value, filter: &QueryFilter) -> ApiResult<bool> {
    use std::cmp::Ordering;

    let ordering = match (as_number(field_value), as_number(&filter.value)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        (Some(_), None) => {
            return Err(ApiError::TypeConversion {
                field: filter.field.clone(),
                value: as_text(&filter.value),
            });
        }
        _ => as_text(field_value).as_str().partial_cmp(as_text(&filter.value).as_str()),
    };

    let Some(ordering) = ordering else {
        return Ok(false);
    };

    Ok(match filter.operator {
        FilterOperator::Lt => ordering == Ordering::Less,
        FilterOperator::Lte => ordering != Ordering::Greater,
        FilterOperator::Gt => ordering == Ordering::Greater,
        FilterOperator::Gte => ordering != Ordering::Less,
        _ => unreachable!("ordered_match called with non-ordered operator"),
    })
}

fn regex_match(field_value: &Value, filter: &QueryFilter) -> ApiResult<bool> {
    let pattern = as_text(&filter.value);
    let regex = Regex::new(&pattern).map_err(|e| ApiError::InvalidPattern {
        pattern: pattern.clone(),
        message: e.to_string(),
    })?;
    Ok(regex.is_match(&as_text(field_value)))
}

/// String representation used by substring and regex operators.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
