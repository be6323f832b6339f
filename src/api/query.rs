//! Query model: filters, sorting, pagination, and control parameters.
//!
//! These types describe a query both ways it can be executed: serialized
//! into upstream query parameters (`field__op=value`, `sort_by`, `limit`,
//! ...) or evaluated locally by the filter/pagination engine when the
//! deployment's upstream cannot filter server-side.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ApiError, ApiResult};

/// Comparison operator for a [`QueryFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Exact,
    Contains,
    StartsWith,
    EndsWith,
    Lt,
    Lte,
    Gt,
    Gte,
    Regex,
}

impl FilterOperator {
    /// Wire suffix used by the upstream query syntax (`field__<suffix>=value`).
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Contains => "contains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Regex => "regex",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for FilterOperator {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Self::Exact),
            "contains" => Ok(Self::Contains),
            "startswith" => Ok(Self::StartsWith),
            "endswith" => Ok(Self::EndsWith),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "regex" => Ok(Self::Regex),
            other => Err(ApiError::configuration(format!(
                "unknown filter operator: {other:?}"
            ))),
        }
    }
}

/// A single field predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: String,
    pub value: Value,
    pub operator: FilterOperator,
}

impl QueryFilter {
    pub fn new(field: impl Into<String>, value: impl Into<Value>, operator: FilterOperator) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            operator,
        }
    }

    /// Exact-match filter, the most common case.
    pub fn exact(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, value, FilterOperator::Exact)
    }

    /// Substring filter.
    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, value, FilterOperator::Contains)
    }

    /// Parse a filter with an operator name supplied as a string, validating
    /// the operator at construction time.
    pub fn parse(
        field: impl Into<String>,
        value: impl Into<Value>,
        operator: &str,
    ) -> ApiResult<Self> {
        Ok(Self::new(field, value, operator.parse()?))
    }

    /// Upstream query-parameter form.
    pub fn to_param(&self) -> (String, String) {
        let value = value_to_param_string(&self.value);
        match self.operator {
            FilterOperator::Exact => (self.field.clone(), value),
            op => (format!("{}__{}", self.field, op.suffix()), value),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => f.write_str("asc"),
            Self::Desc => f.write_str("desc"),
        }
    }
}

/// Sorting options for a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortOptions {
    pub field: String,
    pub order: SortOrder,
}

impl SortOptions {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }

    /// Upstream query-parameter form.
    pub fn to_params(&self) -> Vec<(String, String)> {
        vec![
            ("sort_by".to_string(), self.field.clone()),
            ("sort_order".to_string(), self.order.to_string()),
        ]
    }
}

/// Pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationOptions {
    pub limit: usize,
    pub offset: usize,
}

impl PaginationOptions {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// Convert the page/page_size convenience form: offset = (page-1)*page_size.
    pub fn from_page(page: u32, page_size: usize) -> Self {
        let page = page.max(1) as usize;
        Self {
            limit: page_size,
            offset: (page - 1) * page_size,
        }
    }

    /// Validate against the configured maximum page size.
    pub fn validate(&self, max_limit: usize) -> ApiResult<()> {
        if self.limit == 0 {
            return Err(ApiError::configuration("pagination limit must be positive"));
        }
        if self.limit > max_limit {
            return Err(ApiError::configuration(format!(
                "pagination limit {} exceeds maximum {max_limit}",
                self.limit
            )));
        }
        Ok(())
    }

    /// Upstream query-parameter form.
    pub fn to_params(&self) -> Vec<(String, String)> {
        vec![
            ("limit".to_string(), self.limit.to_string()),
            ("offset".to_string(), self.offset.to_string()),
        ]
    }
}

/// Control parameters passed through to the upstream verbatim on mutations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ControlParameters {
    /// Apply the change to the running configuration immediately.
    pub apply: bool,
    /// Let the upstream apply asynchronously (its default).
    pub async_mode: bool,
    /// Insert position for ordered objects (0 = top).
    pub placement: Option<u32>,
    /// Append to a list field instead of replacing it.
    pub append: bool,
    /// Remove from a list field instead of replacing it.
    pub remove: bool,
}

impl Default for ControlParameters {
    fn default() -> Self {
        Self {
            apply: false,
            async_mode: true,
            placement: None,
            append: false,
            remove: false,
        }
    }
}

impl ControlParameters {
    /// Immediate-apply shorthand used by most write tools.
    pub fn applied() -> Self {
        Self {
            apply: true,
            ..Self::default()
        }
    }

    /// append and remove address opposite list edits and cannot be combined.
    pub fn validate(&self) -> ApiResult<()> {
        if self.append && self.remove {
            return Err(ApiError::configuration(
                "control parameters append and remove are mutually exclusive",
            ));
        }
        Ok(())
    }

    /// Upstream query-parameter form. Only non-default values are emitted.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if self.apply {
            params.push(("apply".to_string(), "true".to_string()));
        }
        if !self.async_mode {
            params.push(("async".to_string(), "false".to_string()));
        }
        if let Some(placement) = self.placement {
            params.push(("placement".to_string(), placement.to_string()));
        }
        if self.append {
            params.push(("append".to_string(), "true".to_string()));
        }
        if self.remove {
            params.push(("remove".to_string(), "true".to_string()));
        }
        params
    }
}

/// A complete read query: filters, sort, and pagination.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub filters: Vec<QueryFilter>,
    pub sort: Option<SortOptions>,
    pub pagination: Option<PaginationOptions>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: QueryFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, sort: SortOptions) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn paginate(mut self, pagination: PaginationOptions) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Serialize the whole spec into upstream query parameters.
    pub fn to_query_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> =
            self.filters.iter().map(|f| f.to_param()).collect();
        if let Some(sort) = &self.sort {
            params.extend(sort.to_params());
        }
        if let Some(pagination) = &self.pagination {
            params.extend(pagination.to_params());
        }
        params
    }

    /// Stable key fragment for the response cache.
    pub fn cache_key(&self) -> String {
        let params = self.to_query_params();
        serde_urlencoded::to_string(&params).unwrap_or_default()
    }
}

/// Render a JSON value the way it appears in a query string.
fn value_to_param_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_parse_roundtrip() {
        for name in [
            "exact",
            "contains",
            "startswith",
            "endswith",
            "lt",
            "lte",
            "gt",
            "gte",
            "regex",
        ] {
            let op: FilterOperator = name.parse().unwrap();
            assert_eq!(op.suffix(), name);
        }
    }

    #[test]
    fn test_unknown_operator_is_configuration_error() {
        let err = FilterOperator::from_str("fuzzy").unwrap_err();
        assert_eq!(err.kind(), "configuration_error");

        let err = QueryFilter::parse("name", "wan", "fuzzy").unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn test_filter_to_param() {
        let (key, value) = QueryFilter::exact("interface", "wan").to_param();
        assert_eq!(key, "interface");
        assert_eq!(value, "wan");

        let (key, value) =
            QueryFilter::new("destination_port", json!(1024), FilterOperator::Gt).to_param();
        assert_eq!(key, "destination_port__gt");
        assert_eq!(value, "1024");

        let (key, _) = QueryFilter::contains("name", "wan").to_param();
        assert_eq!(key, "name__contains");
    }

    #[test]
    fn test_pagination_from_page() {
        let p = PaginationOptions::from_page(1, 20);
        assert_eq!(p.limit, 20);
        assert_eq!(p.offset, 0);

        let p = PaginationOptions::from_page(3, 25);
        assert_eq!(p.limit, 25);
        assert_eq!(p.offset, 50);
    }

    #[test]
    fn test_pagination_validation() {
        assert!(PaginationOptions::new(20, 0).validate(100).is_ok());
        assert!(PaginationOptions::new(0, 0).validate(100).is_err());
        let err = PaginationOptions::new(500, 0).validate(100).unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn test_control_params_defaults_emit_nothing() {
        assert!(ControlParameters::default().to_params().is_empty());
    }

    #[test]
    fn test_control_params_emission() {
        let control = ControlParameters {
            apply: true,
            async_mode: false,
            placement: Some(0),
            append: false,
            remove: true,
        };
        let params = control.to_params();
        assert!(params.contains(&("apply".to_string(), "true".to_string())));
        assert!(params.contains(&("async".to_string(), "false".to_string())));
        assert!(params.contains(&("placement".to_string(), "0".to_string())));
        assert!(params.contains(&("remove".to_string(), "true".to_string())));
    }

    #[test]
    fn test_control_params_append_remove_exclusive() {
        let control = ControlParameters {
            append: true,
            remove: true,
            ..Default::default()
        };
        assert!(control.validate().is_err());
    }

    #[test]
    fn test_query_spec_params() {
        let spec = QuerySpec::new()
            .filter(QueryFilter::exact("status", "up"))
            .sort(SortOptions::desc("name"))
            .paginate(PaginationOptions::new(10, 20));
        let params = spec.to_query_params();
        assert_eq!(params[0], ("status".to_string(), "up".to_string()));
        assert!(params.contains(&("sort_by".to_string(), "name".to_string())));
        assert!(params.contains(&("sort_order".to_string(), "desc".to_string())));
        assert!(params.contains(&("limit".to_string(), "10".to_string())));
        assert!(params.contains(&("offset".to_string(), "20".to_string())));
    }
}
