//! Firewall log tools: search and blocked-traffic analysis.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use rmcp::handler::server::tool::cached_schema_for_type;
use rmcp::model::Tool;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use super::common::{list_envelope, parse_params};
use crate::api::endpoints;
use crate::api::envelope::Envelope;
use crate::api::error::{ApiError, ApiResult};
use crate::api::query::{PaginationOptions, QueryFilter, QuerySpec, SortOptions};
use crate::core::security::AccessLevel;
use crate::domains::tools::registry::{ToolContext, ToolDefinition};

fn default_lines() -> usize {
    50
}

fn default_analysis_limit() -> usize {
    100
}

fn default_true() -> bool {
    true
}

// ============================================================================
// search_firewall_logs
// ============================================================================

/// Parameters for log search.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchFirewallLogsParams {
    #[schemars(description = "Filter by action (block, pass, reject)")]
    pub action: Option<String>,

    #[schemars(description = "Filter by source IP address")]
    pub source_ip: Option<String>,

    #[schemars(description = "Filter by destination IP address")]
    pub destination_ip: Option<String>,

    #[schemars(description = "Number of log entries to return")]
    #[serde(default = "default_lines")]
    pub lines: usize,
}

/// Search firewall log entries, newest first.
#[derive(Debug, Clone)]
pub struct SearchFirewallLogsTool;

impl SearchFirewallLogsTool {
    pub const NAME: &'static str = "search_firewall_logs";
    pub const DESCRIPTION: &'static str = "Search firewall log entries by action or address, \
        returning the most recent matches first.";
}

#[async_trait]
impl ToolDefinition for SearchFirewallLogsTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<SearchFirewallLogsParams>(),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        }
    }

    fn min_access(&self) -> AccessLevel {
        AccessLevel::ComplianceRead
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ApiResult<Envelope> {
        let params: SearchFirewallLogsParams = parse_params(args)?;
        if params.lines == 0 || params.lines > ctx.query.max_page_size {
            return Err(ApiError::configuration(format!(
                "lines must be between 1 and {}",
                ctx.query.max_page_size
            )));
        }

        let mut spec = QuerySpec::new();
        if let Some(action) = &params.action {
            spec = spec.filter(QueryFilter::exact("action", action.as_str()));
        }
        if let Some(source) = &params.source_ip {
            spec = spec.filter(QueryFilter::exact("src_ip", source.as_str()));
        }
        if let Some(destination) = &params.destination_ip {
            spec = spec.filter(QueryFilter::exact("dst_ip", destination.as_str()));
        }
        spec = spec
            .sort(SortOptions::desc("timestamp"))
            .paginate(PaginationOptions::new(params.lines, 0));

        let outcome = ctx.client.query(endpoints::LOG_FIREWALL, &spec).await?;
        Ok(list_envelope(
            ctx,
            endpoints::LOG_FIREWALL,
            "log entry(ies)",
            outcome,
            1,
            params.lines,
        ))
    }
}

// ============================================================================
// analyze_blocked_traffic
// ============================================================================

/// Parameters for blocked-traffic analysis.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AnalyzeBlockedTrafficParams {
    #[schemars(description = "Maximum number of log entries to analyze")]
    #[serde(default = "default_analysis_limit")]
    pub limit: usize,

    #[schemars(description = "Group results by source IP")]
    #[serde(default = "default_true")]
    pub group_by_source: bool,
}

/// Summarize blocked traffic patterns from the firewall log.
#[derive(Debug, Clone)]
pub struct AnalyzeBlockedTrafficTool;

impl AnalyzeBlockedTrafficTool {
    pub const NAME: &'static str = "analyze_blocked_traffic";
    pub const DESCRIPTION: &'static str = "Analyze recent blocked traffic, grouping entries \
        by source IP with contacted ports, destinations, and a simple threat score.";
}

#[async_trait]
impl ToolDefinition for AnalyzeBlockedTrafficTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<AnalyzeBlockedTrafficParams>(),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        }
    }

    fn min_access(&self) -> AccessLevel {
        AccessLevel::ComplianceRead
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ApiResult<Envelope> {
        let params: AnalyzeBlockedTrafficParams = parse_params(args)?;

        let spec = QuerySpec::new()
            .filter(QueryFilter::exact("action", "block"))
            .sort(SortOptions::desc("timestamp"))
            .paginate(PaginationOptions::new(params.limit.max(1), 0));
        let outcome = ctx.client.query(endpoints::LOG_FIREWALL, &spec).await?;
        let entries = outcome.items;

        let analysis = if params.group_by_source {
            group_by_source(&entries)
        } else {
            json!({"grouped_by": "none", "raw_entries": entries})
        };

        Ok(Envelope::ok(format!(
            "Analyzed {} blocked-traffic log entry(ies)",
            entries_analyzed(&analysis)
        ))
        .with_data(analysis)
        .with_count(outcome.total_results))
    }
}

#[derive(Default)]
struct SourceStats {
    count: usize,
    ports: BTreeSet<String>,
    destinations: BTreeSet<String>,
    latest_time: Option<String>,
}

/// Aggregate blocked entries per source IP; the top 20 sources by hit
/// count are reported.
fn group_by_source(entries: &[Value]) -> Value {
    let mut stats: BTreeMap<String, SourceStats> = BTreeMap::new();

    for entry in entries {
        let source = entry
            .get("src_ip")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let stat = stats.entry(source).or_default();
        stat.count += 1;
        if let Some(port) = entry.get("dst_port") {
            stat.ports.insert(text_of(port));
        }
        if let Some(dst) = entry.get("dst_ip").and_then(|v| v.as_str()) {
            stat.destinations.insert(dst.to_string());
        }
        if stat.latest_time.is_none() {
            // Entries arrive newest first.
            stat.latest_time = entry
                .get("timestamp")
                .and_then(|v| v.as_str())
                .map(String::from);
        }
    }

    let mut ranked: Vec<(String, SourceStats)> = stats.into_iter().collect();
    ranked.sort_by(|a, b| b.1.count.cmp(&a.1.count));

    let top_sources: BTreeMap<String, Value> = ranked
        .iter()
        .take(20)
        .map(|(ip, stat)| {
            (
                ip.clone(),
                json!({
                    "count": stat.count,
                    "ports": stat.ports,
                    "destinations": stat.destinations,
                    "latest_time": stat.latest_time,
                    "threat_score": threat_score(stat.count),
                }),
            )
        })
        .collect();

    json!({
        "grouped_by": "source_ip",
        "total_entries": entries.len(),
        "total_unique_sources": ranked.len(),
        "top_sources": top_sources,
    })
}

/// Crude 0-10 score: one point per ten blocked hits.
fn threat_score(count: usize) -> f64 {
    (count as f64 / 10.0).min(10.0)
}

fn entries_analyzed(analysis: &Value) -> u64 {
    analysis
        .get("total_entries")
        .and_then(|v| v.as_u64())
        .unwrap_or_else(|| {
            analysis
                .get("raw_entries")
                .and_then(|v| v.as_array())
                .map(|a| a.len() as u64)
                .unwrap_or(0)
        })
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked_entries() -> Vec<Value> {
        vec![
            json!({"src_ip": "203.0.113.9", "dst_ip": "10.0.0.1", "dst_port": 22, "timestamp": "t3"}),
            json!({"src_ip": "203.0.113.9", "dst_ip": "10.0.0.2", "dst_port": 23, "timestamp": "t2"}),
            json!({"src_ip": "198.51.100.4", "dst_ip": "10.0.0.1", "dst_port": 443, "timestamp": "t1"}),
        ]
    }

    #[test]
    fn test_group_by_source_counts_and_sets() {
        let analysis = group_by_source(&blocked_entries());
        assert_eq!(analysis["total_unique_sources"], json!(2));
        let top = &analysis["top_sources"]["203.0.113.9"];
        assert_eq!(top["count"], json!(2));
        assert_eq!(top["ports"], json!(["22", "23"]));
        assert_eq!(top["latest_time"], json!("t3"));
    }

    #[test]
    fn test_threat_score_caps_at_ten() {
        assert_eq!(threat_score(5), 0.5);
        assert_eq!(threat_score(40), 4.0);
        assert_eq!(threat_score(500), 10.0);
    }

    #[test]
    fn test_log_params_defaults() {
        let params: SearchFirewallLogsParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(params.lines, 50);
        let params: AnalyzeBlockedTrafficParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(params.limit, 100);
        assert!(params.group_by_source);
    }
}
