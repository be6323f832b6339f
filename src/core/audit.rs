//! Audit events for tool dispatch.
//!
//! Every dispatch, successful or not, produces exactly one event. Events
//! are handed to an [`AuditSink`]; durable storage lives outside this
//! process, so the default sink emits structured tracing records and an
//! in-memory sink backs the tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

use super::security::AccessLevel;

/// One record per tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub access_level: AccessLevel,
    pub tool: String,
    pub parameters: Value,
    pub result_summary: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Destination for audit events. Implementations must not block dispatch
/// on downstream failures.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Default sink: one structured tracing record per event.
pub struct TracingAuditSink;

#[async_trait::async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        if event.success {
            tracing::info!(
                target: "audit",
                user_id = %event.user_id,
                access_level = %event.access_level,
                tool = %event.tool,
                duration_ms = event.duration_ms,
                summary = %event.result_summary,
                "tool invocation"
            );
        } else {
            tracing::warn!(
                target: "audit",
                user_id = %event.user_id,
                access_level = %event.access_level,
                tool = %event.tool,
                duration_ms = event.duration_ms,
                error = event.error.as_deref().unwrap_or("unknown"),
                "tool invocation failed"
            );
        }
    }
}

/// In-memory sink for assertions in tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit sink poisoned").clone()
    }
}

#[async_trait::async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().expect("audit sink poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(success: bool) -> AuditEvent {
        AuditEvent {
            timestamp: Utc::now(),
            user_id: "ops".to_string(),
            access_level: AccessLevel::ReadOnly,
            tool: "system_status".to_string(),
            parameters: json!({}),
            result_summary: "ok".to_string(),
            success,
            error: if success { None } else { Some("boom".to_string()) },
            duration_ms: 12,
        }
    }

    #[tokio::test]
    async fn test_memory_sink_collects_events() {
        let sink = MemoryAuditSink::new();
        sink.record(sample(true)).await;
        sink.record(sample(false)).await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].success);
        assert_eq!(events[1].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_event_serialization_skips_absent_error() {
        let serialized = serde_json::to_value(sample(true)).unwrap();
        assert!(serialized.get("error").is_none());
        assert_eq!(serialized["access_level"], json!("READ_ONLY"));
        assert_eq!(serialized["duration_ms"], json!(12));
    }
}
