//! Asset events and the consumer that turns them into rule executions.
//!
//! Events arrive on a `tokio::sync::mpsc` channel, typically fed by a JSON-lines
//! reader. Each event is handed to [`RuleEngine::dispatch_event`]; a failing
//! event is logged and counted, and the consumer moves on to the next one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::constants::{METRIC_RULE_EVENT, METRIC_RULE_EVENT_FAILURES, METRIC_RULE_EVENT_RULES};
use crate::engine::node::TriggerKind;
use crate::engine::service::RuleEngine;
use crate::errors::ConsumerError;
use crate::metrics::SharedMetricsPublisher;

/// Receiver for [`RuleEvent`] instances produced by an event source.
pub type RuleEventReceiver = mpsc::Receiver<RuleEvent>;

/// The asset an event is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub tenant_id: String,
    pub asset_id: String,
    pub asset_type_id: String,
}

/// A change to an asset that may start rules.
///
/// ```rust
/// use assetrules::consumer::RuleEvent;
///
/// let event: RuleEvent = serde_json::from_str(
///     r#"{"type":"telemetry_change","tenantId":"t1","assetId":"a1",
///         "assetTypeId":"well","telemetryKey":"pressure","value":612.5}"#,
/// ).unwrap();
///
/// assert_eq!(event.trigger_key(), Some("pressure"));
/// assert_eq!(event.trigger_payload()["value"], 612.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleEvent {
    #[serde(rename_all = "camelCase")]
    TelemetryChange {
        #[serde(flatten)]
        asset: AssetRef,
        telemetry_key: String,
        #[serde(default)]
        value: Value,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    AttributeChange {
        #[serde(flatten)]
        asset: AssetRef,
        attribute_key: String,
        #[serde(default)]
        old_value: Value,
        #[serde(default)]
        new_value: Value,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    StatusChange {
        #[serde(flatten)]
        asset: AssetRef,
        #[serde(default)]
        old_status: Option<String>,
        new_status: String,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    Schedule {
        #[serde(flatten)]
        asset: AssetRef,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Runs every matching rule, or only `rule_id` when given.
    #[serde(rename_all = "camelCase")]
    Manual {
        #[serde(flatten)]
        asset: AssetRef,
        #[serde(default)]
        rule_id: Option<String>,
        #[serde(default)]
        payload: Option<Value>,
    },
}

impl RuleEvent {
    /// Parses one JSON-encoded event.
    pub fn parse(line: &str) -> Result<Self, ConsumerError> {
        serde_json::from_str(line).map_err(|e| ConsumerError::InvalidEvent {
            details: e.to_string(),
        })
    }

    pub fn asset(&self) -> &AssetRef {
        match self {
            RuleEvent::TelemetryChange { asset, .. }
            | RuleEvent::AttributeChange { asset, .. }
            | RuleEvent::StatusChange { asset, .. }
            | RuleEvent::Schedule { asset, .. }
            | RuleEvent::Manual { asset, .. } => asset,
        }
    }

    pub fn trigger_kind(&self) -> TriggerKind {
        match self {
            RuleEvent::TelemetryChange { .. } => TriggerKind::TelemetryChange,
            RuleEvent::AttributeChange { .. } => TriggerKind::AttributeChange,
            RuleEvent::StatusChange { .. } => TriggerKind::StatusChange,
            RuleEvent::Schedule { .. } => TriggerKind::Schedule,
            RuleEvent::Manual { .. } => TriggerKind::Manual,
        }
    }

    /// The telemetry or attribute key that changed, matched against trigger
    /// key filters.
    pub fn trigger_key(&self) -> Option<&str> {
        match self {
            RuleEvent::TelemetryChange { telemetry_key, .. } => Some(telemetry_key),
            RuleEvent::AttributeChange { attribute_key, .. } => Some(attribute_key),
            _ => None,
        }
    }

    /// Restricts a manual event to a single rule.
    pub fn rule_id(&self) -> Option<&str> {
        match self {
            RuleEvent::Manual { rule_id, .. } => rule_id.as_deref(),
            _ => None,
        }
    }

    /// The payload handed to the trigger node. Missing timestamps read as now.
    pub fn trigger_payload(&self) -> Value {
        let now = Utc::now();
        match self {
            RuleEvent::TelemetryChange {
                telemetry_key,
                value,
                timestamp,
                ..
            } => json!({
                "telemetryKey": telemetry_key,
                "value": value,
                "timestamp": timestamp.unwrap_or(now),
            }),
            RuleEvent::AttributeChange {
                attribute_key,
                old_value,
                new_value,
                timestamp,
                ..
            } => json!({
                "attributeKey": attribute_key,
                "oldValue": old_value,
                "newValue": new_value,
                "timestamp": timestamp.unwrap_or(now),
            }),
            RuleEvent::StatusChange {
                old_status,
                new_status,
                timestamp,
                ..
            } => json!({
                "oldStatus": old_status,
                "newStatus": new_status,
                "timestamp": timestamp.unwrap_or(now),
            }),
            RuleEvent::Schedule { timestamp, .. } => json!({
                "timestamp": timestamp.unwrap_or(now),
            }),
            RuleEvent::Manual { payload, .. } => payload.clone().unwrap_or_else(|| json!({})),
        }
    }
}

/// Pulls events off the channel and dispatches them until cancelled or until
/// every sender is dropped.
pub struct RuleEventConsumer {
    engine: RuleEngine,
    receiver: RuleEventReceiver,
    cancel_token: CancellationToken,
    metrics: SharedMetricsPublisher,
    events_processed: Arc<AtomicU64>,
    events_failed: Arc<AtomicU64>,
}

impl RuleEventConsumer {
    pub fn new(
        engine: RuleEngine,
        receiver: RuleEventReceiver,
        cancel_token: CancellationToken,
        metrics: SharedMetricsPublisher,
    ) -> Self {
        Self {
            engine,
            receiver,
            cancel_token,
            metrics,
            events_processed: Arc::new(AtomicU64::new(0)),
            events_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared `(processed, failed)` counters, readable while the consumer runs.
    pub fn counters(&self) -> (Arc<AtomicU64>, Arc<AtomicU64>) {
        (self.events_processed.clone(), self.events_failed.clone())
    }

    pub async fn run(mut self) -> Result<(), ConsumerError> {
        info!("Rule event consumer started");

        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    info!("Rule event consumer cancelled");
                    break;
                }
                event = self.receiver.recv() => {
                    let Some(event) = event else {
                        info!("Event channel closed");
                        break;
                    };
                    self.handle(event).await;
                }
            }
        }

        info!(
            events_processed = self.events_processed.load(Ordering::Relaxed),
            events_failed = self.events_failed.load(Ordering::Relaxed),
            "Rule event consumer stopped"
        );
        Ok(())
    }

    async fn handle(&self, event: RuleEvent) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        let kind = event.trigger_kind();
        self.metrics
            .incr_with_tags(METRIC_RULE_EVENT, &[("trigger", kind.as_str())])
            .await;

        match self.engine.dispatch_event(&event).await {
            Ok(results) => {
                let failed = results.iter().filter(|(_, r)| !r.success).count();
                self.metrics
                    .count(METRIC_RULE_EVENT_RULES, results.len() as u64)
                    .await;
                if failed > 0 {
                    self.metrics
                        .count(METRIC_RULE_EVENT_FAILURES, failed as u64)
                        .await;
                }
                debug!(
                    tenant.id = %event.asset().tenant_id,
                    asset.id = %event.asset().asset_id,
                    trigger = %kind,
                    rules = results.len(),
                    failed,
                    "Event dispatched"
                );
                if failed > 0 {
                    warn!(
                        asset.id = %event.asset().asset_id,
                        failed,
                        "Some rules failed for event"
                    );
                }
            }
            Err(e) => {
                self.events_failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    tenant.id = %event.asset().tenant_id,
                    asset.id = %event.asset().asset_id,
                    trigger = %kind,
                    error = %e,
                    "Failed to dispatch event"
                );
            }
        }
    }
}
