//! Structured risk alerts.
//!
//! Alerts are emitted as single-line JSON on the `risk_alert` target so an
//! operator channel can pick them up from the log stream.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{error, info, warn};

use super::circuit_breaker::BreakerTrigger;
use crate::exchange::OrderSide;

/// Severity levels for alerts.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    /// Get display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Error => "ERROR",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

/// Types of risk alerts.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum RiskAlertType {
    /// Market conditions halted trading
    CircuitBreakerTripped { triggers: Vec<BreakerTrigger> },
    /// Breaker re-armed after cooldown
    CircuitBreakerReset,
    /// A maker fill could not be (fully) hedged
    HedgeFailure {
        side: OrderSide,
        quantity: Decimal,
        unhedged: Decimal,
        reason: String,
    },
    /// Net delta outside tolerance
    NetDeltaViolation { net_delta: Decimal, tolerance: Decimal },
    /// Engine stopped or paused trading pending operator action
    TradingSuspended { reason: String },
}

/// A risk alert.
#[derive(Debug, Clone, Serialize)]
pub struct RiskAlert {
    pub alert_id: String,
    pub timestamp: DateTime<Utc>,
    pub alert_type: RiskAlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub metrics: HashMap<String, Decimal>,
    pub suggested_action: String,
}

impl RiskAlert {
    /// Create a new risk alert.
    pub fn new(
        alert_type: RiskAlertType,
        severity: AlertSeverity,
        message: String,
        suggested_action: String,
    ) -> Self {
        let timestamp = Utc::now();
        let alert_id = format!(
            "risk-{}-{}",
            timestamp.timestamp(),
            timestamp.timestamp_subsec_nanos()
        );

        Self {
            alert_id,
            timestamp,
            alert_type,
            severity,
            message,
            metrics: HashMap::new(),
            suggested_action,
        }
    }

    /// Add a metric to the alert.
    pub fn with_metric(mut self, key: &str, value: Decimal) -> Self {
        self.metrics.insert(key.to_string(), value);
        self
    }

    /// Emit as structured log for workflow parsing.
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();

        match self.severity {
            AlertSeverity::Info => info!(target: "risk_alert", "RISK_ALERT: {}", json),
            AlertSeverity::Warning => warn!(target: "risk_alert", "RISK_ALERT: {}", json),
            AlertSeverity::Error => error!(target: "risk_alert", "RISK_ALERT: {}", json),
            AlertSeverity::Critical => error!(target: "risk_alert", "RISK_ALERT: {}", json),
        }
    }
}
