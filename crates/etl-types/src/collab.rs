//! Trait boundaries for the external collaborators the core only *consumes*
//! (§1 Out of scope): authentication, metrics export, and event delivery are
//! implemented elsewhere; this crate defines the seam.

use std::collections::HashSet;

/// An authenticated caller, as handed to the core by an external auth layer.
/// Issuing, rotating, or verifying JWTs is out of scope — this struct is the
/// already-verified result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub roles: HashSet<String>,
}

impl Identity {
    pub fn new(username: impl Into<String>, roles: impl IntoIterator<Item = String>) -> Self {
        Self {
            username: username.into(),
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("ADMIN")
    }
}

/// Verifies an opaque bearer token and returns the caller's identity.
/// Token *issuance* is an external collaborator's job; this trait is only
/// the verification seam the core's HTTP surface calls through.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, bearer_token: &str) -> Result<Identity, String>;
}

/// Metrics sink the core reports counters/gauges/timers into. No wire format
/// is specified here — that's the exporter's job, entirely out of scope.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &str, value: u64);
    fn gauge(&self, name: &str, value: f64);
    fn timing(&self, name: &str, millis: u64);
}

/// Fire-and-forget domain event publication (e.g. `ConfigPlanSwitched`,
/// approval transitions). Delivery mechanics (Kafka, SNS, in-process) are an
/// external collaborator's concern.
pub trait EventBus: Send + Sync {
    fn publish(&self, topic: &str, payload: serde_json::Value);
}

/// No-op `MetricsSink` for tests and for boot configurations that don't wire
/// a real exporter.
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn increment(&self, _name: &str, _value: u64) {}
    fn gauge(&self, _name: &str, _value: f64) {}
    fn timing(&self, _name: &str, _millis: u64) {}
}

/// No-op `EventBus` for tests and for boot configurations that don't wire a
/// real bus.
pub struct NoopEventBus;

impl EventBus for NoopEventBus {
    fn publish(&self, _topic: &str, _payload: serde_json::Value) {}
}
