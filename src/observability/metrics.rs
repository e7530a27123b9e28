//! # Metrics Collection
//!
//! Counters and gauges for lease maintenance, recorded through the
//! `metrics` facade. Without an installed exporter every call is a no-op,
//! so the runtime records unconditionally.

use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};

/// Register metric descriptions with the installed recorder.
///
/// Optional; call once after installing an exporter.
pub fn describe_metrics() {
    describe_counter!(
        "latchkey_requests_total",
        Unit::Count,
        "Requests issued against the secret-management service"
    );
    describe_counter!(
        "latchkey_renewals_total",
        Unit::Count,
        "Lease renewal attempts by outcome"
    );
    describe_counter!(
        "latchkey_rotations_total",
        Unit::Count,
        "Lease rotation attempts by outcome"
    );
    describe_counter!(
        "latchkey_leases_expired_total",
        Unit::Count,
        "Leases dropped after expiring with no recovery path"
    );
    describe_gauge!("latchkey_leases_held", Unit::Count, "Lease records currently cached");
}

/// Metrics recorder for the client runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance.
    pub fn new() -> Self {
        Self
    }

    /// Record one request outcome.
    pub fn record_request(&self, operation: &str, success: bool) {
        let labels = [
            ("operation", operation.to_string()),
            ("outcome", if success { "success" } else { "error" }.to_string()),
        ];
        counter!("latchkey_requests_total", &labels).increment(1);
    }

    /// Record one renewal attempt outcome.
    pub fn record_renewal(&self, success: bool) {
        let labels = [("outcome", if success { "success" } else { "error" }.to_string())];
        counter!("latchkey_renewals_total", &labels).increment(1);
    }

    /// Record one rotation attempt outcome.
    pub fn record_rotation(&self, success: bool) {
        let labels = [("outcome", if success { "success" } else { "error" }.to_string())];
        counter!("latchkey_rotations_total", &labels).increment(1);
    }

    /// Record a lease dropped at expiry.
    pub fn record_expired_lease(&self) {
        counter!("latchkey_leases_expired_total").increment(1);
    }

    /// Update the held-leases gauge.
    pub fn update_leases_held(&self, count: usize) {
        gauge!("latchkey_leases_held").set(count as f64);
    }
}
