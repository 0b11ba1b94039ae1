/// Session gauges.
pub mod gauges {
    /// Increment the active sessions gauge.
    pub fn inc_sessions_active() {
        metrics::gauge!("cxp_sessions_active").increment(1.0);
    }

    /// Decrement the active sessions gauge.
    pub fn dec_sessions_active() {
        metrics::gauge!("cxp_sessions_active").decrement(1.0);
    }
}

/// Event counters.
pub mod counters {
    /// Record an authentication attempt with the given status label.
    pub fn auth_total(status: &'static str) {
        metrics::counter!("cxp_auth_total", "status" => status).increment(1);
    }

    /// Increment the routed-messages counter.
    pub fn messages_routed_total() {
        metrics::counter!("cxp_messages_routed_total").increment(1);
    }

    /// Increment the failed-delivery counter with the given reason label.
    pub fn messages_failed_total(reason: &'static str) {
        metrics::counter!("cxp_messages_failed_total", "reason" => reason).increment(1);
    }

    /// Increment the silently-dropped counter with the given reason label.
    pub fn messages_dropped_total(reason: &'static str) {
        metrics::counter!("cxp_messages_dropped_total", "reason" => reason).increment(1);
    }

    /// Record a heartbeat datagram with the given status label.
    pub fn heartbeats_total(status: &'static str) {
        metrics::counter!("cxp_heartbeats_total", "status" => status).increment(1);
    }

    /// Record one broadcast and the number of recipients attempted.
    pub fn broadcast(recipients: u64) {
        metrics::counter!("cxp_broadcasts_total").increment(1);
        metrics::counter!("cxp_broadcast_recipients_total").increment(recipients);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record a route lookup-and-hand-off latency observation in seconds.
    pub fn route_latency_seconds(value: f64) {
        metrics::histogram!("cxp_route_latency_seconds").record(value);
    }
}
