//! Optional metrics instrumentation.
//!
//! When the `observe` feature is enabled, transaction, lock and event
//! activity is reported through the [`metrics`] crate. The application
//! installs a recorder to collect it.
//!
//! Without the feature every function here is a no-op.

/// Record a transaction commit.
///
/// - `geoaccess.transaction.commits_total`: counter with `outcome` label
/// - `geoaccess.transaction.commit_duration_seconds`: histogram
#[inline]
pub fn record_commit(duration: std::time::Duration, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("geoaccess.transaction.commits_total", "outcome" => outcome).increment(1);
        metrics::histogram!("geoaccess.transaction.commit_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, success);
    }
}

/// Record a transaction rollback.
///
/// - `geoaccess.transaction.rollbacks_total`: counter with `outcome` label
/// - `geoaccess.transaction.rollback_duration_seconds`: histogram
#[inline]
pub fn record_rollback(duration: std::time::Duration, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("geoaccess.transaction.rollbacks_total", "outcome" => outcome)
            .increment(1);
        metrics::histogram!("geoaccess.transaction.rollback_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, success);
    }
}

/// Record a lock request.
///
/// - `geoaccess.lock.requests_total`: counter with `outcome` label
///   (`acquired` / `already_held` / `conflict`)
#[inline]
pub fn record_lock(outcome: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("geoaccess.lock.requests_total", "outcome" => outcome).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = outcome;
    }
}

/// Record a dispatched feature event.
///
/// - `geoaccess.events.dispatched_total`: counter with `kind` label
/// - `geoaccess.events.deliveries_total`: counter of listener calls
#[inline]
pub fn record_event(kind: &'static str, listeners: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("geoaccess.events.dispatched_total", "kind" => kind).increment(1);
        metrics::counter!("geoaccess.events.deliveries_total").increment(listeners as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (kind, listeners);
    }
}
