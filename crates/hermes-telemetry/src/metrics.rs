//! Metric names and recording helpers.
//!
//! Recording goes through the `metrics` facade and is a no-op until the host
//! application installs a recorder.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Completed exchanges by side and outcome.
pub const EXCHANGES_TOTAL: &str = "hermes_exchanges_total";

/// Exchange latency in seconds.
pub const EXCHANGE_DURATION_SECONDS: &str = "hermes_exchange_duration_seconds";

/// Faults returned by handler callbacks.
pub const HANDLER_FAULTS_TOTAL: &str = "hermes_handler_faults_total";

/// Async submissions by result.
pub const ASYNC_SUBMISSIONS_TOTAL: &str = "hermes_async_submissions_total";

/// One-way faults suppressed after handoff.
pub const ONE_WAY_SUPPRESSED_TOTAL: &str = "hermes_one_way_suppressed_total";

/// Registers descriptions for all standard metrics with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(EXCHANGES_TOTAL, "Total message exchanges by side and outcome");
    describe_histogram!(EXCHANGE_DURATION_SECONDS, "Message exchange duration in seconds");
    describe_counter!(HANDLER_FAULTS_TOTAL, "Faults returned by handler callbacks");
    describe_counter!(ASYNC_SUBMISSIONS_TOTAL, "Async invocations submitted to the executor");
    describe_counter!(
        ONE_WAY_SUPPRESSED_TOTAL,
        "One-way faults suppressed after the exchange was handed off"
    );
}

/// Records a completed exchange.
///
/// * `side` - "client" or "server"
/// * `outcome` - e.g. "completed", "reversed", "fault"
pub fn record_exchange(side: &'static str, outcome: &'static str, duration: Duration) {
    counter!(EXCHANGES_TOTAL, "side" => side, "outcome" => outcome).increment(1);
    histogram!(EXCHANGE_DURATION_SECONDS, "side" => side).record(duration.as_secs_f64());
}

/// Records a fault returned by a handler callback.
pub fn record_handler_fault(handler: &str) {
    counter!(HANDLER_FAULTS_TOTAL, "handler" => handler.to_string()).increment(1);
}

/// Records an async submission; `result` is "accepted" or "rejected".
pub fn record_async_submission(result: &'static str) {
    counter!(ASYNC_SUBMISSIONS_TOTAL, "result" => result).increment(1);
}

/// Records a one-way fault suppressed after handoff.
pub fn record_one_way_suppressed() {
    counter!(ONE_WAY_SUPPRESSED_TOTAL).increment(1);
}
