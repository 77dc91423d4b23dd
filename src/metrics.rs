//! Client-side metrics.
//!
//! Everything goes through the `metrics` facade.  The library never installs
//! a recorder; an application that wants the numbers installs its own
//! exporter and calls [`describe_metrics`] once.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

use crate::errors::ClientError;

// -- Metric name constants ----------------------------------------------------

/// Total client operations (counter). Labels: operation, status.
pub const OPERATIONS_TOTAL: &str = "spaces_client_operations_total";

/// Operation duration in seconds (histogram). Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "spaces_client_operation_duration_seconds";

/// Requests retried after a connection failure or timeout (counter). Labels: method.
pub const RETRIES_TOTAL: &str = "spaces_client_retries_total";

/// Total bytes uploaded in request bodies (counter).
pub const BYTES_SENT_TOTAL: &str = "spaces_client_bytes_sent_total";

/// Total bytes downloaded in response bodies (counter).
pub const BYTES_RECEIVED_TOTAL: &str = "spaces_client_bytes_received_total";

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(OPERATIONS_TOTAL, "Total object storage operations by type");
    describe_histogram!(
        OPERATION_DURATION_SECONDS,
        "Object storage operation duration in seconds"
    );
    describe_counter!(RETRIES_TOTAL, "Requests retried after a transport failure");
    describe_counter!(BYTES_SENT_TOTAL, "Total bytes uploaded (request bodies)");
    describe_counter!(BYTES_RECEIVED_TOTAL, "Total bytes downloaded (response bodies)");
}

/// Status label for an operation outcome: `ok` or the error kind.
pub fn status_label<T>(result: &Result<T, ClientError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    }
}

/// Record one finished operation.
pub fn record_operation(operation: &'static str, status: &'static str, elapsed: Duration) {
    counter!(OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
    histogram!(OPERATION_DURATION_SECONDS, "operation" => operation).record(elapsed.as_secs_f64());
}

pub fn record_retry(method: &str) {
    counter!(RETRIES_TOTAL, "method" => method.to_string()).increment(1);
}

pub fn record_bytes_sent(bytes: u64) {
    counter!(BYTES_SENT_TOTAL).increment(bytes);
}

pub fn record_bytes_received(bytes: u64) {
    counter!(BYTES_RECEIVED_TOTAL).increment(bytes);
}

// -- Tests --------------------------------------------------------------------
