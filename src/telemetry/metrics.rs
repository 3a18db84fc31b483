//! Metric instrument factories for brigade.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"brigade"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for brigade instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("brigade")
}

/// Counter: orders that finished dispatch.
/// Labels: `result` ("delivered" | error label, e.g. "timeout").
pub fn orders_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("brigade.orders.dispatched")
        .with_description("Number of orders that finished dispatch")
        .build()
}

/// Counter: orders with no on-duty worker serving any requested capability.
pub fn orders_unroutable() -> Counter<u64> {
    meter()
        .u64_counter("brigade.orders.unroutable")
        .with_description("Orders with no matching on-duty worker")
        .build()
}

/// Counter: worker membership changes.
/// Labels: `change` ("onduty" | "offduty" | "offduty_unknown").
pub fn worker_membership() -> Counter<u64> {
    meter()
        .u64_counter("brigade.workers.membership")
        .with_description("Number of worker membership changes")
        .build()
}

/// Histogram: end-to-end hand-off duration in milliseconds.
pub fn handoff_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("brigade.handoff.duration_ms")
        .with_description("Order hand-off duration in milliseconds")
        .with_unit("ms")
        .build()
}
