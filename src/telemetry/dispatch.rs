//! Order dispatch span helpers.
//!
//! Provides span creation and step recording for orders flowing through
//! the dispatcher.

use tracing::Span;

use crate::engine::handoff::Step;
use crate::model::OrderId;

/// Start a span for one order's hand-off.
///
/// The `order.worker` and `order.step` fields are declared empty and are
/// filled via [`record_worker`] and [`record_step`].
pub fn start_order_span(order_id: &OrderId, capabilities: &[String]) -> Span {
    tracing::info_span!(
        "dispatch.order",
        "order.id" = %order_id,
        "order.capabilities" = ?capabilities,
        "order.worker" = tracing::field::Empty,
        "order.step" = tracing::field::Empty,
    )
}

/// Record which worker the order was handed to.
pub fn record_worker(span: &Span, identity: &str) {
    span.record("order.worker", identity);
}

/// Record that a suspension point completed.
///
/// Updates `order.step` and emits a `debug` event scoped to the span.
pub fn record_step(span: &Span, step: Step) {
    span.record("order.step", step.as_str());
    span.in_scope(|| {
        tracing::debug!(step = step.as_str(), "handoff_step");
    });
}
