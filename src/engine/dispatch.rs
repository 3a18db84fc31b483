//! Order dispatch: match an order to an on-duty worker and relay the
//! worker's result back to the requester.

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Instrument, Span, debug, info, warn};

use super::handoff::{Deadlines, Step, suspend};
use crate::channel::ChannelError;
use crate::error::{Error, Result};
use crate::event::{EventBus, EventKind};
use crate::model::{Capability, Identity, OrderId, Request};
use crate::registry::WorkerRegistry;
use crate::telemetry::dispatch::{record_step, record_worker, start_order_span};
use crate::telemetry::metrics;

/// A completed order hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub order_id: OrderId,
    /// Identity of the worker that produced the result.
    pub worker: Identity,
}

/// Runs the hand-off for each order. Reads the registry, never mutates it.
#[derive(Clone)]
pub struct OrderDispatcher {
    registry: Arc<WorkerRegistry>,
    events: EventBus,
    deadlines: Deadlines,
}

impl OrderDispatcher {
    pub fn new(registry: Arc<WorkerRegistry>, events: EventBus) -> Self {
        Self {
            registry,
            events,
            deadlines: Deadlines::unbounded(),
        }
    }

    pub fn with_deadlines(mut self, deadlines: Deadlines) -> Self {
        self.deadlines = deadlines;
        self
    }

    /// Handle one order request end to end.
    ///
    /// Receives the order payload, picks a matching worker at random, forwards
    /// the payload, awaits the worker's result and sends it back to the
    /// requester. The steps run strictly in that order. `capabilities` come
    /// from the request's parsed [`Intent`](crate::model::Intent).
    ///
    /// # Errors
    ///
    /// `NoAvailableWorker` if nobody on duty serves any of the capabilities,
    /// and `Timeout` / `ChannelClosed` if a suspension point fails.
    pub async fn handle_order(
        &self,
        request: &Request,
        capabilities: Vec<Capability>,
    ) -> Result<Delivery> {
        let order_id = OrderId::new();
        let span = start_order_span(&order_id, &capabilities);
        let started = Instant::now();

        let result = self
            .relay(order_id, &capabilities, request, &span)
            .instrument(span.clone())
            .await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        span.in_scope(|| self.record_outcome(order_id, &result, elapsed_ms));

        result
    }

    fn record_outcome(&self, order_id: OrderId, result: &Result<Delivery>, elapsed_ms: f64) {
        match result {
            Ok(delivery) => {
                info!(worker = %delivery.worker, duration_ms = elapsed_ms, "order delivered");
                metrics::orders_dispatched().add(1, &[KeyValue::new("result", "delivered")]);
                metrics::handoff_duration_ms().record(elapsed_ms, &[]);
                self.events.publish(EventKind::OrderDelivered {
                    id: order_id,
                    worker: delivery.worker.clone(),
                    duration_ms: elapsed_ms as u64,
                });
            }
            // Already logged and published where the lookup came up empty.
            Err(Error::NoAvailableWorker(_)) => {
                metrics::orders_dispatched()
                    .add(1, &[KeyValue::new("result", "no_available_worker")]);
            }
            Err(e) => {
                warn!(error = %e, "order failed");
                metrics::orders_dispatched().add(1, &[KeyValue::new("result", e.label())]);
                self.events.publish(EventKind::OrderFailed {
                    id: order_id,
                    step: failed_step(e),
                    error: e.to_string(),
                });
            }
        }
    }

    async fn relay(
        &self,
        order_id: OrderId,
        capabilities: &[Capability],
        request: &Request,
        span: &Span,
    ) -> Result<Delivery> {
        let deadlines = self.deadlines;

        let order = suspend(
            Step::OrderReceive,
            deadlines.order_receive,
            request.channel().receive_next(),
        )
        .await?;
        record_step(span, Step::OrderReceive);
        self.events.publish(EventKind::OrderReceived {
            id: order_id,
            capabilities: capabilities.to_vec(),
        });

        // A worker poisoned while we waited for its channel is skipped by the
        // next pick, so this loop ends once a usable worker or nobody is left.
        let (worker, handoff) = loop {
            let Some(worker) = self.registry.pick(capabilities) else {
                warn!(?capabilities, "no on-duty worker serves this order");
                metrics::orders_unroutable().add(1, &[]);
                self.events.publish(EventKind::OrderUnroutable {
                    id: order_id,
                    capabilities: capabilities.to_vec(),
                });
                return Err(Error::NoAvailableWorker(capabilities.to_vec()));
            };

            // Waiting for the worker's previous hand-off counts against this step.
            let claimed = suspend(Step::WorkerSend, deadlines.worker_send, async {
                Ok::<_, ChannelError>(worker.begin_handoff().await)
            })
            .await?;
            match claimed {
                Some(handoff) => break (worker, handoff),
                None => {
                    debug!(worker = %worker.identity(), "worker poisoned while queued, picking again");
                }
            }
        };

        record_worker(span, worker.identity());
        info!(worker = %worker.identity(), "order assigned");
        self.events.publish(EventKind::OrderAssigned {
            id: order_id,
            worker: worker.identity().to_string(),
        });

        // From here until the result is read, any early exit drops `handoff`
        // unsettled and poisons the worker.
        suspend(
            Step::WorkerSend,
            deadlines.worker_send,
            worker.channel().send_payload(order),
        )
        .await?;
        record_step(span, Step::WorkerSend);

        let result = suspend(
            Step::WorkerReceive,
            deadlines.worker_receive,
            worker.channel().receive_next(),
        )
        .await?;
        handoff.settle();
        record_step(span, Step::WorkerReceive);

        suspend(
            Step::OrderSend,
            deadlines.order_send,
            request.channel().send_payload(result),
        )
        .await?;
        record_step(span, Step::OrderSend);

        Ok(Delivery {
            order_id,
            worker: worker.identity().to_string(),
        })
    }
}

fn failed_step(error: &Error) -> Option<Step> {
    match error {
        Error::Timeout { step } | Error::ChannelClosed { step } => Some(*step),
        _ => None,
    }
}
