//! Request routing: membership changes go to the registry, orders to the
//! dispatcher.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::dispatch::{Delivery, OrderDispatcher};
use super::handoff::Deadlines;
use crate::error::Result;
use crate::event::{Event, EventBus, EventKind};
use crate::model::{Capability, Identity, Intent, OrderId, Request};
use crate::registry::{Worker, WorkerRegistry};
use crate::telemetry::metrics;

/// What routing a request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Order relayed to `worker` and its result sent back.
    Delivered { order_id: OrderId, worker: Identity },
    /// Worker put on duty. `replaced` when an earlier entry was overwritten.
    OnDuty { identity: Identity, replaced: bool },
    /// Worker taken off duty. `was_on_duty == false` means it was unknown,
    /// which is not an error.
    OffDuty {
        identity: Identity,
        was_on_duty: bool,
    },
}

impl From<Delivery> for RouteOutcome {
    fn from(d: Delivery) -> Self {
        RouteOutcome::Delivered {
            order_id: d.order_id,
            worker: d.worker,
        }
    }
}

/// Entry point for every request the transport delivers.
#[derive(Clone)]
pub struct RequestRouter {
    registry: Arc<WorkerRegistry>,
    dispatcher: OrderDispatcher,
    events: EventBus,
}

impl RequestRouter {
    pub fn new(registry: Arc<WorkerRegistry>, events: EventBus) -> Self {
        Self {
            dispatcher: OrderDispatcher::new(Arc::clone(&registry), events.clone()),
            registry,
            events,
        }
    }

    /// Bound the dispatcher's suspension points.
    pub fn with_deadlines(mut self, deadlines: Deadlines) -> Self {
        self.dispatcher = self.dispatcher.with_deadlines(deadlines);
        self
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Route one request by its parsed [`Intent`].
    ///
    /// Membership requests complete without suspending. Orders suspend
    /// until the hand-off finishes or fails.
    ///
    /// # Errors
    ///
    /// `MissingKind` when the kind is absent or unrecognized, `MissingField`
    /// when the kind's required attributes are absent, and any dispatch
    /// error for orders. None of them touch the registry.
    pub async fn route(&self, request: Request) -> Result<RouteOutcome> {
        match request.intent()? {
            Intent::Order { capabilities } => self
                .dispatcher
                .handle_order(&request, capabilities)
                .await
                .map(RouteOutcome::from),
            Intent::WorkerOnDuty {
                identity,
                capabilities,
            } => Ok(self.on_duty(identity, capabilities, &request)),
            Intent::WorkerOffDuty { identity } => Ok(self.off_duty(identity)),
        }
    }

    fn on_duty(
        &self,
        identity: Identity,
        capabilities: Vec<Capability>,
        request: &Request,
    ) -> RouteOutcome {
        let worker = Worker::new(
            identity.clone(),
            capabilities.clone(),
            Arc::clone(request.channel()),
        );

        let replaced = self.registry.register(worker);
        info!(%identity, ?capabilities, replaced, "worker on duty");
        metrics::worker_membership().add(1, &[KeyValue::new("change", "onduty")]);
        self.events.publish(EventKind::WorkerOnDuty {
            identity: identity.clone(),
            capabilities,
            replaced,
        });

        RouteOutcome::OnDuty { identity, replaced }
    }

    fn off_duty(&self, identity: Identity) -> RouteOutcome {
        let was_on_duty = self.registry.deregister(&identity);
        if was_on_duty {
            info!(%identity, "worker off duty");
        } else {
            debug!(%identity, "off duty for unknown worker, nothing to remove");
        }
        let change = if was_on_duty { "offduty" } else { "offduty_unknown" };
        metrics::worker_membership().add(1, &[KeyValue::new("change", change)]);
        self.events.publish(EventKind::WorkerOffDuty {
            identity: identity.clone(),
            was_on_duty,
        });

        RouteOutcome::OffDuty {
            identity,
            was_on_duty,
        }
    }
}
