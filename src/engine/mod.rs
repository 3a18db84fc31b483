//! Dispatch engine: request routing, order hand-off, suspension deadlines.

pub mod dispatch;
pub mod handoff;
pub mod router;

pub use dispatch::{Delivery, OrderDispatcher};
pub use handoff::{Deadlines, Step};
pub use router::{RequestRouter, RouteOutcome};
