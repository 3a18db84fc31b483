//! # brigade
//!
//! Routes orders to a pool of capability-tagged workers.
//!
//! Workers go on and off duty through membership requests; orders declare
//! the capabilities they need and are handed to a randomly chosen on-duty
//! worker serving any of them. The worker's result is relayed back to the
//! requester over the order's own channel.

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod registry;
pub mod roster;
pub mod telemetry;
