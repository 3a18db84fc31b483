//! Suspension points of an order hand-off and their optional deadlines.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::ChannelError;
use crate::error::{Error, Result};

/// The four places an order can suspend, in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Waiting for the requester to send the order payload.
    OrderReceive,
    /// Handing the payload to the selected worker.
    WorkerSend,
    /// Waiting for the worker's result.
    WorkerReceive,
    /// Relaying the result back to the requester.
    OrderSend,
}

impl Step {
    pub const ALL: [Step; 4] = [
        Step::OrderReceive,
        Step::WorkerSend,
        Step::WorkerReceive,
        Step::OrderSend,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::OrderReceive => "order_receive",
            Step::WorkerSend => "worker_send",
            Step::WorkerReceive => "worker_receive",
            Step::OrderSend => "order_send",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-step deadlines. `None` waits forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadlines {
    pub order_receive: Option<Duration>,
    pub worker_send: Option<Duration>,
    pub worker_receive: Option<Duration>,
    pub order_send: Option<Duration>,
}

impl Deadlines {
    /// No deadline on any step.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// The same deadline on every step.
    pub fn uniform(limit: Duration) -> Self {
        Self {
            order_receive: Some(limit),
            worker_send: Some(limit),
            worker_receive: Some(limit),
            order_send: Some(limit),
        }
    }

    pub fn for_step(&self, step: Step) -> Option<Duration> {
        match step {
            Step::OrderReceive => self.order_receive,
            Step::WorkerSend => self.worker_send,
            Step::WorkerReceive => self.worker_receive,
            Step::OrderSend => self.order_send,
        }
    }

    /// Replace the deadline of a single step.
    pub fn with(mut self, step: Step, limit: Option<Duration>) -> Self {
        let slot = match step {
            Step::OrderReceive => &mut self.order_receive,
            Step::WorkerSend => &mut self.worker_send,
            Step::WorkerReceive => &mut self.worker_receive,
            Step::OrderSend => &mut self.order_send,
        };
        *slot = limit;
        self
    }
}

/// Await one channel operation, bounded by `deadline` when there is one.
///
/// Channel failures and elapsed deadlines are both tagged with `step`.
pub async fn suspend<T, F>(step: Step, deadline: Option<Duration>, operation: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, ChannelError>>,
{
    let outcome = match deadline {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| Error::Timeout { step })?,
        None => operation.await,
    };
    outcome.map_err(|e| e.at(step))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_overrides_only_the_named_step() {
        let d = Deadlines::unbounded().with(Step::WorkerReceive, Some(Duration::from_secs(2)));
        for step in Step::ALL {
            let expected = (step == Step::WorkerReceive).then(|| Duration::from_secs(2));
            assert_eq!(d.for_step(step), expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_reports_the_step() {
        let never = std::future::pending::<std::result::Result<(), ChannelError>>();
        let err = suspend(Step::OrderSend, Some(Duration::from_millis(50)), never)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { step: Step::OrderSend }));
    }

    #[tokio::test]
    async fn channel_failure_is_tagged_with_the_step() {
        let closed = async { Err::<(), _>(ChannelError::Closed) };
        let err = suspend(Step::WorkerSend, None, closed).await.unwrap_err();
        assert!(matches!(err, Error::ChannelClosed { step: Step::WorkerSend }));
    }
}
