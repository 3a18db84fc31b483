//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if a value is present but malformed.

use std::str::FromStr;
use std::time::Duration;

use crate::engine::handoff::Deadlines;
use crate::error::{Error, Result};

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Deadline applied to every hand-off step. `None` waits forever.
    pub handoff_timeout: Option<Duration>,
    /// Buffer size of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            otel_endpoint: None,
            log_level: "info".to_string(),
            handoff_timeout: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let handoff_timeout = match optional_var::<u64>("BRIGADE_HANDOFF_TIMEOUT_MS")? {
            Some(0) => {
                return Err(Error::Config(
                    "BRIGADE_HANDOFF_TIMEOUT_MS must be greater than zero".to_string(),
                ));
            }
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };

        let event_capacity = optional_var::<usize>("BRIGADE_EVENT_CAPACITY")?
            .unwrap_or(DEFAULT_EVENT_CAPACITY);
        if event_capacity == 0 {
            return Err(Error::Config(
                "BRIGADE_EVENT_CAPACITY must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            handoff_timeout,
            event_capacity,
        })
    }

    /// Hand-off deadlines implied by `handoff_timeout`.
    pub fn deadlines(&self) -> Deadlines {
        match self.handoff_timeout {
            Some(limit) => Deadlines::uniform(limit),
            None => Deadlines::unbounded(),
        }
    }
}

fn optional_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} has an invalid value: {raw:?}"))),
        Err(_) => Ok(None),
    }
}
