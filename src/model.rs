//! Core data model.
//!
//! A request is one interaction handed over by the transport: a scope
//! describing what it is, plus the channel used to exchange payloads with
//! whoever sent it. Workers are on-duty requests whose channel stays open.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::channel::Channel;
use crate::error::{Error, Result};

/// A tag a worker can serve or an order requires (e.g. "pizza").
pub type Capability = String;

/// Unique key of a worker in the registry.
pub type Identity = String;

/// Opaque payload moved between requester and worker. The core never
/// interprets it.
pub type Payload = Value;

/// Raw attribute set of a request, as decoded by the transport.
pub type Scope = Map<String, Value>;

// ---------------------------------------------------------------------------
// Order id
// ---------------------------------------------------------------------------

/// Newtype for order ids. Assigned by the dispatcher per order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Request kind
// ---------------------------------------------------------------------------

/// What a request asks for. Closed set; routing matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    #[serde(rename = "order")]
    Order,
    #[serde(rename = "worker.onduty", alias = "staff.onduty")]
    WorkerOnDuty,
    #[serde(rename = "worker.offduty", alias = "staff.offduty")]
    WorkerOffDuty,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Order => "order",
            RequestKind::WorkerOnDuty => "worker.onduty",
            RequestKind::WorkerOffDuty => "worker.offduty",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "order" => Ok(RequestKind::Order),
            "worker.onduty" | "staff.onduty" => Ok(RequestKind::WorkerOnDuty),
            "worker.offduty" | "staff.offduty" => Ok(RequestKind::WorkerOffDuty),
            _ => Err(Error::MissingKind),
        }
    }
}

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

/// A request's scope, validated into what routing acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Order {
        capabilities: Vec<Capability>,
    },
    WorkerOnDuty {
        identity: Identity,
        capabilities: Vec<Capability>,
    },
    WorkerOffDuty {
        identity: Identity,
    },
}

impl Intent {
    pub fn kind(&self) -> RequestKind {
        match self {
            Intent::Order { .. } => RequestKind::Order,
            Intent::WorkerOnDuty { .. } => RequestKind::WorkerOnDuty,
            Intent::WorkerOffDuty { .. } => RequestKind::WorkerOffDuty,
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One interaction delivered by the transport.
#[derive(Clone)]
pub struct Request {
    scope: Scope,
    channel: Arc<dyn Channel>,
}

impl Request {
    pub fn new(scope: Scope, channel: Arc<dyn Channel>) -> Self {
        Self { scope, channel }
    }

    /// Build an order request for the given capabilities.
    pub fn order<S: AsRef<str>>(capabilities: &[S], channel: Arc<dyn Channel>) -> Self {
        let mut scope = Scope::new();
        scope.insert("kind".into(), RequestKind::Order.as_str().into());
        scope.insert("capabilities".into(), capability_list(capabilities));
        Self::new(scope, channel)
    }

    /// Build a request putting `identity` on duty with the given capabilities.
    pub fn on_duty<S: AsRef<str>>(
        identity: &str,
        capabilities: &[S],
        channel: Arc<dyn Channel>,
    ) -> Self {
        let mut scope = Scope::new();
        scope.insert("kind".into(), RequestKind::WorkerOnDuty.as_str().into());
        scope.insert("identity".into(), identity.into());
        scope.insert("capabilities".into(), capability_list(capabilities));
        Self::new(scope, channel)
    }

    /// Build a request taking `identity` off duty.
    pub fn off_duty(identity: &str, channel: Arc<dyn Channel>) -> Self {
        let mut scope = Scope::new();
        scope.insert("kind".into(), RequestKind::WorkerOffDuty.as_str().into());
        scope.insert("identity".into(), identity.into());
        Self::new(scope, channel)
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Validate the scope into an [`Intent`].
    ///
    /// The kind is checked first, so a scope with no usable kind is
    /// `MissingKind` whatever else it lacks. Only the attributes the kind
    /// needs are read.
    pub fn intent(&self) -> Result<Intent> {
        Ok(match self.kind()? {
            RequestKind::Order => Intent::Order {
                capabilities: self.capabilities()?,
            },
            RequestKind::WorkerOnDuty => Intent::WorkerOnDuty {
                identity: self.identity()?,
                capabilities: self.capabilities()?,
            },
            RequestKind::WorkerOffDuty => Intent::WorkerOffDuty {
                identity: self.identity()?,
            },
        })
    }

    /// The declared kind. `type` is accepted in place of `kind`.
    pub fn kind(&self) -> Result<RequestKind> {
        self.field(&["kind", "type"])
            .and_then(Value::as_str)
            .ok_or(Error::MissingKind)?
            .parse()
    }

    /// Worker identity. `id` is accepted in place of `identity`.
    fn identity(&self) -> Result<Identity> {
        self.field(&["identity", "id"])
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(Error::MissingField("identity"))
    }

    /// Declared capabilities, in order. `speciality` is accepted in place of
    /// `capabilities`, and a bare string counts as a one-element list.
    fn capabilities(&self) -> Result<Vec<Capability>> {
        let missing = || Error::MissingField("capabilities");
        match self.field(&["capabilities", "speciality"]).ok_or_else(missing)? {
            Value::String(single) => Ok(vec![single.clone()]),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or_else(missing))
                .collect(),
            _ => Err(missing()),
        }
    }

    fn field(&self, names: &[&str]) -> Option<&Value> {
        names.iter().find_map(|name| self.scope.get(*name))
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

fn capability_list<S: AsRef<str>>(capabilities: &[S]) -> Value {
    Value::Array(
        capabilities
            .iter()
            .map(|c| Value::String(c.as_ref().to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use serde_json::json;

    fn request(scope: Value) -> Request {
        let Value::Object(scope) = scope else {
            panic!("scope must be an object");
        };
        Request::new(scope, Arc::new(MemoryChannel::closed()))
    }

    #[test]
    fn intent_accepts_type_alias_and_staff_spellings() {
        let r = request(json!({"type": "staff.onduty", "id": "w1", "speciality": ["pizza"]}));
        assert_eq!(
            r.intent().unwrap(),
            Intent::WorkerOnDuty {
                identity: "w1".into(),
                capabilities: vec!["pizza".into()],
            }
        );

        let r = request(json!({"kind": "worker.offduty", "identity": "w1"}));
        let intent = r.intent().unwrap();
        assert_eq!(intent.kind(), RequestKind::WorkerOffDuty);
        assert_eq!(intent, Intent::WorkerOffDuty { identity: "w1".into() });
    }

    #[test]
    fn missing_or_unknown_kind_is_missing_kind() {
        assert!(matches!(request(json!({})).intent(), Err(Error::MissingKind)));
        assert!(matches!(
            request(json!({"kind": "refund", "capabilities": ["pizza"]})).intent(),
            Err(Error::MissingKind)
        ));
        assert!(matches!(
            request(json!({"kind": 7})).intent(),
            Err(Error::MissingKind)
        ));
    }

    #[test]
    fn order_intent_accepts_single_string_capability() {
        let r = request(json!({"kind": "order", "speciality": "pizza"}));
        assert_eq!(
            r.intent().unwrap(),
            Intent::Order {
                capabilities: vec!["pizza".into()],
            }
        );
    }

    #[test]
    fn non_string_capability_is_missing_field() {
        let r = request(json!({"kind": "order", "capabilities": ["pizza", 3]}));
        assert!(matches!(
            r.intent(),
            Err(Error::MissingField("capabilities"))
        ));
    }

    #[test]
    fn worker_kinds_require_identity() {
        let r = request(json!({"kind": "worker.onduty", "capabilities": ["pizza"]}));
        assert!(matches!(r.intent(), Err(Error::MissingField("identity"))));

        let r = request(json!({"kind": "worker.offduty"}));
        assert!(matches!(r.intent(), Err(Error::MissingField("identity"))));
    }

    #[test]
    fn off_duty_ignores_absent_capabilities() {
        let r = request(json!({"kind": "staff.offduty", "id": "w1"}));
        assert_eq!(r.intent().unwrap(), Intent::WorkerOffDuty { identity: "w1".into() });
    }

    #[test]
    fn kind_round_trips_through_serde() {
        let kind: RequestKind = serde_json::from_value(json!("staff.offduty")).unwrap();
        assert_eq!(kind, RequestKind::WorkerOffDuty);
        assert_eq!(
            serde_json::to_value(RequestKind::WorkerOnDuty).unwrap(),
            json!("worker.onduty")
        );
    }
}
