//! Integration tests for telemetry initialization and span helpers.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use brigade::engine::Step;
use brigade::model::OrderId;
use brigade::telemetry::{TelemetryConfig, dispatch, init_telemetry, metrics};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt as _};

/// Layer that keeps the last value of every span field, plus the `step`
/// of every event, so tests can assert on what the helpers recorded.
#[derive(Clone, Default)]
struct Captured {
    fields: Arc<Mutex<HashMap<String, String>>>,
    steps: Arc<Mutex<Vec<String>>>,
}

struct FieldWriter<'a>(&'a mut HashMap<String, String>);

impl Visit for FieldWriter<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for Captured {
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        attrs.record(&mut FieldWriter(&mut self.fields.lock().unwrap()));
    }

    fn on_record(&self, _id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
        values.record(&mut FieldWriter(&mut self.fields.lock().unwrap()));
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        event.record(&mut FieldWriter(&mut fields));
        if let Some(step) = fields.remove("step") {
            self.steps.lock().unwrap().push(step);
        }
    }
}

#[test]
fn telemetry_initializes_without_endpoint() {
    // The global subscriber can only be set once per process; a second
    // init in the same binary returns Err, which is acceptable here.
    let guard = init_telemetry(TelemetryConfig {
        endpoint: None,
        service_name: "brigade-test".to_string(),
        log_level: "debug".to_string(),
    });
    if let Ok(guard) = guard {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn order_span_records_worker_and_steps() {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::registry().with(captured.clone());
    let order_id = OrderId::new();

    tracing::subscriber::with_default(subscriber, || {
        let span = dispatch::start_order_span(&order_id, &["pizza".to_string()]);
        dispatch::record_worker(&span, "w1");
        for step in Step::ALL {
            dispatch::record_step(&span, step);
        }
    });

    let fields = captured.fields.lock().unwrap();
    assert_eq!(fields["order.id"], order_id.to_string());
    assert_eq!(fields["order.capabilities"], r#"["pizza"]"#);
    assert_eq!(fields["order.worker"], "w1");
    assert_eq!(fields["order.step"], Step::OrderSend.as_str());

    let steps = captured.steps.lock().unwrap();
    let expected: Vec<String> = Step::ALL.iter().map(|s| s.as_str().to_string()).collect();
    assert_eq!(*steps, expected);
}

/// Smoke test: with no global MeterProvider the instruments are no-ops and
/// recording through them must not panic.
#[test]
fn metric_instruments_smoke() {
    metrics::orders_dispatched().add(1, &[]);
    metrics::orders_unroutable().add(1, &[]);
    metrics::worker_membership().add(1, &[]);
    metrics::handoff_duration_ms().record(1.5, &[]);
}
