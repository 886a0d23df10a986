//! Prometheus counters for the configuration client
//!
//! Counters live in process-wide statics and are registered into [`REGISTRY`]
//! on first access. [`gather_text`] renders the registry in the text
//! exposition format for whatever endpoint the host process exposes.

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::warn;


lazy_static! {
    /// Watch events applied to the record, by event kind
    pub static ref WATCH_EVENTS_APPLIED: IntCounterVec = IntCounterVec::new(
        Opts::new("watch_events_applied", "Watch events applied to the record"),
        &["kind"]
    )
    .expect("metric can not be created");

    /// Watch events not applied, by reason
    pub static ref WATCH_EVENTS_SKIPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("watch_events_skipped", "Watch events skipped by the watcher"),
        &["reason"]
    )
    .expect("metric can not be created");

    /// Operations staged by the initial reconciliation, by op
    pub static ref RECONCILE_OPS: IntCounterVec = IntCounterVec::new(
        Opts::new("reconcile_ops", "Operations committed by reconciliation"),
        &["op"]
    )
    .expect("metric can not be created");

    /// Rollbacks applied, by kind
    pub static ref ROLLBACKS: IntCounterVec = IntCounterVec::new(
        Opts::new("rollbacks", "Rollbacks applied through set"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new_custom(Some("dconfig".to_string()), None)
            .expect("registry can be created");
        register_custom_metrics(&registry);
        registry
    };
}

fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(WATCH_EVENTS_APPLIED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WATCH_EVENTS_SKIPPED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(RECONCILE_OPS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ROLLBACKS.clone()))
        .expect("collector can be registered");
}

/// Encode every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        warn!("could not encode metrics: {:?}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
