use actix_web::{http::header, HttpResponse};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

pub static MESSAGES_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "messaging_engine_messages_sent_total",
            "Messages persisted and published, by origin",
        ),
        &["origin"],
    )
    .expect("failed to create messaging_engine_messages_sent_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messaging_engine_messages_sent_total");
    counter
});

pub static MESSAGES_REJECTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "messaging_engine_messages_rejected_total",
            "Send attempts refused by authorization or validation",
        ),
        &["reason"],
    )
    .expect("failed to create messaging_engine_messages_rejected_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messaging_engine_messages_rejected_total");
    counter
});

pub static REACTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "messaging_engine_reactions_total",
            "Reaction toggles applied, by entity kind and outcome",
        ),
        &["entity", "outcome"],
    )
    .expect("failed to create messaging_engine_reactions_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messaging_engine_reactions_total");
    counter
});

pub static WS_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "messaging_engine_ws_connections",
        "Currently registered websocket connections",
    )
    .expect("failed to create messaging_engine_ws_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register messaging_engine_ws_connections");
    gauge
});

pub static EVENTS_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "messaging_engine_events_published_total",
            "Real-time events published to rooms, by event type",
        ),
        &["event"],
    )
    .expect("failed to create messaging_engine_events_published_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messaging_engine_events_published_total");
    counter
});

pub static AUDIT_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "messaging_engine_audit_dropped_total",
        "Audit records dropped because the queue was full or closed",
    )
    .expect("failed to create messaging_engine_audit_dropped_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messaging_engine_audit_dropped_total");
    counter
});

pub fn record_rejection(reason: &str) {
    MESSAGES_REJECTED_TOTAL.with_label_values(&[reason]).inc();
}

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, encoder.format_type()))
        .body(buffer)
}
