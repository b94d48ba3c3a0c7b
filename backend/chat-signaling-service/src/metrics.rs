use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

static MESSAGES_SENT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "chat_signaling_messages_sent_total",
        "Messages persisted by the delivery coordinator",
    )
    .expect("failed to create chat_signaling_messages_sent_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_signaling_messages_sent_total");
    counter
});

static PUSH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_signaling_push_total",
            "Real-time push attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create chat_signaling_push_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_signaling_push_total");
    counter
});

static LIVE_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "chat_signaling_live_sessions",
        "Users with a live transport session on this node",
    )
    .expect("failed to create chat_signaling_live_sessions");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register chat_signaling_live_sessions");
    gauge
});

static CLIENT_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chat_signaling_client_events_total",
            "WebSocket client events (typing relay and call signaling) by name and outcome",
        ),
        &["event", "outcome"],
    )
    .expect("failed to create chat_signaling_client_events_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register chat_signaling_client_events_total");
    counter
});

pub fn record_message_sent() {
    MESSAGES_SENT_TOTAL.inc();
}

pub fn record_push(outcome: &str) {
    PUSH_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_live_sessions(count: usize) {
    LIVE_SESSIONS.set(count as i64);
}

pub fn record_client_event(event: &str, outcome: &str) {
    CLIENT_EVENTS_TOTAL.with_label_values(&[event, outcome]).inc();
}

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typing_counted_as_client_event() {
        record_client_event("typing", "accepted");

        let family = prometheus::gather()
            .into_iter()
            .find(|f| f.get_name() == "chat_signaling_client_events_total")
            .expect("client events registered");
        let typing = family
            .get_metric()
            .iter()
            .find(|m| {
                m.get_label()
                    .iter()
                    .any(|l| l.get_name() == "event" && l.get_value() == "typing")
            })
            .expect("typing series");
        assert!(typing.get_counter().get_value() >= 1.0);
    }
}
