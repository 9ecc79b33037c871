// ABOUTME: Prometheus metrics for the bridge - counters and the recorder setup.
// ABOUTME: Exposes record_* helpers so call sites never touch metric names directly.

use anyhow::{Context, Result};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const EVENTS_SENT_TOTAL: &str = "bridge_events_sent_total";
pub const EVENTS_DROPPED_TOTAL: &str = "bridge_events_dropped_total";
pub const REPLIES_RECEIVED_TOTAL: &str = "bridge_replies_received_total";
pub const CHAT_MESSAGES_RECEIVED_TOTAL: &str = "bridge_chat_messages_received_total";
pub const CHAT_MESSAGES_SENT_TOTAL: &str = "bridge_chat_messages_sent_total";
pub const CONNECTOR_CONNECTIONS_TOTAL: &str = "bridge_connector_connections_total";
pub const CHAT_SEND_REQUESTS_TOTAL: &str = "bridge_chat_send_requests_total";
pub const ERRORS_TOTAL: &str = "bridge_errors_total";

/// Install the global Prometheus recorder and return the render handle for
/// the /metrics endpoint. Call once at startup.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(EVENTS_SENT_TOTAL, "Events delivered to the director");
    describe_counter!(
        EVENTS_DROPPED_TOTAL,
        "Events dropped because the director was not connected"
    );
    describe_counter!(REPLIES_RECEIVED_TOTAL, "bot_reply frames received");
    describe_counter!(
        CHAT_MESSAGES_RECEIVED_TOTAL,
        "Chat messages received from other users"
    );
    describe_counter!(CHAT_MESSAGES_SENT_TOTAL, "Chat messages written to the channel");
    describe_counter!(
        CONNECTOR_CONNECTIONS_TOTAL,
        "Successful connector connections, labeled by connector"
    );
    describe_counter!(
        CHAT_SEND_REQUESTS_TOTAL,
        "Manual /chat/send requests, labeled by outcome"
    );
    describe_counter!(ERRORS_TOTAL, "Errors, labeled by kind");
}

pub fn record_event_sent(event: &str) {
    counter!(EVENTS_SENT_TOTAL, "event" => event.to_string()).increment(1);
}

pub fn record_event_dropped(event: &str) {
    counter!(EVENTS_DROPPED_TOTAL, "event" => event.to_string()).increment(1);
}

pub fn record_reply_received() {
    counter!(REPLIES_RECEIVED_TOTAL).increment(1);
}

pub fn record_chat_message_received() {
    counter!(CHAT_MESSAGES_RECEIVED_TOTAL).increment(1);
}

pub fn record_chat_message_sent() {
    counter!(CHAT_MESSAGES_SENT_TOTAL).increment(1);
}

pub fn record_connector_connected(connector: &str) {
    counter!(CONNECTOR_CONNECTIONS_TOTAL, "connector" => connector.to_string()).increment(1);
}

pub fn record_chat_send_request(outcome: &str) {
    counter!(CHAT_SEND_REQUESTS_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

pub fn record_error(kind: &str) {
    counter!(ERRORS_TOTAL, "kind" => kind.to_string()).increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_counters_show_up_in_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_event_sent("twitch_message");
            record_event_sent("event");
            record_event_dropped("event");
            record_reply_received();
            record_chat_message_received();
            record_chat_message_sent();
            record_connector_connected("director");
            record_chat_send_request("queued");
            record_chat_send_request("not_ready");
            record_error("twitch_auth");
        });

        let output = handle.render();
        assert!(output.contains(EVENTS_SENT_TOTAL));
        assert!(output.contains("event=\"twitch_message\""));
        assert!(output.contains(EVENTS_DROPPED_TOTAL));
        assert!(output.contains(REPLIES_RECEIVED_TOTAL));
        assert!(output.contains(CHAT_MESSAGES_RECEIVED_TOTAL));
        assert!(output.contains(CHAT_MESSAGES_SENT_TOTAL));
        assert!(output.contains("connector=\"director\""));
        assert!(output.contains("outcome=\"queued\""));
        assert!(output.contains("outcome=\"not_ready\""));
        assert!(output.contains("kind=\"twitch_auth\""));
    }

    #[test]
    fn test_fresh_recorder_renders_empty_or_header_only() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#'));
    }
}
