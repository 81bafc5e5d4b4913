use std::sync::Arc;

use serde_json::json;

use ptt_relay::error::ErrorCode;
use ptt_relay::session::SessionFlags;
use ptt_relay::ws::{
    BroadcastHub, ControlCommand, ErrorBody, InboundMessage, OutboundEvent, Status,
};

#[test]
fn status_events_carry_the_listening_and_pause_flags() {
    let event = OutboundEvent::Status {
        status: Status::Listening,
        is_listening: true,
        is_paused: false,
    };

    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        json!({
            "type": "status",
            "status": "listening",
            "is_listening": true,
            "is_paused": false
        })
    );
}

#[test]
fn status_names_are_snake_case() {
    assert_eq!(
        serde_json::to_value(Status::MaxCallsReached).unwrap(),
        json!("max_calls_reached")
    );
    assert_eq!(
        serde_json::to_value(Status::ShuttingDown).unwrap(),
        json!("shutting_down")
    );
}

#[test]
fn error_events_nest_message_and_code() {
    let event = OutboundEvent::Error {
        error: ErrorBody {
            message: "microphone unavailable".into(),
            code: ErrorCode::DeviceError,
        },
    };

    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        json!({
            "type": "error",
            "error": { "message": "microphone unavailable", "code": "device_error" }
        })
    );
}

#[test]
fn response_events_embed_the_endpoint_payload_verbatim() {
    let payload = json!({ "type": "response.text.delta", "delta": "Hi", "item_id": "abc" });
    let event = OutboundEvent::Response {
        data: payload.clone(),
    };

    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        json!({ "type": "response", "data": payload })
    );
}

#[test]
fn unit_events_serialize_with_only_a_type_tag() {
    assert_eq!(
        serde_json::to_value(OutboundEvent::NewResponse).unwrap(),
        json!({ "type": "new_response" })
    );
    assert_eq!(
        serde_json::to_value(OutboundEvent::ApiCallCount { count: 3 }).unwrap(),
        json!({ "type": "api_call_count", "count": 3 })
    );
    assert_eq!(
        serde_json::to_value(OutboundEvent::AudioLevel { level: 42 }).unwrap(),
        json!({ "type": "audio_level", "level": 42 })
    );
}

#[test]
fn control_messages_parse_into_commands() {
    let msg: InboundMessage =
        serde_json::from_str(r#"{"type":"control","action":"start_listening"}"#).unwrap();
    let InboundMessage::Control { action } = msg;
    assert_eq!(
        ControlCommand::parse(&action),
        Some(ControlCommand::StartListening)
    );

    assert_eq!(
        ControlCommand::parse("stop_listening"),
        Some(ControlCommand::StopListening)
    );
    assert_eq!(ControlCommand::parse("pause"), Some(ControlCommand::Pause));
    assert_eq!(ControlCommand::parse("resume"), Some(ControlCommand::Resume));
}

#[test]
fn unknown_actions_are_rejected() {
    assert_eq!(ControlCommand::parse("reboot"), None);
    assert_eq!(ControlCommand::parse(""), None);
    assert_eq!(ControlCommand::parse("START_LISTENING"), None);
}

#[test]
fn malformed_control_messages_fail_to_parse() {
    assert!(serde_json::from_str::<InboundMessage>(r#"{"action":"pause"}"#).is_err());
    assert!(serde_json::from_str::<InboundMessage>("not json").is_err());
}

#[tokio::test]
async fn hub_stamps_status_events_with_the_live_flags() {
    let flags = Arc::new(SessionFlags::default());
    let hub = BroadcastHub::new(Arc::clone(&flags), -1);
    let mut events = hub.subscribe();

    hub.status(Status::Ready);

    assert_eq!(
        events.recv().await.unwrap(),
        OutboundEvent::Status {
            status: Status::Ready,
            is_listening: false,
            is_paused: false,
        }
    );
}

#[tokio::test]
async fn hub_reports_the_configured_call_budget() {
    let flags = Arc::new(SessionFlags::default());
    let hub = BroadcastHub::new(flags, 7);

    assert_eq!(
        hub.config_event(),
        OutboundEvent::Config { max_api_calls: 7 }
    );
}

#[test]
fn broadcasting_without_subscribers_does_not_panic() {
    let flags = Arc::new(SessionFlags::default());
    let hub = BroadcastHub::new(flags, -1);

    hub.status(Status::Ready);
    hub.debug("nobody listening");
    hub.audio_level(10);
}
