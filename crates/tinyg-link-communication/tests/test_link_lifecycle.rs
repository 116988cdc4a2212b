mod common;

use common::{open_link, test_config, wait_until, FakeTinyG, MockChannel, HARD_STOP_LINE};
use std::time::Duration;
use tinyg_link_communication::TinyGLink;
use tinyg_link_core::{Error, ProtocolError};

#[tokio::test]
async fn test_setup_configures_controller() {
    let dir = tempfile::tempdir().unwrap();
    let (channel, handle) = MockChannel::with_responder(FakeTinyG::new().responder());

    let link = open_link(channel, test_config(dir.path())).await;

    let writes = handle.writes();
    assert_eq!(writes[0], "{\"ex\":2}\n");
    assert_eq!(writes[1], "{\"sr\":0}\n");
    assert!(handle.flow_control());
    assert!(handle.input_clears() >= 1);
    assert!(!link.is_faulted());
    assert!(link.is_motion_complete());

    link.close().await.unwrap();
    assert!(handle.is_closed());
    assert_eq!(handle.count_writes("\u{18}"), 0);
}

#[tokio::test]
async fn test_setup_without_hardware_flow_control() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.connection.hardware_flow_control = false;
    let (channel, handle) = MockChannel::new();

    let link = open_link(channel, config).await;

    assert_eq!(handle.writes()[0], "{\"ex\":0}\n");
    assert!(!handle.flow_control());
    link.close().await.unwrap();
}

#[tokio::test]
async fn test_fault_in_banner_fails_setup() {
    let dir = tempfile::tempdir().unwrap();
    let device = FakeTinyG::new().fault_on("\"sr\"");
    let (channel, handle) = MockChannel::with_responder(device.responder());

    let result = TinyGLink::with_channel(Box::new(channel), test_config(dir.path())).await;

    let err = result.err().expect("setup should fail");
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::HardStop { ref payload }) if payload == HARD_STOP_LINE
    ));
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_session_log_records_traffic() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let log_path = dir.path().join("tinyg.log");
    std::fs::write(&log_path, "stale session").unwrap();

    let (channel, _handle) = MockChannel::with_responder(FakeTinyG::new().responder());
    let link = open_link(channel, config).await;
    link.send(r#"{"gc":"M03"}"#).await.unwrap();
    link.close().await.unwrap();

    let transcript = std::fs::read_to_string(&log_path).unwrap();
    assert!(!transcript.contains("stale session"));
    assert!(transcript.contains("INPUT:"));
    assert!(transcript.contains("OUTPUT:"));
    assert!(transcript.contains(r#"{"gc":"M03"}"#));
    assert!(transcript.contains(r#""r":{"gc":"M03"}"#));
}

#[tokio::test]
async fn test_hard_reset_flushes_and_writes_reset_byte() {
    let dir = tempfile::tempdir().unwrap();
    let (channel, handle) = MockChannel::new();
    let link = open_link(channel, test_config(dir.path())).await;
    let clears_before = handle.input_clears();

    link.hard_reset().await.unwrap();

    assert_eq!(handle.writes().last().map(String::as_str), Some("\u{18}"));
    assert_eq!(handle.input_clears(), clears_before + 1);
    link.close().await.unwrap();
}

#[tokio::test]
async fn test_close_after_fault_resets_controller() {
    let dir = tempfile::tempdir().unwrap();
    let (channel, handle) = MockChannel::new();
    let link = open_link(channel, test_config(dir.path())).await;

    handle.push_line(HARD_STOP_LINE);
    assert!(wait_until(Duration::from_secs(1), || link.is_faulted()).await);
    assert_eq!(link.fault_payload().as_deref(), Some(HARD_STOP_LINE));

    let err = link.close().await.unwrap_err();
    assert!(err.is_fault());
    assert_eq!(handle.count_writes("\u{18}"), 1);
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_transport_failure_terminates_reader() {
    let dir = tempfile::tempdir().unwrap();
    let (channel, handle) = MockChannel::new();
    let link = open_link(channel, test_config(dir.path())).await;

    handle.fail_reads();
    assert!(wait_until(Duration::from_secs(1), || link.is_faulted()).await);

    let err = link.send(r#"{"gc":"M05"}"#).await.unwrap_err();
    assert!(err.is_fault());

    let err = link.close().await.unwrap_err();
    assert!(err.is_fault());
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_query_returns_position_report() {
    let dir = tempfile::tempdir().unwrap();
    let (channel, handle) = MockChannel::with_responder(Box::new(|line: &str| {
        if line.contains("M114") {
            vec![r#"{"r":{"posx":1.5,"posy":2.0},"f":[1,0,4,1]}"#.to_string()]
        } else {
            Vec::new()
        }
    }));
    let link = open_link(channel, test_config(dir.path())).await;

    let lines = link.position_report().await.unwrap();

    assert_eq!(lines.len(), 1);
    let response = lines[0].response().unwrap();
    assert_eq!(response.setting("posx"), Some(1.5));
    assert_eq!(response.setting("posy"), Some(2.0));
    assert_eq!(handle.count_writes(r#"{"gc":"M114"}"#), 1);
    link.close().await.unwrap();
}
