//! Subcommand runners and the live listener

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use evc_core::{CurrentTarget, EvcError, Orchestrator, OutputFormat};
use evcsrv::service;

mod common;
use common::FakeDevice;

#[tokio::test]
async fn test_read_renders_json_to_output() {
    let mut orchestrator = Orchestrator::new(FakeDevice::charging());
    let mut out = Vec::new();

    let snapshot = service::read(&mut orchestrator, OutputFormat::Json, &mut out)
        .await
        .unwrap();
    assert!(snapshot.is_complete());

    let value: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["identity"]["max_power_w"], 22000);
    assert!(out.ends_with(b"\n"));
}

#[tokio::test]
async fn test_read_connection_failure_writes_nothing() {
    let mut orchestrator = Orchestrator::new(FakeDevice::charging().unreachable());
    let mut out = Vec::new();

    let err = service::read(&mut orchestrator, OutputFormat::Human, &mut out)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EvcError>(),
        Some(EvcError::ConnectionError(_))
    ));
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_set_current_then_renders_fresh_poll() {
    let device = FakeDevice::charging();
    let mut orchestrator = Orchestrator::new(device.clone());
    let mut out = Vec::new();

    let report = service::set_current(
        &mut orchestrator,
        CurrentTarget::Failsafe,
        7,
        OutputFormat::Prometheus,
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(report.readback_for(CurrentTarget::Failsafe), Some(7));
    assert_eq!(device.writes(), vec![(2000, 7)]);
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("vestel_failsafe_current_amperes{serial=\"EVC04-TEST\"} 7"));
}

#[tokio::test]
async fn test_set_current_validation_error_propagates() {
    let device = FakeDevice::charging();
    let mut orchestrator = Orchestrator::new(device.clone());
    let mut out = Vec::new();

    let err = service::set_current(
        &mut orchestrator,
        CurrentTarget::Both,
        5,
        OutputFormat::Human,
        &mut out,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EvcError>(),
        Some(EvcError::ValidationError(_))
    ));
    assert!(device.writes().is_empty());
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_invalid_bind_address() {
    let err = service::serve(
        Orchestrator::new(FakeDevice::default()),
        "not-an-address",
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("Invalid bind address"));
}

#[tokio::test]
async fn test_listener_serves_health_and_stops_on_cancel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let token = CancellationToken::new();

    let server = tokio::spawn(service::serve_on(
        listener,
        Orchestrator::new(FakeDevice::charging()),
        token.clone(),
    ));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("{\"status\":\"ok\"}"));

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
