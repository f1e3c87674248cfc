//! Firmware client behavior against an in-process stub device

use minetune_core::config::{FirmwareSettings, RetryPolicy, Timeouts};
use minetune_core::{Credential, FirmwareClient, FirmwareControl, FirmwareError};
use minetune_devkit::StubMiner;
use std::time::{Duration, Instant};

/// Millisecond-scale retries so failure paths stay fast
fn test_settings() -> FirmwareSettings {
    FirmwareSettings {
        retry: RetryPolicy {
            read_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 40,
        },
        timeouts: Timeouts {
            read_secs: 2,
            write_secs: 2,
        },
        ..FirmwareSettings::default()
    }
}

fn credential(host: &str, password: &str) -> Credential {
    Credential {
        host: host.to_string(),
        username: "admin".to_string(),
        password: password.to_string(),
        is_default: false,
    }
}

fn client_for(stub: &StubMiner) -> FirmwareClient {
    let host = stub.host();
    FirmwareClient::new(&host, &credential(&host, "admin"), test_settings()).unwrap()
}

#[tokio::test]
async fn test_reads_roundtrip() {
    let stub = StubMiner::spawn().await.unwrap();
    let client = client_for(&stub);

    let summary = client.get_summary().await.unwrap();
    assert_eq!(summary.model, "Antminer S19j Pro");
    assert_eq!(summary.status, "mining");

    let telemetry = client.get_telemetry().await.unwrap();
    assert_eq!(telemetry.hashrate_ths, 110.0);
    assert_eq!(telemetry.fan_rpm, Some(5400));

    let chips = client.get_chips_status().await.unwrap();
    assert_eq!(chips.chains.len(), 3);
    assert_eq!(chips.chains[0].chip_count, 126);
}

#[tokio::test]
async fn test_auth_is_lazy_and_session_is_reused() {
    let stub = StubMiner::spawn().await.unwrap();
    let client = client_for(&stub);
    assert_eq!(stub.auth_count(), 0);

    client.get_telemetry().await.unwrap();
    assert_eq!(stub.auth_count(), 1);

    client.get_summary().await.unwrap();
    assert_eq!(stub.auth_count(), 1);
}

#[tokio::test]
async fn test_expired_session_reauthenticates_once() {
    let stub = StubMiner::spawn().await.unwrap();
    let client = client_for(&stub);

    client.get_telemetry().await.unwrap();
    stub.expire_session();

    client.get_telemetry().await.unwrap();
    assert_eq!(stub.auth_count(), 2);
}

#[tokio::test]
async fn test_rejected_login_surfaces_authentication_error() {
    let stub = StubMiner::spawn_with_login("admin", "s3cret").await.unwrap();
    let host = stub.host();
    let client =
        FirmwareClient::new(&host, &credential(&host, "wrong"), test_settings()).unwrap();

    let error = client.get_telemetry().await.unwrap_err();
    assert!(matches!(error, FirmwareError::Authentication { .. }));
}

#[tokio::test]
async fn test_read_retries_through_transient_faults() {
    let stub = StubMiner::spawn().await.unwrap();
    let client = client_for(&stub);
    stub.set_fail_next(2);

    let started = Instant::now();
    let telemetry = client.get_telemetry().await.unwrap();
    assert_eq!(telemetry.hashrate_ths, 110.0);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_exhausted_retries_surface_unreachable_within_bound() {
    let stub = StubMiner::spawn().await.unwrap();
    let client = client_for(&stub);
    stub.set_fail_next(10);

    let started = Instant::now();
    let error = client.get_telemetry().await.unwrap_err();
    assert!(matches!(error, FirmwareError::Unreachable { .. }));
    // Three attempts with 10ms/20ms backoff in between
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_stalled_reads_time_out_to_unreachable() {
    let stub = StubMiner::spawn().await.unwrap();
    let host = stub.host();
    let settings = FirmwareSettings {
        retry: RetryPolicy {
            read_attempts: 2,
            base_delay_ms: 10,
            max_delay_ms: 40,
        },
        timeouts: Timeouts {
            read_secs: 1,
            write_secs: 1,
        },
        ..FirmwareSettings::default()
    };
    let client = FirmwareClient::new(&host, &credential(&host, "admin"), settings).unwrap();
    stub.set_stall_next(4);

    let started = Instant::now();
    let error = client.get_telemetry().await.unwrap_err();
    assert!(matches!(error, FirmwareError::Unreachable { .. }));
    // Two 1s timeouts plus one short backoff
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_stalled_write_surfaces_ambiguous_and_is_not_resent() {
    let stub = StubMiner::spawn().await.unwrap();
    let host = stub.host();
    let mut settings = test_settings();
    settings.timeouts = Timeouts {
        read_secs: 1,
        write_secs: 1,
    };
    let client = FirmwareClient::new(&host, &credential(&host, "admin"), settings).unwrap();

    // Authenticate up front so the stall hits the control write itself
    client.get_telemetry().await.unwrap();
    stub.set_stall_next(1);

    let error = client.set_power_limit(85.0).await.unwrap_err();
    assert!(matches!(error, FirmwareError::AmbiguousWrite { .. }));
    assert!(stub.recorded().is_empty());
}

#[tokio::test]
async fn test_connection_refused_is_unreachable() {
    // Bind then drop a listener so the port is known to be closed
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();
    drop(listener);

    let client =
        FirmwareClient::new(&host, &credential(&host, "admin"), test_settings()).unwrap();
    let error = client.get_telemetry().await.unwrap_err();
    assert!(matches!(error, FirmwareError::Unreachable { .. }));
}

#[tokio::test]
async fn test_control_writes_are_recorded_as_sent() {
    let stub = StubMiner::spawn().await.unwrap();
    let client = client_for(&stub);

    client.set_hashrate_limit(75.0).await.unwrap();
    client.set_overclock(50, 200, 85.0, 10).await.unwrap();

    let recorded = stub.recorded();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].path, "/hashrate-limit");
    assert_eq!(recorded[0].body["percent"], 75.0);
    // The whole overclock profile travels in one request
    assert_eq!(recorded[1].path, "/overclock");
    assert_eq!(recorded[1].body["core_clock_offset"], 50);
    assert_eq!(recorded[1].body["memory_clock_offset"], 200);
    assert_eq!(recorded[1].body["power_limit_percent"], 85.0);
    assert_eq!(recorded[1].body["core_voltage_offset"], 10);
}

#[tokio::test]
async fn test_write_replays_after_session_expiry() {
    let stub = StubMiner::spawn().await.unwrap();
    let client = client_for(&stub);

    client.set_power_limit(90.0).await.unwrap();
    stub.expire_session();
    client.set_power_limit(85.0).await.unwrap();

    let recorded = stub.recorded();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[1].body["percent"], 85.0);
    assert_eq!(stub.auth_count(), 2);
}
