//! Lease client behaviour against the in-memory transport.
//!
//! Timer tests run with a paused clock; sleeping in the test advances time
//! and drives the renewal ticks.

use floatlease_client::{
    AcquireOutcome, ChannelDispatch, ExpiryReason, Identity, IdentitySource, LeaseClient,
    LeaseConfig, LeaseError, LeaseState,
};
use floatlease_transport::Operation;
use floatlease_transport::transport::mock::MockTransport;
use floatlease_types::{ErrorKind, Rejection, StatusCode};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TICK: Duration = Duration::from_secs(60);

type Seen = Arc<Mutex<Vec<ExpiryReason>>>;

fn client_with(config: LeaseConfig) -> (LeaseClient, Arc<MockTransport>) {
    let mock = Arc::new(MockTransport::new());
    let client = LeaseClient::with_transport(config, mock.clone()).unwrap();
    (client, mock)
}

fn client() -> (LeaseClient, Arc<MockTransport>) {
    client_with(LeaseConfig::default())
}

fn watch_expiry(client: &LeaseClient) -> Seen {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client.set_renewal_failure_callback(move |reason: ExpiryReason| {
        sink.lock().unwrap().push(reason);
    });
    seen
}

async fn configured(client: &LeaseClient) {
    client
        .bind_identity(Identity::product("PID-123").unwrap())
        .await
        .unwrap();
    client.configure_endpoint("localhost", 8090).await.unwrap();
}

// ── Scenarios ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn lease_and_release() {
    let (client, mock) = client();
    let seen = watch_expiry(&client);
    configured(&client).await;
    assert_eq!(client.state(), LeaseState::Configured);

    assert_eq!(client.acquire().await.unwrap(), AcquireOutcome::Acquired);
    assert!(client.has_active_lease().await.unwrap());

    client.release().await.unwrap();
    assert!(!client.has_active_lease().await.unwrap());
    assert_eq!(client.state(), LeaseState::Released);
    assert!(!mock.server_holds_lease(client.handle().unwrap()));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn no_free_license_leaves_configured() {
    let (client, mock) = client();
    configured(&client).await;
    mock.push_status(Operation::Acquire, StatusCode::NoFreeLicense);

    let err = client.acquire().await.unwrap_err();
    assert!(matches!(err, LeaseError::Rejected(Rejection::NoFreeLicense)));
    assert_eq!(err.kind(), ErrorKind::ServerRejection);
    assert_eq!(client.state(), LeaseState::Configured);

    tokio::time::sleep(TICK * 5).await;
    assert_eq!(mock.calls(Operation::Renew), 0);
}

#[tokio::test(start_paused = true)]
async fn server_clock_tampering_expires_once() {
    let (client, mock) = client();
    let seen = watch_expiry(&client);
    configured(&client).await;
    client.acquire().await.unwrap();

    mock.push_status(Operation::Renew, StatusCode::ServerTime);
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;

    assert_eq!(client.state(), LeaseState::Expired);
    assert_eq!(*seen.lock().unwrap(), vec![ExpiryReason::ServerClockTampered]);

    tokio::time::sleep(TICK * 5).await;
    assert_eq!(mock.calls(Operation::Renew), 1);
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(!client.has_active_lease().await.unwrap());
}

// ── Single active lease ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn second_acquire_sends_nothing() {
    let (client, mock) = client();
    configured(&client).await;

    assert_eq!(client.acquire().await.unwrap(), AcquireOutcome::Acquired);
    assert_eq!(client.acquire().await.unwrap(), AcquireOutcome::AlreadyLeased);
    assert_eq!(mock.calls(Operation::Acquire), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_acquires_send_one_request() {
    let (client, mock) = client();
    configured(&client).await;
    mock.set_latency(Duration::from_secs(2));

    let (a, b) = tokio::join!(client.acquire(), client.acquire());
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| *o == AcquireOutcome::AlreadyLeased);
    assert_eq!(
        outcomes,
        vec![AcquireOutcome::Acquired, AcquireOutcome::AlreadyLeased]
    );
    assert_eq!(mock.calls(Operation::Acquire), 1);
}

// ── Renewal ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn renews_every_interval() {
    let (client, mock) = client();
    configured(&client).await;
    client.acquire().await.unwrap();
    assert!(client.lease_info().last_renewed_at.is_none());

    tokio::time::sleep(TICK * 3 + Duration::from_secs(1)).await;
    assert_eq!(mock.calls(Operation::Renew), 3);

    let info = client.lease_info();
    assert_eq!(info.state, LeaseState::Leased);
    assert!(info.acquired_at.is_some());
    assert!(info.last_renewed_at.is_some());
    assert_eq!(info.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_within_grace_keep_lease() {
    let (client, mock) = client();
    let seen = watch_expiry(&client);
    configured(&client).await;
    client.acquire().await.unwrap();

    // 6 ticks * 60s = 360s, not beyond the 360s grace period.
    mock.fail_always(Operation::Renew, StatusCode::Inet);
    tokio::time::sleep(TICK * 6 + Duration::from_secs(1)).await;

    assert_eq!(client.state(), LeaseState::Leased);
    assert_eq!(client.lease_info().consecutive_failures, 6);
    assert!(seen.lock().unwrap().is_empty());

    mock.clear_failure(Operation::Renew);
    tokio::time::sleep(TICK).await;
    assert_eq!(client.state(), LeaseState::Leased);
    assert_eq!(client.lease_info().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_beyond_grace_expire() {
    let (client, mock) = client();
    let seen = watch_expiry(&client);
    configured(&client).await;
    client.acquire().await.unwrap();

    mock.fail_always(Operation::Renew, StatusCode::Inet);
    tokio::time::sleep(TICK * 7 + Duration::from_secs(1)).await;

    assert_eq!(client.state(), LeaseState::Expired);
    assert_eq!(*seen.lock().unwrap(), vec![ExpiryReason::LeaseExpiredNetwork]);
    assert_eq!(client.lease_info().consecutive_failures, 7);

    tokio::time::sleep(TICK * 3).await;
    assert_eq!(mock.calls(Operation::Renew), 7);
}

#[tokio::test(start_paused = true)]
async fn server_expiry_reports_normal_reason() {
    let (client, mock) = client();
    let seen = watch_expiry(&client);
    configured(&client).await;
    client.acquire().await.unwrap();

    mock.push_status(Operation::Renew, StatusCode::Ok);
    mock.push_status(Operation::Renew, StatusCode::LicenseExpired);
    tokio::time::sleep(TICK * 2 + Duration::from_secs(1)).await;

    assert_eq!(*seen.lock().unwrap(), vec![ExpiryReason::LeaseExpiredNormal]);
}

#[tokio::test(start_paused = true)]
async fn expiry_is_published_to_subscribers() {
    let (client, mock) = client();
    configured(&client).await;
    let mut rx = client.subscribe_state();
    client.acquire().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), LeaseState::Leased);

    mock.push_status(Operation::Renew, StatusCode::Time);
    let state = *rx.wait_for(|s| *s == LeaseState::Expired).await.unwrap();
    assert_eq!(state, LeaseState::Expired);
}

#[tokio::test(start_paused = true)]
async fn expiry_without_callback_still_transitions() {
    let (client, mock) = client();
    configured(&client).await;
    client.acquire().await.unwrap();

    mock.push_status(Operation::Renew, StatusCode::LicenseExpired);
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;
    assert_eq!(client.state(), LeaseState::Expired);
}

// ── Release ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn release_waits_for_in_flight_renewal() {
    let (client, mock) = client();
    let seen = watch_expiry(&client);
    configured(&client).await;
    mock.set_latency(Duration::from_secs(5));
    client.acquire().await.unwrap();

    // Acquire takes 5s, so the first renew is in flight from 65s to 70s.
    tokio::time::sleep(TICK + Duration::from_secs(2)).await;
    client.release().await.unwrap();

    assert!(!mock.overlap_detected());
    assert_eq!(mock.calls(Operation::Renew), 1);
    assert_eq!(mock.calls(Operation::Release), 1);
    assert_eq!(client.state(), LeaseState::Released);

    tokio::time::sleep(TICK * 3).await;
    assert_eq!(mock.calls(Operation::Renew), 1);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn release_without_lease() {
    let (client, _mock) = client();
    assert!(matches!(
        client.release().await,
        Err(LeaseError::NoActiveLease)
    ));

    configured(&client).await;
    assert!(matches!(
        client.release().await,
        Err(LeaseError::NoActiveLease)
    ));
}

#[tokio::test(start_paused = true)]
async fn failed_release_still_leaves_released() {
    let (client, mock) = client();
    configured(&client).await;
    client.acquire().await.unwrap();

    mock.push_status(Operation::Release, StatusCode::Inet);
    let err = client.release().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(client.state(), LeaseState::Released);
}

#[tokio::test(start_paused = true)]
async fn release_after_expiry_is_best_effort() {
    let (client, mock) = client();
    let seen = watch_expiry(&client);
    configured(&client).await;
    client.acquire().await.unwrap();

    mock.push_status(Operation::Renew, StatusCode::LicenseExpired);
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;
    assert_eq!(client.state(), LeaseState::Expired);

    mock.push_status(Operation::Release, StatusCode::Server);
    client.release().await.unwrap();
    assert_eq!(client.state(), LeaseState::Released);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

// ── Re-lease ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn acquire_after_expiry_reuses_handle() {
    let (client, mock) = client();
    let seen = watch_expiry(&client);
    configured(&client).await;
    let handle = client.handle().unwrap();
    client.acquire().await.unwrap();

    mock.push_status(Operation::Renew, StatusCode::ServerTime);
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;
    assert_eq!(client.state(), LeaseState::Expired);

    assert_eq!(client.acquire().await.unwrap(), AcquireOutcome::Acquired);
    assert_eq!(client.state(), LeaseState::Leased);
    assert_eq!(client.handle(), Some(handle));
    assert_eq!(mock.calls(Operation::RegisterIdentity), 2);

    tokio::time::sleep(TICK + Duration::from_secs(1)).await;
    assert_eq!(mock.calls(Operation::Renew), 2);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn acquire_after_network_expiry() {
    let (client, mock) = client();
    let seen = watch_expiry(&client);
    configured(&client).await;
    client.acquire().await.unwrap();

    mock.fail_always(Operation::Renew, StatusCode::Inet);
    tokio::time::sleep(TICK * 7 + Duration::from_secs(1)).await;
    assert_eq!(client.state(), LeaseState::Expired);
    assert_eq!(*seen.lock().unwrap(), vec![ExpiryReason::LeaseExpiredNetwork]);

    mock.clear_failure(Operation::Renew);
    assert_eq!(client.acquire().await.unwrap(), AcquireOutcome::Acquired);
    assert_eq!(client.state(), LeaseState::Leased);
    assert_eq!(mock.calls(Operation::Acquire), 2);

    tokio::time::sleep(TICK + Duration::from_secs(1)).await;
    assert_eq!(client.state(), LeaseState::Leased);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_renewal_response_expires_at_once() {
    let (client, mock) = client();
    let seen = watch_expiry(&client);
    configured(&client).await;
    client.acquire().await.unwrap();

    mock.push_status(Operation::Renew, StatusCode::BufferSize);
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;

    assert_eq!(client.state(), LeaseState::Expired);
    assert_eq!(*seen.lock().unwrap(), vec![ExpiryReason::Other]);
    assert_eq!(mock.calls(Operation::Renew), 1);
}

#[tokio::test(start_paused = true)]
async fn acquire_after_release() {
    let (client, mock) = client();
    configured(&client).await;
    client.acquire().await.unwrap();
    client.release().await.unwrap();

    client.acquire().await.unwrap();
    assert_eq!(client.state(), LeaseState::Leased);
    assert_eq!(mock.calls(Operation::Acquire), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_re_lease_keeps_expired() {
    let (client, mock) = client();
    configured(&client).await;
    client.acquire().await.unwrap();
    mock.push_status(Operation::Renew, StatusCode::LicenseExpired);
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;

    mock.push_status(Operation::Acquire, StatusCode::NoFreeLicense);
    assert!(client.acquire().await.is_err());
    assert_eq!(client.state(), LeaseState::Expired);
}

// ── Configuration ──────────────────────────────────────────────

#[tokio::test]
async fn invalid_config_is_rejected() {
    let config = LeaseConfig {
        grace_period_secs: 60,
        ..LeaseConfig::default()
    };
    let mock = Arc::new(MockTransport::new());
    assert!(matches!(
        LeaseClient::with_transport(config, mock),
        Err(LeaseError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn acquire_before_configuration() {
    let (client, _mock) = client();
    assert!(matches!(
        client.acquire().await,
        Err(LeaseError::NotConfigured("identity"))
    ));

    client
        .bind_identity(Identity::product("PID-123").unwrap())
        .await
        .unwrap();
    assert_eq!(client.state(), LeaseState::Unconfigured);
    assert!(matches!(
        client.acquire().await,
        Err(LeaseError::NotConfigured("server endpoint"))
    ));
}

#[tokio::test]
async fn endpoint_before_identity() {
    let (client, mock) = client();
    client.configure_endpoint("localhost", 8090).await.unwrap();
    assert_eq!(client.state(), LeaseState::Unconfigured);

    client
        .bind_identity(Identity::product("PID-123").unwrap())
        .await
        .unwrap();
    assert_eq!(client.state(), LeaseState::Configured);
    assert_eq!(mock.calls(Operation::ConfigureEndpoint), 1);
}

#[tokio::test]
async fn invalid_endpoint() {
    let (client, _mock) = client();
    assert!(matches!(
        client.configure_endpoint("  ", 8090).await,
        Err(LeaseError::InvalidEndpoint(_))
    ));
    assert!(matches!(
        client.configure_endpoint("localhost", 0).await,
        Err(LeaseError::InvalidEndpoint(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn endpoint_locked_while_leased() {
    let (client, _mock) = client();
    configured(&client).await;
    client.acquire().await.unwrap();

    assert!(matches!(
        client.configure_endpoint("10.0.0.2", 8090).await,
        Err(LeaseError::EndpointLocked)
    ));

    client.release().await.unwrap();
    client.configure_endpoint("10.0.0.2", 8090).await.unwrap();
    assert_eq!(
        client.lease_info().endpoint.unwrap().host,
        "10.0.0.2".to_string()
    );
}

#[tokio::test]
async fn identity_is_bound_once() {
    let (client, mock) = client();
    let identity = Identity::product("PID-123").unwrap();

    let first = client.bind_identity(identity.clone()).await.unwrap();
    let again = client.bind_identity(identity).await.unwrap();
    assert_eq!(first, again);
    assert_eq!(mock.calls(Operation::RegisterIdentity), 1);

    assert!(matches!(
        client
            .bind_identity(Identity::product("PID-456").unwrap())
            .await,
        Err(LeaseError::IdentityAlreadyBound)
    ));
}

#[tokio::test]
async fn bind_version_from_source() {
    let (client, _mock) = client();
    assert!(matches!(
        client.bind_version(None).await,
        Err(LeaseError::NotConfigured(_))
    ));

    client
        .set_identity_source(IdentitySource::ProductId("PID-123".into()))
        .unwrap();
    let handle = client.bind_version(Some("3.0")).await.unwrap();
    assert!(handle.is_valid());

    assert!(matches!(
        client
            .bind_identity(Identity::product("PID-999").unwrap())
            .await,
        Err(LeaseError::InvalidIdentity(_))
    ));
}

#[tokio::test]
async fn bind_descriptor_identity() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"product descriptor").unwrap();

    let (client, _mock) = client();
    client
        .set_identity_source(IdentitySource::ProductFile(file.path().to_path_buf()))
        .unwrap();
    assert!(matches!(
        client.bind_version(None).await,
        Err(LeaseError::InvalidIdentity(_))
    ));

    client
        .bind_version(Some("6f8a3b2c-1d4e-4f5a-9b8c-7d6e5f4a3b2c"))
        .await
        .unwrap();
}

// ── Metadata ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn metadata_requires_lease() {
    let (client, mock) = client();
    mock.set_metadata("tier", "gold");
    configured(&client).await;

    assert!(matches!(
        client.get_metadata_field("tier").await,
        Err(LeaseError::NoActiveLease)
    ));

    client.acquire().await.unwrap();
    assert_eq!(client.get_metadata_field("tier").await.unwrap(), "gold");
    assert!(matches!(
        client.get_metadata_field("seats").await,
        Err(LeaseError::Rejected(Rejection::MetadataKeyNotFound))
    ));
}

#[tokio::test(start_paused = true)]
async fn metadata_into_buffer() {
    let (client, mock) = client();
    mock.set_metadata("tier", "gold");
    configured(&client).await;
    client.acquire().await.unwrap();

    let mut small = [0u8; 2];
    let err = client.read_metadata_into("tier", &mut small).await.unwrap_err();
    assert!(matches!(
        err,
        LeaseError::BufferTooSmall {
            required: 4,
            capacity: 2
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Buffer);

    let mut buf = [0u8; 16];
    let len = client.read_metadata_into("tier", &mut buf).await.unwrap();
    assert_eq!(&buf[..len], b"gold");
}

// ── Dispatch ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn callback_posted_to_host_queue() {
    let (client, mock) = client();
    let (dispatch, mut queue) = ChannelDispatch::new();
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client.set_renewal_failure_callback_on(
        move |reason: ExpiryReason| sink.lock().unwrap().push(reason),
        Arc::new(dispatch),
    );
    configured(&client).await;
    client.acquire().await.unwrap();

    mock.push_status(Operation::Renew, StatusCode::Time);
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;
    assert_eq!(client.state(), LeaseState::Expired);
    assert!(seen.lock().unwrap().is_empty());

    assert_eq!(queue.run_pending(), 1);
    assert_eq!(*seen.lock().unwrap(), vec![ExpiryReason::ClientClockTampered]);
}

// ── Drop ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn drop_releases_lease() {
    let (client, mock) = client();
    configured(&client).await;
    client.acquire().await.unwrap();
    let handle = client.handle().unwrap();

    drop(client);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!mock.server_holds_lease(handle));
    assert_eq!(mock.calls(Operation::Release), 1);
    tokio::time::sleep(TICK * 2).await;
    assert_eq!(mock.calls(Operation::Renew), 0);
}

#[tokio::test(start_paused = true)]
async fn drop_without_release_on_drop() {
    let (client, mock) = client_with(LeaseConfig {
        release_on_drop: false,
        ..LeaseConfig::default()
    });
    configured(&client).await;
    client.acquire().await.unwrap();
    let handle = client.handle().unwrap();

    drop(client);
    tokio::time::sleep(TICK * 2).await;

    assert!(mock.server_holds_lease(handle));
    assert_eq!(mock.calls(Operation::Release), 0);
    assert_eq!(mock.calls(Operation::Renew), 0);
}
