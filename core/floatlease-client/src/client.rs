//! The lease client.
//!
//! [`LeaseClient`] owns one handle and at most one lease. Foreground calls
//! (`bind_identity`, `configure_endpoint`, `acquire`, `release`) are
//! serialized by an async operation lock; state shared with the renewal
//! task sits behind a short-lived mutex that is never held across an await.

use crate::config::LeaseConfig;
use crate::dispatch::{InlineDispatch, StatusDispatch, StatusNotifier};
use crate::identity::IdentityBinder;
use crate::renewal::RenewalTask;
use crate::state::{LeaseEvent, LeaseState};
use chrono::{DateTime, Utc};
use floatlease_transport::{LeaseTransport, TcpTransport, TcpTransportConfig};
use floatlease_types::{
    ExpiryReason, Handle, Identity, IdentitySource, LeaseError, LeaseResult, ServerEndpoint,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a successful [`LeaseClient::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// A seat was leased.
    Acquired,
    /// A lease was already held; nothing was sent.
    AlreadyLeased,
}

/// Snapshot of the client's lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseInfo {
    pub state: LeaseState,
    pub handle: Option<Handle>,
    pub endpoint: Option<ServerEndpoint>,
    /// When the current (or last) lease was granted.
    pub acquired_at: Option<DateTime<Utc>>,
    /// Last successful renewal of the current lease.
    pub last_renewed_at: Option<DateTime<Utc>>,
    /// Transient renewal failures since the last success.
    pub consecutive_failures: u32,
}

struct Inner {
    state: LeaseState,
    binder: IdentityBinder,
    endpoint: Option<ServerEndpoint>,
    renewal: Option<RenewalTask>,
    notifier: Option<StatusNotifier>,
    acquired_at: Option<DateTime<Utc>>,
    last_renewed_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

impl Inner {
    fn missing_configuration(&self) -> &'static str {
        if self.binder.handle().is_none() {
            "identity"
        } else {
            "server endpoint"
        }
    }
}

/// State shared between the client and its renewal task.
pub(crate) struct Shared {
    config: LeaseConfig,
    transport: Arc<dyn LeaseTransport>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<LeaseState>,
}

impl Shared {
    pub(crate) fn config(&self) -> &LeaseConfig {
        &self.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn LeaseTransport> {
        &self.transport
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies a state event and publishes the new state.
    fn apply(&self, inner: &mut Inner, event: LeaseEvent) -> bool {
        match inner.state.on(event) {
            Some(next) => {
                if next != inner.state {
                    info!("Lease state {} -> {}", inner.state, next);
                    inner.state = next;
                    self.state_tx.send_replace(next);
                }
                true
            }
            None => {
                debug!("Ignoring {:?} in state {}", event, inner.state);
                false
            }
        }
    }

    fn maybe_configured(&self, inner: &mut Inner) {
        if inner.binder.handle().is_some() && inner.endpoint.is_some() {
            self.apply(inner, LeaseEvent::Configured);
        }
    }

    pub(crate) fn on_renewed(&self) {
        let mut inner = self.lock();
        if self.apply(&mut inner, LeaseEvent::Renewed) {
            inner.last_renewed_at = Some(Utc::now());
            inner.consecutive_failures = 0;
        }
    }

    pub(crate) fn on_degraded(&self, failures: u32) {
        let mut inner = self.lock();
        if self.apply(&mut inner, LeaseEvent::RenewalDegraded) {
            inner.consecutive_failures = failures;
        }
    }

    /// Moves to `Expired` and notifies the host, unless a release already
    /// cancelled the task.
    pub(crate) fn on_expired(&self, reason: ExpiryReason, failures: u32, cancel: &CancellationToken) {
        let notifier = {
            let mut inner = self.lock();
            if cancel.is_cancelled() {
                debug!("Expiry ({}) superseded by release", reason);
                return;
            }
            if !self.apply(&mut inner, LeaseEvent::Expired) {
                return;
            }
            inner.consecutive_failures = failures;
            inner.notifier.clone()
        };

        match notifier {
            Some(notifier) => notifier.notify(reason),
            None => warn!(
                "Lease expired ({}) with no renewal failure callback registered",
                reason
            ),
        }
    }
}

/// A floating license lease client.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> floatlease_types::LeaseResult<()> {
/// use floatlease_client::{LeaseClient, LeaseConfig};
/// use floatlease_types::Identity;
///
/// let client = LeaseClient::new(LeaseConfig::default())?;
/// client.bind_identity(Identity::product("PID-123")?).await?;
/// client.configure_endpoint("localhost", 8090).await?;
/// client.set_renewal_failure_callback(|reason| eprintln!("{reason}"));
/// client.acquire().await?;
/// // ...
/// client.release().await?;
/// # Ok(())
/// # }
/// ```
pub struct LeaseClient {
    shared: Arc<Shared>,
    op_lock: tokio::sync::Mutex<()>,
}

impl LeaseClient {
    /// Creates a client talking TCP through the process-wide connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidConfig`] if the config does not validate.
    pub fn new(config: LeaseConfig) -> LeaseResult<Self> {
        let transport = TcpTransport::new(TcpTransportConfig {
            request_timeout: config.request_timeout(),
            ..TcpTransportConfig::default()
        });
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a client over a custom transport.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidConfig`] if the config does not validate.
    pub fn with_transport(
        config: LeaseConfig,
        transport: Arc<dyn LeaseTransport>,
    ) -> LeaseResult<Self> {
        config.validate()?;
        let (state_tx, _) = watch::channel(LeaseState::Unconfigured);
        let inner = Inner {
            state: LeaseState::Unconfigured,
            binder: IdentityBinder::new(),
            endpoint: None,
            renewal: None,
            notifier: None,
            acquired_at: None,
            last_renewed_at: None,
            consecutive_failures: 0,
        };
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                transport,
                inner: Mutex::new(inner),
                state_tx,
            }),
            op_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LeaseConfig {
        &self.shared.config
    }

    // ── Configuration ────────────────────────────────────────────

    /// Fixes the identity source. Can be set once.
    ///
    /// # Errors
    ///
    /// See [`IdentityBinder::set_source`].
    pub fn set_identity_source(&self, source: IdentitySource) -> LeaseResult<()> {
        let mode = source.mode();
        self.shared.lock().binder.set_source(source)?;
        debug!("Identity source set ({})", mode);
        Ok(())
    }

    /// Registers an identity and caches its handle.
    ///
    /// Binding the same identity again returns the cached handle without
    /// contacting the transport.
    ///
    /// # Errors
    ///
    /// - [`LeaseError::IdentityAlreadyBound`] if another identity is bound
    /// - [`LeaseError::InvalidIdentity`] if it does not match the identity source
    /// - any transport error from registration
    pub async fn bind_identity(&self, identity: Identity) -> LeaseResult<Handle> {
        let _op = self.op_lock.lock().await;

        let cached = self.shared.lock().binder.admit(&identity)?;
        if let Some(handle) = cached {
            return Ok(handle);
        }

        let handle = self.shared.transport.register_identity(&identity).await?;
        if !handle.is_valid() {
            return Err(LeaseError::InvalidHandle);
        }

        let endpoint = self.shared.lock().endpoint.clone();
        if let Some(endpoint) = &endpoint {
            self.shared
                .transport
                .configure_endpoint(handle, endpoint)
                .await?;
        }

        let mut inner = self.shared.lock();
        info!("Identity {} bound to handle {}", identity, handle);
        inner.binder.record(identity, handle);
        self.shared.maybe_configured(&mut inner);
        Ok(handle)
    }

    /// Resolves the identity from the configured source and a version,
    /// then binds it.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::NotConfigured`] without an identity source,
    /// otherwise see [`LeaseClient::bind_identity`].
    pub async fn bind_version(&self, version: Option<&str>) -> LeaseResult<Handle> {
        let identity = self.shared.lock().binder.resolve(version)?;
        self.bind_identity(identity).await
    }

    /// Sets the license server address.
    ///
    /// # Errors
    ///
    /// - [`LeaseError::InvalidEndpoint`] for a blank host or port 0
    /// - [`LeaseError::EndpointLocked`] while a lease is held
    pub async fn configure_endpoint(&self, host: &str, port: u16) -> LeaseResult<()> {
        let endpoint = ServerEndpoint::new(host, port)?;
        let _op = self.op_lock.lock().await;

        let handle = {
            let inner = self.shared.lock();
            if inner.state.is_leased() {
                return Err(LeaseError::EndpointLocked);
            }
            inner.binder.handle()
        };

        if let Some(handle) = handle {
            self.shared
                .transport
                .configure_endpoint(handle, &endpoint)
                .await?;
        }

        let mut inner = self.shared.lock();
        debug!("Server endpoint set to {}", endpoint);
        inner.endpoint = Some(endpoint);
        self.shared.maybe_configured(&mut inner);
        Ok(())
    }

    /// Registers the callback invoked when the lease expires. It runs on
    /// the renewal task.
    pub fn set_renewal_failure_callback<F>(&self, callback: F)
    where
        F: Fn(ExpiryReason) + Send + Sync + 'static,
    {
        self.set_renewal_failure_callback_on(callback, Arc::new(InlineDispatch));
    }

    /// Registers the expiry callback with a custom dispatch strategy, e.g. a
    /// [`ChannelDispatch`](crate::ChannelDispatch) drained on a UI thread.
    pub fn set_renewal_failure_callback_on<F>(&self, callback: F, dispatch: Arc<dyn StatusDispatch>)
    where
        F: Fn(ExpiryReason) + Send + Sync + 'static,
    {
        self.shared.lock().notifier = Some(StatusNotifier::new(Arc::new(callback), dispatch));
    }

    // ── Leasing ──────────────────────────────────────────────────

    /// Leases a seat and starts background renewal.
    ///
    /// Calling this while a lease is held sends nothing and returns
    /// [`AcquireOutcome::AlreadyLeased`]. After an expiry or release the
    /// identity is registered again and the same handle is leased anew.
    ///
    /// # Errors
    ///
    /// - [`LeaseError::NotConfigured`] before identity and endpoint are set
    /// - the server's rejection, or a transient network error; the state
    ///   is left unchanged and no renewal is started
    pub async fn acquire(&self) -> LeaseResult<AcquireOutcome> {
        let _op = self.op_lock.lock().await;

        let (state, handle, identity, leftover) = {
            let mut inner = self.shared.lock();
            if inner.state.is_leased() {
                debug!("acquire() while already leased");
                return Ok(AcquireOutcome::AlreadyLeased);
            }
            if !inner.state.can_acquire() {
                return Err(LeaseError::NotConfigured(inner.missing_configuration()));
            }
            let (Some(handle), Some(identity)) =
                (inner.binder.handle(), inner.binder.identity().cloned())
            else {
                return Err(LeaseError::NotConfigured("identity"));
            };
            (inner.state, handle, identity, inner.renewal.take())
        };

        // An expired lease leaves its finished task behind.
        if let Some(task) = leftover {
            task.stop().await;
        }

        if state != LeaseState::Configured {
            let again = self.shared.transport.register_identity(&identity).await?;
            if again != handle {
                return Err(LeaseError::Protocol(format!(
                    "identity re-registered as {again}, expected {handle}"
                )));
            }
        }

        if let Err(e) = self.shared.transport.acquire(handle).await {
            warn!("Acquire for handle {} failed: {}", handle, e);
            let mut inner = self.shared.lock();
            self.shared.apply(&mut inner, LeaseEvent::AcquireFailed);
            return Err(e);
        }

        let mut inner = self.shared.lock();
        self.shared.apply(&mut inner, LeaseEvent::Acquired);
        inner.acquired_at = Some(Utc::now());
        inner.last_renewed_at = None;
        inner.consecutive_failures = 0;
        inner.renewal = Some(RenewalTask::spawn(self.shared.clone(), handle));
        if inner.notifier.is_none() {
            warn!("Lease acquired without a renewal failure callback");
        }
        Ok(AcquireOutcome::Acquired)
    }

    /// Stops renewal and gives the seat back.
    ///
    /// Waits for an in-flight renewal before sending the release. The
    /// state becomes `Released` even if the server call fails. After an
    /// expiry the release is best-effort and its failure is ignored.
    ///
    /// # Errors
    ///
    /// - [`LeaseError::NoActiveLease`] if nothing was leased
    /// - the transport error of a failed release of a held lease
    pub async fn release(&self) -> LeaseResult<()> {
        let _op = self.op_lock.lock().await;

        let (handle, task) = {
            let mut inner = self.shared.lock();
            if !inner.state.can_release() {
                return Err(LeaseError::NoActiveLease);
            }
            let Some(handle) = inner.binder.handle() else {
                return Err(LeaseError::NoActiveLease);
            };
            let task = inner.renewal.take();
            if let Some(task) = &task {
                task.cancel();
            }
            (handle, task)
        };

        if let Some(task) = task {
            task.stop().await;
        }

        let was_leased = self.shared.lock().state.is_leased();
        let result = self.shared.transport.release(handle).await;

        let mut inner = self.shared.lock();
        self.shared.apply(&mut inner, LeaseEvent::Released);
        inner.consecutive_failures = 0;
        drop(inner);

        match result {
            Ok(()) => {
                info!("Lease released for handle {}", handle);
                Ok(())
            }
            Err(e) if was_leased => {
                warn!("Release for handle {} failed: {}", handle, e);
                Err(e)
            }
            Err(e) => {
                debug!("Best-effort release after expiry failed: {}", e);
                Ok(())
            }
        }
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Returns whether a lease is held. Asks the transport only while the
    /// local state is `Leased`.
    ///
    /// # Errors
    ///
    /// Returns the transport error of the probe.
    pub async fn has_active_lease(&self) -> LeaseResult<bool> {
        let handle = {
            let inner = self.shared.lock();
            if !inner.state.is_leased() {
                return Ok(false);
            }
            inner.binder.handle()
        };
        match handle {
            Some(handle) => self.shared.transport.has_active_lease(handle).await,
            None => Ok(false),
        }
    }

    /// Reads a metadata field of the active lease.
    ///
    /// # Errors
    ///
    /// - [`LeaseError::NoActiveLease`] unless leased
    /// - [`LeaseError::Rejected`] with `MetadataKeyNotFound` for an unknown key
    pub async fn get_metadata_field(&self, key: &str) -> LeaseResult<String> {
        let handle = self.leased_handle()?;
        self.shared.transport.get_metadata(handle, key).await
    }

    /// Copies a metadata field into `buf`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::BufferTooSmall`] if the value does not fit;
    /// otherwise see [`LeaseClient::get_metadata_field`].
    pub async fn read_metadata_into(&self, key: &str, buf: &mut [u8]) -> LeaseResult<usize> {
        let value = self.get_metadata_field(key).await?;
        let bytes = value.as_bytes();
        if bytes.len() > buf.len() {
            return Err(LeaseError::BufferTooSmall {
                required: bytes.len(),
                capacity: buf.len(),
            });
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LeaseState {
        self.shared.lock().state
    }

    /// Watches state changes, including expiry from the renewal task.
    pub fn subscribe_state(&self) -> watch::Receiver<LeaseState> {
        self.shared.state_tx.subscribe()
    }

    /// The bound handle, if any.
    pub fn handle(&self) -> Option<Handle> {
        self.shared.lock().binder.handle()
    }

    /// Snapshot of the lease.
    pub fn lease_info(&self) -> LeaseInfo {
        let inner = self.shared.lock();
        LeaseInfo {
            state: inner.state,
            handle: inner.binder.handle(),
            endpoint: inner.endpoint.clone(),
            acquired_at: inner.acquired_at,
            last_renewed_at: inner.last_renewed_at,
            consecutive_failures: inner.consecutive_failures,
        }
    }

    fn leased_handle(&self) -> LeaseResult<Handle> {
        let inner = self.shared.lock();
        match inner.binder.handle() {
            Some(handle) if inner.state.is_leased() => Ok(handle),
            _ => Err(LeaseError::NoActiveLease),
        }
    }
}

impl Drop for LeaseClient {
    fn drop(&mut self) {
        let (task, handle) = {
            let mut inner = self.shared.lock();
            let task = inner.renewal.take();
            if let Some(task) = &task {
                task.cancel();
            }
            let handle = if inner.state.is_leased() {
                inner.binder.handle()
            } else {
                None
            };
            (task, handle)
        };

        let Some(handle) = handle else {
            return;
        };
        if !self.shared.config.release_on_drop {
            debug!("Dropping client with lease on handle {} held", handle);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let transport = self.shared.transport.clone();
                runtime.spawn(async move {
                    if let Some(task) = task {
                        task.stop().await;
                    }
                    match transport.release(handle).await {
                        Ok(()) => info!("Released lease for handle {} on drop", handle),
                        Err(e) => warn!("Release on drop for handle {} failed: {}", handle, e),
                    }
                });
            }
            Err(_) => warn!(
                "No async runtime while dropping client; lease on handle {} left to expire",
                handle
            ),
        }
    }
}
