//! TCP transport to the license server.
//!
//! Identity registration and endpoint configuration are resolved locally:
//! handles are allocated per distinct identity and the endpoint is recorded
//! against the handle. Acquire, renew, release and metadata reads are
//! exchanged with the server over pooled keep-alive connections.

use crate::clock::{ClockWatch, DEFAULT_CLOCK_TOLERANCE};
use crate::codec::{read_frame, write_frame};
use crate::pool::ConnectionPool;
use crate::protocol::{ClientInfo, LeaseRequest, LeaseResponse, Operation};
use crate::transport::LeaseTransport;
use async_trait::async_trait;
use floatlease_types::{
    Handle, Identity, LeaseError, LeaseResult, Rejection, ServerEndpoint,
};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Configuration for [`TcpTransport`].
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Upper bound on one exchange, including connecting.
    pub request_timeout: Duration,
    /// Allowed backwards drift of the system clock between exchanges.
    pub clock_tolerance: Duration,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            clock_tolerance: DEFAULT_CLOCK_TOLERANCE,
        }
    }
}

#[derive(Debug)]
struct Binding {
    identity: Identity,
    endpoint: Option<ServerEndpoint>,
    leased: bool,
}

#[derive(Debug, Default)]
struct Bindings {
    by_identity: HashMap<Identity, Handle>,
    entries: HashMap<Handle, Binding>,
    next_handle: u32,
}

/// Talks to a license server over TCP with length-prefixed JSON frames.
pub struct TcpTransport {
    config: TcpTransportConfig,
    bindings: Mutex<Bindings>,
    pool: Arc<ConnectionPool>,
    clock: ClockWatch,
    client: ClientInfo,
}

impl TcpTransport {
    /// Creates a transport that shares the process-wide connection pool.
    pub fn new(config: TcpTransportConfig) -> Self {
        Self::with_pool(config, ConnectionPool::global())
    }

    /// Creates a transport with its own connection pool.
    pub fn with_pool(config: TcpTransportConfig, pool: Arc<ConnectionPool>) -> Self {
        let clock = ClockWatch::new(config.clock_tolerance);
        Self {
            config,
            bindings: Mutex::new(Bindings::default()),
            pool,
            clock,
            client: ClientInfo::collect(),
        }
    }

    /// Returns the connection pool this transport uses.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    fn bindings(&self) -> MutexGuard<'_, Bindings> {
        self.bindings.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Looks up the identity and endpoint for a handle.
    fn target(&self, handle: Handle) -> LeaseResult<(Identity, ServerEndpoint)> {
        let bindings = self.bindings();
        let binding = bindings
            .entries
            .get(&handle)
            .ok_or(LeaseError::InvalidHandle)?;
        let endpoint = binding
            .endpoint
            .clone()
            .ok_or(LeaseError::NotConfigured("server endpoint"))?;
        Ok((binding.identity.clone(), endpoint))
    }

    fn set_leased(&self, handle: Handle, leased: bool) {
        if let Some(binding) = self.bindings().entries.get_mut(&handle) {
            binding.leased = leased;
        }
    }

    async fn request(
        &self,
        op: Operation,
        handle: Handle,
        key: Option<&str>,
    ) -> LeaseResult<Option<String>> {
        let (identity, endpoint) = self.target(handle)?;
        self.clock.check()?;

        let mut request = LeaseRequest::new(op, handle, identity, self.client.clone());
        if let Some(key) = key {
            request = request.with_key(key);
        }

        let response = self.exchange(&endpoint, &request).await?;
        debug!("{:?} for handle {} -> {}", op, handle, response.status);
        response.into_result()
    }

    async fn exchange(
        &self,
        endpoint: &ServerEndpoint,
        request: &LeaseRequest,
    ) -> LeaseResult<LeaseResponse> {
        let address = endpoint.address();
        let slot = self.pool.slot(&address);
        let mut conn = slot.lock().await;

        let outcome = tokio::time::timeout(
            self.config.request_timeout,
            exchange_on(&mut conn, &address, request),
        )
        .await;

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                *conn = None;
                Err(io_error(&address, e))
            }
            Err(_) => {
                *conn = None;
                warn!("Request to {} timed out", address);
                Err(LeaseError::Timeout)
            }
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(TcpTransportConfig::default())
    }
}

/// Runs one exchange, reusing the pooled connection when there is one.
/// A pooled connection the server already closed is replaced once.
async fn exchange_on(
    conn: &mut Option<TcpStream>,
    address: &str,
    request: &LeaseRequest,
) -> io::Result<LeaseResponse> {
    if let Some(stream) = conn.as_mut() {
        match round_trip(stream, request).await {
            Ok(response) => return Ok(response),
            Err(e) if is_stale(&e) => {
                debug!("Pooled connection to {} is stale ({}), reconnecting", address, e);
                *conn = None;
            }
            Err(e) => return Err(e),
        }
    }

    let mut stream = TcpStream::connect(address).await?;
    stream.set_nodelay(true)?;
    let response = round_trip(&mut stream, request).await?;
    *conn = Some(stream);
    Ok(response)
}

async fn round_trip(stream: &mut TcpStream, request: &LeaseRequest) -> io::Result<LeaseResponse> {
    write_frame(stream, request).await?;
    read_frame(stream).await
}

fn is_stale(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

fn io_error(address: &str, e: io::Error) -> LeaseError {
    if e.kind() == io::ErrorKind::InvalidData {
        LeaseError::Protocol(e.to_string())
    } else {
        LeaseError::Network(format!("{address}: {e}"))
    }
}

#[async_trait]
impl LeaseTransport for TcpTransport {
    async fn register_identity(&self, identity: &Identity) -> LeaseResult<Handle> {
        let mut bindings = self.bindings();
        if let Some(handle) = bindings.by_identity.get(identity) {
            return Ok(*handle);
        }

        bindings.next_handle = bindings
            .next_handle
            .checked_add(1)
            .ok_or_else(|| LeaseError::InvalidIdentity("handle space exhausted".to_string()))?;
        let handle = Handle::from_raw(bindings.next_handle);
        bindings.by_identity.insert(identity.clone(), handle);
        bindings.entries.insert(
            handle,
            Binding {
                identity: identity.clone(),
                endpoint: None,
                leased: false,
            },
        );
        debug!("Registered identity {} as handle {}", identity, handle);
        Ok(handle)
    }

    async fn configure_endpoint(
        &self,
        handle: Handle,
        endpoint: &ServerEndpoint,
    ) -> LeaseResult<()> {
        let mut bindings = self.bindings();
        let binding = bindings
            .entries
            .get_mut(&handle)
            .ok_or(LeaseError::InvalidHandle)?;
        if binding.leased {
            return Err(LeaseError::EndpointLocked);
        }
        binding.endpoint = Some(endpoint.clone());
        Ok(())
    }

    async fn acquire(&self, handle: Handle) -> LeaseResult<()> {
        if self.has_active_lease(handle).await? {
            return Err(LeaseError::Rejected(Rejection::LicenseExists));
        }
        self.request(Operation::Acquire, handle, None).await?;
        self.set_leased(handle, true);
        info!("Leased license for handle {}", handle);
        Ok(())
    }

    async fn renew(&self, handle: Handle) -> LeaseResult<()> {
        match self.request(Operation::Renew, handle, None).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if !e.is_transient() {
                    self.set_leased(handle, false);
                }
                Err(e)
            }
        }
    }

    async fn release(&self, handle: Handle) -> LeaseResult<()> {
        let result = self.request(Operation::Release, handle, None).await;
        self.set_leased(handle, false);
        result.map(|_| ())
    }

    async fn has_active_lease(&self, handle: Handle) -> LeaseResult<bool> {
        self.bindings()
            .entries
            .get(&handle)
            .map(|b| b.leased)
            .ok_or(LeaseError::InvalidHandle)
    }

    async fn get_metadata(&self, handle: Handle, key: &str) -> LeaseResult<String> {
        self.request(Operation::GetMetadata, handle, Some(key))
            .await?
            .ok_or_else(|| LeaseError::Protocol("metadata response without payload".to_string()))
    }

    async fn forget_lease(&self, handle: Handle) {
        self.set_leased(handle, false);
        debug!("Dropped local lease record for handle {}", handle);
    }
}
