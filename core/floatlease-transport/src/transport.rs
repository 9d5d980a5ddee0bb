//! Transport abstraction.
//!
//! The lease client drives the license server exclusively through
//! [`LeaseTransport`], so tests can swap in [`mock::MockTransport`].

use async_trait::async_trait;
use floatlease_types::{Handle, Identity, LeaseResult, ServerEndpoint};

/// One request/response exchange per operation.
///
/// Implementations must be safe to call from the foreground caller and the
/// renewal task at the same time; the client guarantees that `renew` and
/// `release` for one handle never overlap.
#[async_trait]
pub trait LeaseTransport: Send + Sync {
    /// Exchanges an identity for a handle. Registering the same identity
    /// again returns the same handle.
    async fn register_identity(&self, identity: &Identity) -> LeaseResult<Handle>;

    /// Sets the server the handle talks to.
    async fn configure_endpoint(&self, handle: Handle, endpoint: &ServerEndpoint)
    -> LeaseResult<()>;

    /// Leases a seat.
    async fn acquire(&self, handle: Handle) -> LeaseResult<()>;

    /// Extends the current lease by one lease period.
    async fn renew(&self, handle: Handle) -> LeaseResult<()>;

    /// Frees the seat.
    async fn release(&self, handle: Handle) -> LeaseResult<()>;

    /// Returns whether the handle currently holds a lease.
    async fn has_active_lease(&self, handle: Handle) -> LeaseResult<bool>;

    /// Reads a metadata field attached to the lease.
    async fn get_metadata(&self, handle: Handle, key: &str) -> LeaseResult<String>;

    /// Drops the local record of a lease the client has declared expired.
    /// Nothing is sent; the next `acquire` goes to the server.
    async fn forget_lease(&self, handle: Handle);
}

/// A scriptable in-memory transport for testing.
pub mod mock {
    use super::*;
    use crate::protocol::Operation;
    use floatlease_types::{LeaseError, Rejection, StatusCode};
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockState {
        handles: HashMap<Identity, Handle>,
        next_handle: u32,
        endpoints: HashMap<Handle, ServerEndpoint>,
        leased: HashSet<Handle>,
        scripted: HashMap<Operation, VecDeque<StatusCode>>,
        sticky: HashMap<Operation, StatusCode>,
        calls: HashMap<Operation, usize>,
        metadata: HashMap<String, String>,
        latency: Option<Duration>,
    }

    /// An in-memory license server with scripted failures.
    ///
    /// Every operation succeeds unless a status has been scripted for it.
    /// Acquire, renew and release are counted as "network" calls; if two of
    /// them are ever in flight at once the overlap is recorded.
    #[derive(Default)]
    pub struct MockTransport {
        state: Mutex<MockState>,
        in_flight: AtomicUsize,
        overlap: AtomicBool,
    }

    impl MockTransport {
        /// Creates a mock where every operation succeeds.
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues a status to be returned by the next call to `op`.
        pub fn push_status(&self, op: Operation, status: StatusCode) {
            let mut state = self.state.lock().unwrap();
            state.scripted.entry(op).or_default().push_back(status);
        }

        /// Makes every call to `op` return `status` until cleared.
        pub fn fail_always(&self, op: Operation, status: StatusCode) {
            self.state.lock().unwrap().sticky.insert(op, status);
        }

        /// Removes a sticky failure.
        pub fn clear_failure(&self, op: Operation) {
            self.state.lock().unwrap().sticky.remove(&op);
        }

        /// Stores a metadata field served by `get_metadata`.
        pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
            self.state
                .lock()
                .unwrap()
                .metadata
                .insert(key.into(), value.into());
        }

        /// Delays acquire, renew and release by `latency`.
        pub fn set_latency(&self, latency: Duration) {
            self.state.lock().unwrap().latency = Some(latency);
        }

        /// Number of calls made to `op`.
        pub fn calls(&self, op: Operation) -> usize {
            self.state
                .lock()
                .unwrap()
                .calls
                .get(&op)
                .copied()
                .unwrap_or(0)
        }

        /// Returns true if two network calls were ever in flight together.
        pub fn overlap_detected(&self) -> bool {
            self.overlap.load(Ordering::SeqCst)
        }

        /// Returns whether the server side still counts the handle as leased.
        pub fn server_holds_lease(&self, handle: Handle) -> bool {
            self.state.lock().unwrap().leased.contains(&handle)
        }

        fn record(&self, op: Operation) -> LeaseResult<()> {
            let mut state = self.state.lock().unwrap();
            *state.calls.entry(op).or_default() += 1;
            let scripted = state.scripted.get_mut(&op).and_then(VecDeque::pop_front);
            let status = scripted
                .or_else(|| state.sticky.get(&op).copied())
                .unwrap_or(StatusCode::Ok);
            match LeaseError::from_status(status) {
                None => Ok(()),
                Some(err) => Err(err),
            }
        }

        fn check_handle(&self, handle: Handle) -> LeaseResult<()> {
            let state = self.state.lock().unwrap();
            if !handle.is_valid() || !state.handles.values().any(|h| *h == handle) {
                return Err(LeaseError::InvalidHandle);
            }
            Ok(())
        }

        async fn network_call(&self, op: Operation, handle: Handle) -> LeaseResult<()> {
            self.check_handle(handle)?;
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlap.store(true, Ordering::SeqCst);
            }
            let latency = self.state.lock().unwrap().latency;
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            let result = self.record(op);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[async_trait]
    impl LeaseTransport for MockTransport {
        async fn register_identity(&self, identity: &Identity) -> LeaseResult<Handle> {
            self.record(Operation::RegisterIdentity)?;
            let mut state = self.state.lock().unwrap();
            if let Some(handle) = state.handles.get(identity) {
                return Ok(*handle);
            }
            state.next_handle += 1;
            let handle = Handle::from_raw(state.next_handle);
            state.handles.insert(identity.clone(), handle);
            Ok(handle)
        }

        async fn configure_endpoint(
            &self,
            handle: Handle,
            endpoint: &ServerEndpoint,
        ) -> LeaseResult<()> {
            self.check_handle(handle)?;
            self.record(Operation::ConfigureEndpoint)?;
            self.state
                .lock()
                .unwrap()
                .endpoints
                .insert(handle, endpoint.clone());
            Ok(())
        }

        async fn acquire(&self, handle: Handle) -> LeaseResult<()> {
            if self.state.lock().unwrap().leased.contains(&handle) {
                return Err(LeaseError::Rejected(Rejection::LicenseExists));
            }
            self.network_call(Operation::Acquire, handle).await?;
            self.state.lock().unwrap().leased.insert(handle);
            Ok(())
        }

        async fn renew(&self, handle: Handle) -> LeaseResult<()> {
            let result = self.network_call(Operation::Renew, handle).await;
            if let Err(err) = &result {
                if !err.is_transient() {
                    self.state.lock().unwrap().leased.remove(&handle);
                }
            }
            result
        }

        async fn release(&self, handle: Handle) -> LeaseResult<()> {
            let result = self.network_call(Operation::Release, handle).await;
            self.state.lock().unwrap().leased.remove(&handle);
            result
        }

        async fn has_active_lease(&self, handle: Handle) -> LeaseResult<bool> {
            self.check_handle(handle)?;
            self.record(Operation::HasActiveLease)?;
            Ok(self.state.lock().unwrap().leased.contains(&handle))
        }

        async fn get_metadata(&self, handle: Handle, key: &str) -> LeaseResult<String> {
            self.check_handle(handle)?;
            self.record(Operation::GetMetadata)?;
            self.state
                .lock()
                .unwrap()
                .metadata
                .get(key)
                .cloned()
                .ok_or(LeaseError::Rejected(Rejection::MetadataKeyNotFound))
        }

        async fn forget_lease(&self, handle: Handle) {
            self.state.lock().unwrap().leased.remove(&handle);
        }
    }
}
