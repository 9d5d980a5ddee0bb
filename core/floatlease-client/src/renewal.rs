//! Background lease renewal.
//!
//! While a lease is held, one task per client renews it every
//! `renewal_interval`. Ticks are strictly sequential: the next tick is not
//! awaited until the current renew exchange has returned. Stopping the task
//! lets an in-flight renew finish but starts no new one.

use crate::client::Shared;
use crate::config::LeaseConfig;
use floatlease_types::{ExpiryReason, Handle, LeaseResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one renewal tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The lease was extended.
    Renewed,
    /// A transient failure inside the grace window.
    Degraded {
        /// Consecutive transient failures so far.
        failures: u32,
    },
    /// The lease is lost.
    Expired(ExpiryReason),
}

/// Counts consecutive transient renewal failures.
///
/// The window is exhausted once `failures * interval` exceeds the grace period.
#[derive(Debug, Clone)]
pub struct GraceWindow {
    interval: Duration,
    grace: Duration,
    failures: u32,
}

impl GraceWindow {
    /// Creates a window for a tick interval and grace period.
    pub fn new(interval: Duration, grace: Duration) -> Self {
        Self {
            interval,
            grace,
            failures: 0,
        }
    }

    /// Creates a window from the client config.
    pub fn from_config(config: &LeaseConfig) -> Self {
        Self::new(config.renewal_interval(), config.grace_period())
    }

    /// Consecutive transient failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// True once the tolerated outage has been used up.
    pub fn exhausted(&self) -> bool {
        self.interval.saturating_mul(self.failures) > self.grace
    }

    /// Classifies the result of a renew exchange and updates the count.
    pub fn observe(&mut self, result: &LeaseResult<()>) -> TickOutcome {
        match result {
            Ok(()) => {
                self.failures = 0;
                TickOutcome::Renewed
            }
            Err(e) if e.is_transient() => {
                self.failures = self.failures.saturating_add(1);
                if self.exhausted() {
                    TickOutcome::Expired(ExpiryReason::LeaseExpiredNetwork)
                } else {
                    TickOutcome::Degraded {
                        failures: self.failures,
                    }
                }
            }
            Err(e) => TickOutcome::Expired(e.expiry_reason()),
        }
    }
}

/// A running renewal task.
pub(crate) struct RenewalTask {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl RenewalTask {
    /// Starts renewing `handle`. The first tick fires one interval from now.
    pub(crate) fn spawn(shared: Arc<Shared>, handle: Handle) -> Self {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(run(shared, handle, cancel.clone()));
        Self { cancel, join }
    }

    /// Signals the task to stop without waiting for it.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Signals the task to stop and waits for any in-flight tick.
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            if e.is_panic() {
                warn!("Renewal task panicked: {}", e);
            }
        }
    }
}

async fn run(shared: Arc<Shared>, handle: Handle, cancel: CancellationToken) {
    let period = shared.config().renewal_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut window = GraceWindow::from_config(shared.config());

    debug!("Renewal scheduler started for handle {} every {:?}", handle, period);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if cancel.is_cancelled() {
            break;
        }

        let result = shared.transport().renew(handle).await;
        match window.observe(&result) {
            TickOutcome::Renewed => {
                debug!("Renewed lease for handle {}", handle);
                shared.on_renewed();
            }
            TickOutcome::Degraded { failures } => {
                if let Err(e) = &result {
                    warn!(
                        "Renewal for handle {} failed ({} in a row): {}",
                        handle, failures, e
                    );
                }
                shared.on_degraded(failures);
            }
            TickOutcome::Expired(reason) => {
                match &result {
                    Err(e) => warn!("Lease for handle {} expired: {} ({})", handle, reason, e),
                    Ok(()) => warn!("Lease for handle {} expired: {}", handle, reason),
                }
                shared.transport().forget_lease(handle).await;
                shared.on_expired(reason, window.failures(), &cancel);
                info!("Renewal scheduler for handle {} stopped after expiry", handle);
                return;
            }
        }
    }

    debug!("Renewal scheduler for handle {} cancelled", handle);
}
