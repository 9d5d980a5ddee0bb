//! Delivery of renewal-failure notifications to the host application.
//!
//! By default the callback runs inline on the renewal task. Hosts that need
//! it on their own execution context (a UI thread, a single-threaded event
//! loop) install a [`ChannelDispatch`] and drain its [`DispatchQueue`] there.

use floatlease_types::ExpiryReason;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Host callback invoked when a lease expires.
pub type StatusCallback = Arc<dyn Fn(ExpiryReason) + Send + Sync>;

/// Strategy for running a [`StatusCallback`].
pub trait StatusDispatch: Send + Sync {
    /// Delivers `reason` to `callback`.
    fn dispatch(&self, callback: StatusCallback, reason: ExpiryReason);
}

/// Runs the callback on the caller's context.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatch;

impl StatusDispatch for InlineDispatch {
    fn dispatch(&self, callback: StatusCallback, reason: ExpiryReason) {
        callback(reason);
    }
}

/// A notification waiting to be delivered on the host's context.
pub struct Notification {
    callback: StatusCallback,
    reason: ExpiryReason,
}

impl Notification {
    /// Why the lease expired.
    pub fn reason(&self) -> ExpiryReason {
        self.reason
    }

    /// Invokes the callback on the current context.
    pub fn deliver(self) {
        (self.callback)(self.reason);
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// Posts notifications onto an unbounded queue drained by the host.
///
/// The queue never drops or reorders notifications. If the host has
/// dropped its [`DispatchQueue`], notifications are delivered inline.
#[derive(Debug, Clone)]
pub struct ChannelDispatch {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelDispatch {
    /// Creates the dispatch and the queue the host drains.
    pub fn new() -> (Self, DispatchQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, DispatchQueue { rx })
    }
}

impl StatusDispatch for ChannelDispatch {
    fn dispatch(&self, callback: StatusCallback, reason: ExpiryReason) {
        if let Err(mpsc::error::SendError(notification)) =
            self.tx.send(Notification { callback, reason })
        {
            warn!("Dispatch queue closed, delivering {:?} inline", reason);
            notification.deliver();
        } else {
            debug!("Queued expiry notification: {:?}", reason);
        }
    }
}

/// Receiving end of a [`ChannelDispatch`].
#[derive(Debug)]
pub struct DispatchQueue {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl DispatchQueue {
    /// Delivers every queued notification without waiting. Returns how
    /// many were delivered.
    pub fn run_pending(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(notification) = self.rx.try_recv() {
            notification.deliver();
            delivered += 1;
        }
        delivered
    }

    /// Waits for the next notification and delivers it.
    ///
    /// Returns `None` once every sender is gone.
    pub async fn run_next(&mut self) -> Option<ExpiryReason> {
        let notification = self.rx.recv().await?;
        let reason = notification.reason();
        notification.deliver();
        Some(reason)
    }

    /// Takes the next notification without delivering it.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

/// A registered callback paired with its dispatch strategy.
#[derive(Clone)]
pub(crate) struct StatusNotifier {
    callback: StatusCallback,
    dispatch: Arc<dyn StatusDispatch>,
}

impl StatusNotifier {
    pub(crate) fn new(callback: StatusCallback, dispatch: Arc<dyn StatusDispatch>) -> Self {
        Self { callback, dispatch }
    }

    pub(crate) fn notify(&self, reason: ExpiryReason) {
        self.dispatch.dispatch(self.callback.clone(), reason);
    }
}
