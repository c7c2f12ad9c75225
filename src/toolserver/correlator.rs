//! Request/response correlation over a single duplex byte stream.
//!
//! Every outbound call is assigned a fresh UUID, registered in the pending
//! table together with a [`oneshot`] resolver, written through the
//! [`Transport`], and then awaited. One fixed per-request budget covers both
//! the write and the wait for the response.
//!
//! A pending entry is consumed exactly once, by whichever of these observes
//! it first:
//!
//! | Event                           | Outcome delivered to the caller       |
//! |---------------------------------|---------------------------------------|
//! | Matching response (`result`)    | `Ok(result)`                          |
//! | Matching response (`error`)     | [`AppError::Rpc`]                     |
//! | Budget elapsed (write or wait)  | [`AppError::RequestTimeout`]          |
//! | Process exit ([`fail_all`])     | [`AppError::ProcessTerminated`]       |
//!
//! Removal from the table is the claim: the map lock makes it atomic, so a
//! response racing the timeout can only be delivered by one of them, and a
//! late or duplicate response finds nothing and is dropped.
//!
//! [`fail_all`]: Correlator::fail_all

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::toolserver::codec;
use crate::toolserver::message::{RpcNotification, RpcRequest, RpcResponse};
use crate::{AppError, Result};

/// Which lifecycle gate a write must pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    /// Allowed only while the server is starting (the `initialize` exchange).
    Handshake,
    /// Allowed only once the server is ready.
    Operational,
}

/// Outbound half of the byte stream.
pub trait Transport: Send + Sync {
    /// Write one encoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ProcessNotReady`] if the gate for `phase` is
    /// closed, or [`AppError::ProcessTerminated`] if the stream is broken.
    fn send_frame(
        &self,
        frame: Bytes,
        phase: WritePhase,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Called when a write was cut off by the request budget.
    ///
    /// A partially written frame leaves the stream unframed, so an
    /// implementation backed by a live peer should stop using it.
    fn abandon_write(&self) {}
}

type Resolver = oneshot::Sender<Result<Value>>;

/// One outstanding request.
struct PendingCall {
    method: String,
    issued_at: Instant,
    resolver: Resolver,
}

/// Multiplexes concurrent calls over one [`Transport`].
pub struct Correlator {
    transport: Arc<dyn Transport>,
    pending: Mutex<HashMap<String, PendingCall>>,
    timeout: Duration,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.pending_count())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Correlator {
    /// Create a correlator writing through `transport` with a per-call budget.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport,
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Per-call response budget.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of calls currently awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Issue `method` and wait for its response.
    ///
    /// # Errors
    ///
    /// - [`AppError::Rpc`] if the server answers with an error object.
    /// - [`AppError::RequestTimeout`] if the write or the response misses the budget.
    /// - [`AppError::ProcessTerminated`] if the server exits first.
    /// - [`AppError::ProcessNotReady`] if the server is not accepting writes.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.call_in_phase(method, params, WritePhase::Operational)
            .await
    }

    /// Like [`call`](Self::call) but allowed while the server is starting.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call).
    pub async fn call_handshake(&self, method: &str, params: Value) -> Result<Value> {
        self.call_in_phase(method, params, WritePhase::Handshake)
            .await
    }

    /// Send a notification; nothing is registered and nothing is awaited.
    ///
    /// # Errors
    ///
    /// Propagates transport write failures.
    pub async fn notify(&self, method: &str, params: Option<Value>, phase: WritePhase) -> Result<()> {
        let frame = codec::encode(&RpcNotification::new(method, params))?;
        self.transport.send_frame(frame, phase).await?;
        debug!(method, "notification sent");
        Ok(())
    }

    /// Route an inbound response to its caller.
    ///
    /// Returns `false` when no call with that id is pending (late arrival,
    /// duplicate, or an id we never issued); such responses are dropped.
    pub fn dispatch(&self, response: RpcResponse) -> bool {
        let Some(call) = self.take(&response.id) else {
            debug!(id = %response.id, "unmatched response dropped");
            return false;
        };

        debug!(
            id = %response.id,
            method = %call.method,
            elapsed = ?call.issued_at.elapsed(),
            "response matched"
        );
        if call.resolver.send(response.into_result()).is_err() {
            debug!(method = %call.method, "caller stopped waiting before resolution");
        }
        true
    }

    /// Reject every pending call with [`AppError::ProcessTerminated`].
    ///
    /// Returns the number of calls rejected.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<(String, PendingCall)> = self.lock().drain().collect();
        let count = drained.len();

        for (id, call) in drained {
            warn!(%id, method = %call.method, reason, "pending call failed: tool server gone");
            let _ = call
                .resolver
                .send(Err(AppError::ProcessTerminated(reason.to_owned())));
        }
        count
    }

    async fn call_in_phase(&self, method: &str, params: Value, phase: WritePhase) -> Result<Value> {
        let (tx, mut rx) = oneshot::channel();
        let id = self.register(method, tx);
        let _guard = PendingGuard {
            correlator: self,
            id: &id,
        };

        let deadline = Instant::now() + self.timeout;
        let frame = codec::encode(&RpcRequest::new(id.as_str(), method, params))?;
        if let Ok(written) =
            tokio::time::timeout_at(deadline, self.transport.send_frame(frame, phase)).await
        {
            written?;
        } else {
            self.take(&id);
            warn!(%id, method, timeout = ?self.timeout, "request timed out while writing");
            self.transport.abandon_write();
            return Err(self.timed_out(method));
        }
        debug!(%id, method, "request sent");

        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        let outcome = tokio::select! {
            resolved = &mut rx => resolved,
            () = &mut expiry => {
                if self.take(&id).is_some() {
                    warn!(%id, method, timeout = ?self.timeout, "request timed out");
                    return Err(self.timed_out(method));
                }
                // A resolution claimed the entry first; its value is in flight.
                rx.await
            }
        };

        outcome.unwrap_or_else(|_| {
            Err(AppError::ProcessTerminated(
                "pending call dropped without resolution".into(),
            ))
        })
    }

    fn timed_out(&self, method: &str) -> AppError {
        AppError::RequestTimeout {
            method: method.to_owned(),
            timeout: self.timeout,
        }
    }

    fn register(&self, method: &str, resolver: Resolver) -> String {
        let mut pending = self.lock();
        let mut id = Uuid::new_v4().to_string();
        while pending.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }
        pending.insert(
            id.clone(),
            PendingCall {
                method: method.to_owned(),
                issued_at: Instant::now(),
                resolver,
            },
        );
        id
    }

    fn take(&self, id: &str) -> Option<PendingCall> {
        self.lock().remove(id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingCall>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes the caller's entry if the call future ends without a resolution
/// (write failure, encode failure, or the future being dropped).
struct PendingGuard<'a> {
    correlator: &'a Correlator,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.take(self.id);
    }
}
