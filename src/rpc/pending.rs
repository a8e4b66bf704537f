//! Correlation table for in-flight requests.
//!
//! The map is guarded by one `std::sync::Mutex` held only while inserting,
//! removing or draining entries. Each entry owns a `oneshot` sender, so a
//! caller waits on its own receiver without touching the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::debug;

use crate::rpc::codec::{RequestId, Response};
use crate::rpc::error::RpcError;

type Delivery = Result<Response, RpcError>;

struct PendingEntry {
    tx: oneshot::Sender<Delivery>,
    created: Instant,
}

#[derive(Default)]
struct Table {
    entries: HashMap<RequestId, PendingEntry>,
    /// Set by `cancel_all`; no registrations are accepted afterwards.
    closed: Option<String>,
}

/// Tracks requests waiting for responses.
///
/// Cheap to clone; all clones share one table.
#[derive(Clone, Default)]
pub struct PendingRequests {
    table: Arc<Mutex<Table>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new pending request.
    ///
    /// # Errors
    ///
    /// - `RpcError::ConnectionLost` if the table was cancelled
    /// - `RpcError::Protocol` if `id` is already in flight
    pub fn register(&self, id: RequestId) -> Result<PendingSlot, RpcError> {
        let mut table = self.lock();
        if let Some(reason) = &table.closed {
            return Err(RpcError::ConnectionLost(reason.clone()));
        }
        if table.entries.contains_key(&id) {
            return Err(RpcError::Protocol(format!("request id {} already in flight", id)));
        }

        let (tx, rx) = oneshot::channel();
        table.entries.insert(
            id,
            PendingEntry {
                tx,
                created: Instant::now(),
            },
        );

        Ok(PendingSlot {
            id,
            rx,
            table: self.clone(),
        })
    }

    /// Complete a pending request with its response.
    ///
    /// Returns true if the id was found. An unknown id is left to the caller
    /// to report.
    pub fn resolve(&self, id: RequestId, response: Response) -> bool {
        let entry = self.lock().entries.remove(&id);
        match entry {
            Some(entry) => {
                debug!(%id, elapsed = ?entry.created.elapsed(), "resolved request");
                // Receiver may already be gone if the caller gave up
                let _ = entry.tx.send(Ok(response));
                true
            }
            None => false,
        }
    }

    /// Remove a pending request without delivering a response.
    pub fn remove(&self, id: RequestId) -> bool {
        self.lock().entries.remove(&id).is_some()
    }

    /// Fail every outstanding request with `ConnectionLost` and refuse new ones.
    ///
    /// Returns the number of callers woken.
    pub fn cancel_all(&self, reason: &str) -> usize {
        let drained: Vec<PendingEntry> = {
            let mut table = self.lock();
            table.closed = Some(reason.to_string());
            table.entries.drain().map(|(_, entry)| entry).collect()
        };

        let count = drained.len();
        for entry in drained {
            let _ = entry.tx.send(Err(RpcError::ConnectionLost(reason.to_string())));
        }
        count
    }

    /// Age of the oldest in-flight request.
    pub fn oldest_age(&self) -> Option<Duration> {
        self.lock()
            .entries
            .values()
            .map(|entry| entry.created.elapsed())
            .max()
    }

    /// Get the number of pending requests.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The waiting half of one correlation entry.
///
/// Dropping the slot unregisters the id, so a cancelled caller never leaves
/// a dangling entry behind.
pub struct PendingSlot {
    id: RequestId,
    rx: oneshot::Receiver<Delivery>,
    table: PendingRequests,
}

impl PendingSlot {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the response.
    ///
    /// # Errors
    ///
    /// - `RpcError::Timeout` if nothing arrives within `timeout`
    /// - `RpcError::ConnectionLost` if the table was cancelled
    pub async fn wait(mut self, timeout: Duration) -> Result<Response, RpcError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(delivery)) => delivery,
            Ok(Err(_)) => Err(RpcError::ConnectionLost(
                "correlation entry dropped".to_string(),
            )),
            Err(_) => Err(RpcError::Timeout(timeout)),
        }
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        // No-op when the entry was already resolved or cancelled
        self.table.remove(self.id);
    }
}
