//! Broadcast hub managing viewer connections.

use dashmap::DashMap;
use log::{debug, warn};
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Size of the per-connection send buffer.
const CONNECTION_BUFFER_SIZE: usize = 64;

/// Registry of live viewer connections with a broadcast operation.
///
/// Each registered connection owns an mpsc receiver whose messages are
/// already-serialized JSON frames; `broadcast` serializes the event once and
/// writes it to every connection. A connection whose channel is gone (viewer
/// disconnected) is dropped from the registry at the point of failure.
pub struct EventHub<E> {
    connections: DashMap<u64, mpsc::Sender<String>>,
    next_id: AtomicU64,
    _event: PhantomData<fn(E)>,
}

impl<E: Serialize> EventHub<E> {
    /// Create a new hub with no connections.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(0),
            _event: PhantomData,
        }
    }

    /// Register a new viewer connection.
    ///
    /// Returns the connection id and the receiver of serialized frames.
    pub fn register(&self) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER_SIZE);
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(conn_id, tx);
        debug!("Registered viewer connection {}", conn_id);
        (conn_id, rx)
    }

    /// Unregister a viewer connection.
    pub fn unregister(&self, conn_id: u64) {
        if self.connections.remove(&conn_id).is_some() {
            debug!("Unregistered viewer connection {}", conn_id);
        }
    }

    /// Broadcast an event to every currently registered connection.
    pub async fn broadcast(&self, event: &E) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize broadcast event: {}", e);
                return;
            }
        };

        let targets: Vec<(u64, mpsc::Sender<String>)> = self
            .connections
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (conn_id, tx) in targets {
            if tx.send(payload.clone()).await.is_err() {
                // Receiver dropped: the viewer disconnected.
                self.connections.remove(&conn_id);
                debug!("Dropped dead viewer connection {}", conn_id);
            }
        }
    }

    /// Number of currently registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl<E: Serialize> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}
