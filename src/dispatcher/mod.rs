//! Broadcast dispatcher for presence events.
//!
//! Translates connection lifecycle and activity signals into envelopes and
//! fans them out to every connection in the registry's current snapshot.
//! Delivery is best effort: a failed send is logged and counted, never
//! propagated, and never blocks delivery to the remaining connections.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use uuid::Uuid;

use crate::registry::{ConnectionHandle, ConnectionRegistry, RegistryError};
use crate::websocket::{EventEnvelope, EventType, UPDATE_SIGNAL};

/// Maximum number of concurrent envelope sends per broadcast
const MAX_CONCURRENT_SENDS: usize = 64;

/// Result of a broadcast attempt
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    /// Number of connections the envelope was delivered to
    pub delivered_to: usize,
    /// Number of connections that failed to receive
    pub failed: usize,
    /// Whether any delivery was successful
    pub success: bool,
}

impl DeliveryResult {
    fn new(delivered: usize, failed: usize) -> Self {
        Self {
            delivered_to: delivered,
            failed,
            success: delivered > 0,
        }
    }
}

/// Statistics for the presence dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Total broadcasts attempted
    pub total_broadcasts: AtomicU64,
    /// Total successful deliveries (connection count)
    pub total_delivered: AtomicU64,
    /// Total failed deliveries
    pub total_failed: AtomicU64,
    /// Connect events broadcast
    pub connect_events: AtomicU64,
    /// Disconnect events broadcast
    pub disconnect_events: AtomicU64,
    /// Activity (message) events broadcast
    pub message_events: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_broadcasts: self.total_broadcasts.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            connect_events: self.connect_events.load(Ordering::Relaxed),
            disconnect_events: self.disconnect_events.load(Ordering::Relaxed),
            message_events: self.message_events.load(Ordering::Relaxed),
        }
    }

    fn record_event_type(&self, event_type: EventType) {
        let counter = match event_type {
            EventType::Connect => &self.connect_events,
            EventType::Disconnect => &self.disconnect_events,
            EventType::Message => &self.message_events,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_broadcasts: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub connect_events: u64,
    pub disconnect_events: u64,
    pub message_events: u64,
}

/// Dispatches presence events to connected clients
pub struct PresenceDispatcher {
    registry: Arc<ConnectionRegistry>,
    stats: DispatcherStats,
}

impl PresenceDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            stats: DispatcherStats::default(),
        }
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Register a connection and announce it to everyone.
    ///
    /// The connection itself is already registered when the envelope goes
    /// out, so the new client sees its own connect event. If registration
    /// fails nothing is broadcast.
    #[tracing::instrument(
        name = "dispatcher.connect",
        skip(self, handle),
        fields(connection_id = %handle.id, client_id = %handle.client_id)
    )]
    pub async fn connect(
        &self,
        handle: Arc<ConnectionHandle>,
    ) -> Result<DeliveryResult, RegistryError> {
        let client_id = handle.client_id.clone();
        self.registry.register(handle).await?;
        Ok(self.broadcast(EventEnvelope::connect(client_id)).await)
    }

    /// Deregister a connection and announce its departure.
    ///
    /// Terminal step of a connection's lifecycle, invoked exactly once when
    /// its receive loop ends. A failed deregistration suppresses the
    /// broadcast: the envelope only ever describes a connection that
    /// actually left the set.
    #[tracing::instrument(
        name = "dispatcher.disconnect",
        skip(self, handle),
        fields(connection_id = %handle.id, client_id = %handle.client_id)
    )]
    pub async fn disconnect(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<DeliveryResult, RegistryError> {
        self.registry.deregister(handle.id).await?;
        Ok(self
            .broadcast(EventEnvelope::disconnect(handle.client_id.clone()))
            .await)
    }

    /// Handle one inbound text signal from a connected client.
    ///
    /// Only the literal `"update"` triggers a broadcast; any other text is
    /// ignored with no reply.
    pub async fn signal(&self, client_id: &str, text: &str) -> Option<DeliveryResult> {
        if text != UPDATE_SIGNAL {
            tracing::trace!(client_id = %client_id, "Ignoring unrecognized signal");
            return None;
        }
        Some(self.broadcast(EventEnvelope::message(client_id)).await)
    }

    /// Broadcast an envelope to every connection in the current snapshot
    #[tracing::instrument(
        name = "dispatcher.broadcast",
        skip(self, envelope),
        fields(client_id = %envelope.client_id, event_type = ?envelope.event_type)
    )]
    pub async fn broadcast(&self, envelope: EventEnvelope) -> DeliveryResult {
        let connections = self.registry.snapshot().await;
        let event_type = envelope.event_type;
        let (delivered, failed) = self.send_to_connections(&connections, &envelope).await;

        // Update stats
        self.stats.total_broadcasts.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats
            .total_failed
            .fetch_add(failed as u64, Ordering::Relaxed);
        self.stats.record_event_type(event_type);

        tracing::debug!(
            delivered = delivered,
            failed = failed,
            "Broadcast presence event"
        );

        DeliveryResult::new(delivered, failed)
    }

    /// Send an envelope to a list of connections concurrently.
    ///
    /// Uses bounded parallelism so one slow or dead connection cannot stall
    /// delivery to the others. Each send is isolated; failures are counted
    /// and logged per recipient.
    async fn send_to_connections(
        &self,
        connections: &[Arc<ConnectionHandle>],
        envelope: &EventEnvelope,
    ) -> (usize, usize) {
        if connections.is_empty() {
            return (0, 0);
        }

        let mut futures = FuturesUnordered::new();
        let mut delivered = 0;
        let mut failed = 0;
        let mut pending = 0;

        for conn in connections {
            let conn = conn.clone();
            let event = envelope.clone();
            futures.push(async move { (conn.id, conn.send(event).await.is_ok()) });
            pending += 1;

            // Process completed futures when we hit the concurrency limit
            while pending >= MAX_CONCURRENT_SENDS {
                if let Some(result) = futures.next().await {
                    pending -= 1;
                    tally(result, &mut delivered, &mut failed);
                } else {
                    break;
                }
            }
        }

        // Process remaining futures
        while let Some(result) = futures.next().await {
            tally(result, &mut delivered, &mut failed);
        }

        (delivered, failed)
    }
}

fn tally(result: (Uuid, bool), delivered: &mut usize, failed: &mut usize) {
    let (connection_id, ok) = result;
    if ok {
        *delivered += 1;
    } else {
        *failed += 1;
        tracing::warn!(
            connection_id = %connection_id,
            "Failed to deliver presence event"
        );
    }
}
