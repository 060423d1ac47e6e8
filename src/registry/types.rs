//! Connection handle and related types

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::EventEnvelope;

/// Handle for a single WebSocket connection
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub client_id: String,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<EventEnvelope>,
}

impl ConnectionHandle {
    pub fn new(client_id: String, sender: mpsc::Sender<EventEnvelope>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            connected_at: Utc::now(),
            sender,
        }
    }

    /// Queue an envelope for delivery to this connection's socket.
    ///
    /// Fails once the socket side has gone away and dropped its receiver.
    pub async fn send(
        &self,
        envelope: EventEnvelope,
    ) -> Result<(), mpsc::error::SendError<EventEnvelope>> {
        self.sender.send(envelope).await
    }
}

/// Errors from registry mutation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The same connection was registered twice
    #[error("connection {0} is already registered")]
    AlreadyRegistered(Uuid),

    /// Deregistration of a connection that is not in the set. Indicates a
    /// lifecycle-invariant violation in the caller.
    #[error("connection {0} is not registered")]
    NotRegistered(Uuid),
}
