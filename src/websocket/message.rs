use serde::{Deserialize, Serialize};

/// The only inbound text frame that triggers a broadcast. Anything else is
/// ignored without a reply.
pub const UPDATE_SIGNAL: &str = "update";

/// Lifecycle event kinds carried in the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Connect,
    Disconnect,
    Message,
}

/// The envelope broadcast to every registered connection.
///
/// Exactly these fields cross the wire; `client_id` is whatever the client
/// supplied at connect time and may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub client_id: String,
    pub event_type: EventType,
}

impl EventEnvelope {
    pub fn connect(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            event_type: EventType::Connect,
        }
    }

    pub fn disconnect(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            event_type: EventType::Disconnect,
        }
    }

    pub fn message(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            event_type: EventType::Message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_format() {
        let json = serde_json::to_string(&EventEnvelope::connect("alice")).unwrap();
        assert_eq!(json, r#"{"client_id":"alice","event_type":"connect"}"#);

        let json = serde_json::to_string(&EventEnvelope::disconnect("bob")).unwrap();
        assert_eq!(json, r#"{"client_id":"bob","event_type":"disconnect"}"#);

        let json = serde_json::to_string(&EventEnvelope::message("alice")).unwrap();
        assert_eq!(json, r#"{"client_id":"alice","event_type":"message"}"#);
    }

    #[test]
    fn test_envelope_empty_client_id() {
        let json = serde_json::to_string(&EventEnvelope::connect("")).unwrap();
        assert_eq!(json, r#"{"client_id":"","event_type":"connect"}"#);
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = EventEnvelope::message("alice");
        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, envelope);
    }
}
