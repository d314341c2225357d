//! The published form of a committed event.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use borrowdesk_core::{AggregateId, DepartmentId};

/// A committed event together with the stream position it was written at.
///
/// `(department_id, aggregate_id, sequence_number)` identifies the event
/// within the store; consumers key their cursors on it and use the
/// department to keep read models apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    department_id: DepartmentId,

    aggregate_id: AggregateId,
    aggregate_type: String,

    /// 1-based, gapless within one stream.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        department_id: DepartmentId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            department_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn department_id(&self) -> DepartmentId {
        self.department_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// Stream family, e.g. `inventory.item`; consumers route on it.
    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}

impl EventEnvelope<JsonValue> {
    /// Deserialize the JSON payload into the event type of its stream.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, PartialEq, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum ShelfEvent {
        Restocked { quantity: u32 },
    }

    fn envelope(payload: JsonValue) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            DepartmentId::new(),
            AggregateId::new(),
            "inventory.item",
            3,
            payload,
        )
    }

    #[test]
    fn decode_reads_the_payload_as_the_stream_event_type() {
        let env = envelope(json!({ "type": "restocked", "quantity": 5 }));
        assert_eq!(env.decode::<ShelfEvent>().unwrap(), ShelfEvent::Restocked { quantity: 5 });
        assert_eq!(env.sequence_number(), 3);
        assert_eq!(env.aggregate_type(), "inventory.item");
    }

    #[test]
    fn decode_reports_payloads_of_another_shape() {
        let env = envelope(json!({ "type": "lent_out", "quantity": 5 }));
        assert!(env.decode::<ShelfEvent>().is_err());
    }
}
