//! Wire types for the hub's multiplexed JSON protocol.
//!
//! Every frame is a JSON object discriminated by its `type` field:
//!
//! - handshake: `auth_required` → `auth` → `auth_ok` | `auth_invalid`
//! - request:   `{id, type, ...params}` → `{id, type: "result", success, result | error}`
//! - push:      `{id, type: "event", event: {event_type, data, ...}}`
//!
//! Payload shapes owned by the hub (state objects, registry entries) keep
//! any fields we do not model in a flattened `extra` map so nothing the
//! hub sends is silently dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Event type the hub uses for entity state changes.
pub const STATE_CHANGED: &str = "state_changed";

// ── Inbound frames ───────────────────────────────────────────────────

/// Any frame the hub sends to the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result(ResultMessage),
    Event(EventMessage),
    Pong {
        id: u64,
    },
}

/// Response to a correlated request.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultMessage {
    pub id: u64,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<HubErrorPayload>,
}

impl ResultMessage {
    /// Collapse into the caller-facing outcome.
    pub fn into_outcome(self) -> Result<Value, Error> {
        if self.success {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            let err = self.error.unwrap_or_default();
            Err(Error::Hub {
                code: err.code,
                message: err.message,
            })
        }
    }
}

/// The `error` object of an unsuccessful result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubErrorPayload {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// A push event, tagged with the subscription id it was delivered for.
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    #[serde(default)]
    pub id: Option<u64>,
    pub event: HubEvent,
}

/// An event delivered by the hub on an active subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubEvent {
    pub event_type: String,

    #[serde(default)]
    pub data: Value,

    #[serde(default)]
    pub time_fired: Option<String>,

    #[serde(default)]
    pub origin: Option<String>,
}

impl HubEvent {
    /// Decode the payload of a `state_changed` event.
    ///
    /// Returns `None` for any other event type.
    pub fn state_changed(&self) -> Option<Result<StateChangedData, Error>> {
        if self.event_type != STATE_CHANGED {
            return None;
        }
        Some(
            serde_json::from_value(self.data.clone()).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: self.data.to_string(),
            }),
        )
    }
}

/// Payload of a `state_changed` event.
///
/// `new_state` is `None` when the entity was removed on the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangedData {
    pub entity_id: String,
    #[serde(default)]
    pub new_state: Option<StateObject>,
    #[serde(default)]
    pub old_state: Option<StateObject>,
}

// ── Hub-owned payloads ───────────────────────────────────────────────

/// A full entity state object as returned by `get_states` and carried in
/// `state_changed` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateObject {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_changed: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of `config/area_registry/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaEntry {
    pub area_id: String,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub floor_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of `config/floor_registry/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorEntry {
    pub floor_id: String,
    pub name: String,
    #[serde(default)]
    pub level: Option<i32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of `config/device_registry/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_by_user: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub disabled_by: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of `config/entity_registry/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRegistryEntry {
    pub entity_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub disabled_by: Option<String>,
    #[serde(default)]
    pub hidden_by: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Outbound frames ──────────────────────────────────────────────────

/// Credential frame, sent only after `auth_required`.
#[derive(Debug, Serialize)]
pub(crate) struct AuthFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    access_token: &'a str,
}

impl<'a> AuthFrame<'a> {
    pub(crate) fn new(access_token: &'a str) -> Self {
        Self {
            kind: "auth",
            access_token,
        }
    }
}

/// Explicit service target (`entity_id` and/or `area_id`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
}

/// A correlated request. Serialized with its `type` tag; the session adds
/// the `id` when the frame is written.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "get_states")]
    GetStates,

    #[serde(rename = "config/area_registry/list")]
    ListAreas,

    #[serde(rename = "config/floor_registry/list")]
    ListFloors,

    #[serde(rename = "config/device_registry/list")]
    ListDevices,

    #[serde(rename = "config/entity_registry/list")]
    ListEntityRegistry,

    #[serde(rename = "get_services")]
    GetServices,

    #[serde(rename = "subscribe_events")]
    SubscribeEvents { event_type: String },

    #[serde(rename = "call_service")]
    CallService {
        domain: String,
        service: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        service_data: Option<Map<String, Value>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<ServiceTarget>,
    },

    #[serde(rename = "media_player/browse_media")]
    BrowseMedia {
        entity_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_content_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_content_type: Option<String>,
    },

    #[serde(rename = "ping")]
    Ping,
}

impl Request {
    /// `call_service` aimed at a single entity: `entity_id` is merged into
    /// `service_data` next to any extra fields.
    pub fn call_service(
        domain: impl Into<String>,
        service: impl Into<String>,
        entity_id: impl Into<String>,
        extra: Map<String, Value>,
    ) -> Self {
        let mut service_data = extra;
        service_data.insert("entity_id".into(), Value::String(entity_id.into()));
        Self::CallService {
            domain: domain.into(),
            service: service.into(),
            service_data: Some(service_data),
            target: None,
        }
    }

    /// `media_player/browse_media`. The hub requires the content id and
    /// type together: if only one is given the other is sent empty, and
    /// neither is sent to browse the root.
    pub fn browse_media(
        entity_id: impl Into<String>,
        media_content_id: Option<String>,
        media_content_type: Option<String>,
    ) -> Self {
        let (media_content_id, media_content_type) = match (media_content_id, media_content_type) {
            (None, None) => (None, None),
            (id, kind) => (
                Some(id.unwrap_or_default()),
                Some(kind.unwrap_or_default()),
            ),
        };
        Self::BrowseMedia {
            entity_id: entity_id.into(),
            media_content_id,
            media_content_type,
        }
    }

    /// Short name used in logs and pending-request bookkeeping.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetStates => "get_states",
            Self::ListAreas => "config/area_registry/list",
            Self::ListFloors => "config/floor_registry/list",
            Self::ListDevices => "config/device_registry/list",
            Self::ListEntityRegistry => "config/entity_registry/list",
            Self::GetServices => "get_services",
            Self::SubscribeEvents { .. } => "subscribe_events",
            Self::CallService { .. } => "call_service",
            Self::BrowseMedia { .. } => "media_player/browse_media",
            Self::Ping => "ping",
        }
    }

    /// Encode as a text frame carrying correlation id `id`.
    pub(crate) fn to_frame(&self, id: u64) -> Result<String, Error> {
        let mut value =
            serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))?;
        match value.as_object_mut() {
            Some(obj) => {
                obj.insert("id".into(), Value::from(id));
            }
            None => return Err(Error::Serialization("request is not a JSON object".into())),
        }
        Ok(value.to_string())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parse_handshake_frames() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"type":"auth_required","ha_version":"2025.1.0"}"#).unwrap();
        assert!(matches!(msg, InboundMessage::AuthRequired { ha_version: Some(v) } if v == "2025.1.0"));

        let msg: InboundMessage = serde_json::from_str(r#"{"type":"auth_ok"}"#).unwrap();
        assert!(matches!(msg, InboundMessage::AuthOk { .. }));

        let msg: InboundMessage =
            serde_json::from_str(r#"{"type":"auth_invalid","message":"Invalid access"}"#).unwrap();
        assert!(matches!(msg, InboundMessage::AuthInvalid { message: Some(m) } if m == "Invalid access"));
    }

    #[test]
    fn result_error_becomes_hub_error() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "id": 7,
            "type": "result",
            "success": false,
            "error": { "code": "not_found", "message": "Service not found." }
        }))
        .unwrap();

        let InboundMessage::Result(result) = msg else {
            panic!("expected result frame");
        };
        assert_eq!(result.id, 7);
        let err = result.into_outcome().unwrap_err();
        assert_eq!(err.hub_error_code(), Some("not_found"));
    }

    #[test]
    fn successful_result_without_payload_is_null() {
        let msg: ResultMessage =
            serde_json::from_value(json!({"id": 1, "type": "result", "success": true})).unwrap();
        assert_eq!(msg.into_outcome().unwrap(), Value::Null);
    }

    #[test]
    fn state_changed_event_decodes() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "id": 2,
            "type": "event",
            "event": {
                "event_type": "state_changed",
                "time_fired": "2026-01-05T10:00:00.000000+00:00",
                "data": {
                    "entity_id": "light.kitchen",
                    "old_state": { "entity_id": "light.kitchen", "state": "off", "attributes": {} },
                    "new_state": {
                        "entity_id": "light.kitchen",
                        "state": "on",
                        "attributes": { "friendly_name": "Kitchen", "brightness": 255 },
                        "context": { "id": "abc" }
                    }
                }
            }
        }))
        .unwrap();

        let InboundMessage::Event(event) = msg else {
            panic!("expected event frame");
        };
        let data = event.event.state_changed().unwrap().unwrap();
        assert_eq!(data.entity_id, "light.kitchen");
        let new_state = data.new_state.unwrap();
        assert_eq!(new_state.state, "on");
        assert_eq!(new_state.attributes["brightness"], 255);
        assert_eq!(new_state.extra["context"]["id"], "abc");
        assert_eq!(data.old_state.unwrap().state, "off");
    }

    #[test]
    fn other_event_types_are_not_state_changes() {
        let event = HubEvent {
            event_type: "call_service".into(),
            data: json!({}),
            time_fired: None,
            origin: None,
        };
        assert!(event.state_changed().is_none());
    }

    #[test]
    fn unknown_frame_type_fails_to_parse() {
        assert!(serde_json::from_str::<InboundMessage>(r#"{"type":"mystery"}"#).is_err());
    }

    #[test]
    fn call_service_frame_shape() {
        let mut extra = Map::new();
        extra.insert("brightness".into(), json!(128));
        let frame = Request::call_service("light", "turn_on", "light.kitchen", extra)
            .to_frame(12)
            .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(
            value,
            json!({
                "id": 12,
                "type": "call_service",
                "domain": "light",
                "service": "turn_on",
                "service_data": { "entity_id": "light.kitchen", "brightness": 128 }
            })
        );
    }

    #[test]
    fn unit_request_frame_shape() {
        let frame = Request::ListFloors.to_frame(3).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({ "id": 3, "type": "config/floor_registry/list" }));
    }

    #[test]
    fn subscribe_events_frame_shape() {
        let frame = Request::SubscribeEvents {
            event_type: STATE_CHANGED.into(),
        }
        .to_frame(1)
        .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({ "id": 1, "type": "subscribe_events", "event_type": "state_changed" })
        );
    }

    #[test]
    fn browse_media_sends_content_fields_together() {
        let root = Request::browse_media("media_player.salon", None, None);
        assert_eq!(
            serde_json::to_value(&root).unwrap(),
            json!({ "type": "media_player/browse_media", "entity_id": "media_player.salon" })
        );

        let only_id = Request::browse_media("media_player.salon", Some("library".into()), None);
        assert_eq!(
            serde_json::to_value(&only_id).unwrap(),
            json!({
                "type": "media_player/browse_media",
                "entity_id": "media_player.salon",
                "media_content_id": "library",
                "media_content_type": ""
            })
        );
    }

    #[test]
    fn auth_frame_shape() {
        let value = serde_json::to_value(AuthFrame::new("secret")).unwrap();
        assert_eq!(value, json!({ "type": "auth", "access_token": "secret" }));
    }
}
