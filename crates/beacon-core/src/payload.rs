//! Event payload: the unit queued for delivery.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form property map carried by events.
pub type Properties = Map<String, Value>;

/// One telemetry record.
///
/// Built once through [`EventPayload::builder`] and never mutated afterwards.
/// The serialized shape is the ingestion wire format and the persisted
/// snapshot format; optional fields are omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    event: String,
    distinct_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    anonymous_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    properties: Option<Properties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_properties: Option<Properties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<Properties>,
    timestamp: String,
    event_id: String,
}

impl EventPayload {
    /// Start building a payload for `event` attributed to `distinct_id`.
    pub fn builder(event: impl Into<String>, distinct_id: impl Into<String>) -> EventPayloadBuilder {
        EventPayloadBuilder {
            event: event.into(),
            distinct_id: distinct_id.into(),
            anonymous_id: None,
            properties: None,
            user_properties: None,
            context: None,
            timestamp: None,
            event_id: None,
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn distinct_id(&self) -> &str {
        &self.distinct_id
    }

    pub fn anonymous_id(&self) -> Option<&str> {
        self.anonymous_id.as_deref()
    }

    pub fn properties(&self) -> Option<&Properties> {
        self.properties.as_ref()
    }

    pub fn user_properties(&self) -> Option<&Properties> {
        self.user_properties.as_ref()
    }

    pub fn context(&self) -> Option<&Properties> {
        self.context.as_ref()
    }

    /// ISO-8601 timestamp of the moment the payload was built.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }
}

/// Builder for [`EventPayload`].
#[derive(Debug, Clone)]
pub struct EventPayloadBuilder {
    event: String,
    distinct_id: String,
    anonymous_id: Option<String>,
    properties: Option<Properties>,
    user_properties: Option<Properties>,
    context: Option<Properties>,
    timestamp: Option<DateTime<Utc>>,
    event_id: Option<String>,
}

impl EventPayloadBuilder {
    pub fn anonymous_id(mut self, anonymous_id: impl Into<String>) -> Self {
        self.anonymous_id = Some(anonymous_id.into());
        self
    }

    /// Event properties. An empty map is treated as absent.
    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = non_empty(properties);
        self
    }

    /// User-property mutations. An empty map is treated as absent.
    pub fn user_properties(mut self, user_properties: Properties) -> Self {
        self.user_properties = non_empty(user_properties);
        self
    }

    /// Context snapshot. An empty map is treated as absent.
    pub fn context(mut self, context: Properties) -> Self {
        self.context = non_empty(context);
        self
    }

    /// Override the capture time (defaults to now).
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Override the event id (defaults to a fresh UUID v4).
    pub fn event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn build(self) -> EventPayload {
        let timestamp = self
            .timestamp
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        EventPayload {
            event: self.event,
            distinct_id: self.distinct_id,
            anonymous_id: self.anonymous_id,
            properties: self.properties,
            user_properties: self.user_properties,
            context: self.context,
            timestamp,
            event_id: self
                .event_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        }
    }
}

fn non_empty(map: Properties) -> Option<Properties> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn builder_generates_id_and_timestamp() {
        let a = EventPayload::builder("$pageview", "user-1").build();
        let b = EventPayload::builder("$pageview", "user-1").build();

        assert_ne!(a.event_id(), b.event_id());
        assert!(uuid::Uuid::parse_str(a.event_id()).is_ok());
        assert!(DateTime::parse_from_rfc3339(a.timestamp()).is_ok());
    }

    #[test]
    fn wire_shape_omits_absent_fields() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let payload = EventPayload::builder("signup", "user-1")
            .event_id("evt-1")
            .timestamp(ts)
            .properties(Properties::new())
            .build();

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "signup",
                "distinct_id": "user-1",
                "timestamp": "2026-03-01T12:00:00.000Z",
                "event_id": "evt-1",
            })
        );
    }

    #[test]
    fn wire_shape_includes_all_optional_fields() {
        let mut props = Properties::new();
        props.insert("plan".into(), json!("pro"));
        let mut user_props = Properties::new();
        user_props.insert("email".into(), json!("a@example.com"));
        let mut context = Properties::new();
        context.insert("session_id".into(), json!("sess-1"));

        let payload = EventPayload::builder("upgrade", "user-1")
            .anonymous_id("anon-1")
            .properties(props)
            .user_properties(user_props)
            .context(context)
            .build();

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["anonymous_id"], "anon-1");
        assert_eq!(value["properties"]["plan"], "pro");
        assert_eq!(value["user_properties"]["email"], "a@example.com");
        assert_eq!(value["context"]["session_id"], "sess-1");
    }

    #[test]
    fn deserializes_snapshot_without_optional_fields() {
        let raw = r#"{"event":"e","distinct_id":"d","timestamp":"2026-01-01T00:00:00.000Z","event_id":"x"}"#;
        let payload: EventPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.event(), "e");
        assert!(payload.anonymous_id().is_none());
        assert!(payload.properties().is_none());
    }
}
