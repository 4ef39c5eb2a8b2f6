use crate::models::{Comment, CommentUpdate, ResourceType};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// 出站消息。tag 用 snake_case，payload 字段用 camelCase (服务端契约)
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Auth { user_id: String },
    Ping {},
    CommentAdd(Comment),
    #[serde(rename_all = "camelCase")]
    CommentUpdate {
        comment_id: String,
        updates: CommentUpdate,
    },
    #[serde(rename_all = "camelCase")]
    CommentDelete { comment_id: String },
    #[serde(rename_all = "camelCase")]
    Typing {
        resource_id: String,
        user_id: String,
        is_typing: bool,
    },
    #[serde(rename_all = "camelCase")]
    Subscribe {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Unsubscribe {
        resource_type: ResourceType,
        resource_id: String,
    },
}

impl ClientMessage {
    // 封装成线缆信封：{type, payload, timestamp}
    pub fn into_envelope(self, at: DateTime<Utc>) -> serde_json::Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("timestamp".to_string(), Value::String(at.to_rfc3339()));
        }
        Ok(value)
    }
}

// 入站信封宽松解析：未知 type 与多余字段不报错 (向前兼容)
#[derive(Debug, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawEnvelope {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.payload.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub resource_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentUpdatePayload {
    pub comment_id: String,
    #[serde(default)]
    pub updates: CommentUpdate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDeletePayload {
    pub comment_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_envelope_shape() {
        let msg = ClientMessage::Auth {
            user_id: "u-1".to_string(),
        };
        let env = msg.into_envelope(Utc::now()).unwrap();

        assert_eq!(env["type"], "auth");
        assert_eq!(env["payload"]["userId"], "u-1");
        assert!(env["timestamp"].is_string());
    }

    #[test]
    fn typing_envelope_uses_camel_case_fields() {
        let msg = ClientMessage::Typing {
            resource_id: "task-1".to_string(),
            user_id: "u-1".to_string(),
            is_typing: true,
        };
        let env = msg.into_envelope(Utc::now()).unwrap();

        assert_eq!(env["type"], "typing");
        assert_eq!(env["payload"]["resourceId"], "task-1");
        assert_eq!(env["payload"]["isTyping"], true);
        assert!(env["payload"].get("resource_id").is_none());
    }

    #[test]
    fn ping_envelope_has_empty_payload() {
        let env = ClientMessage::Ping {}.into_envelope(Utc::now()).unwrap();
        assert_eq!(env["type"], "ping");
        assert_eq!(env["payload"], serde_json::json!({}));
    }

    #[test]
    fn raw_envelope_tolerates_unknown_type_and_extra_fields() {
        let raw = r#"{"type":"server_hint","payload":{"whatever":1},"timestamp":"2026-01-02T03:04:05Z","trace":"abc"}"#;
        let env = RawEnvelope::parse(raw).unwrap();
        assert_eq!(env.kind, "server_hint");
        assert!(env.timestamp.is_some());
    }

    #[test]
    fn raw_envelope_missing_payload_defaults_to_null() {
        let env = RawEnvelope::parse(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(env.kind, "pong");
        assert!(env.payload.is_null());
        assert!(env.timestamp.is_none());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(RawEnvelope::parse("{not json").is_err());
    }

    #[test]
    fn typing_payload_parses_camel_case() {
        let env = RawEnvelope::parse(
            r#"{"type":"user_typing","payload":{"resourceId":"task-1","userId":"u-2","userName":"Bob","isTyping":true}}"#,
        )
        .unwrap();
        let p: TypingPayload = env.payload_as().unwrap();
        assert_eq!(p.resource_id, "task-1");
        assert_eq!(p.user_name, "Bob");
        assert!(p.is_typing);
    }
}
