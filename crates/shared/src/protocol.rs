use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{CorrelationId, EventKind, SenderId},
    error::ExecFailure,
};

/// Outbound: a captured UI event.
pub const EVENT_MESSAGE: &str = "event";
/// Both directions: the one-shot page-ready signal and its server echo.
pub const ONLOAD_MESSAGE: &str = "onload";
/// Both directions: execution request from the controller and our reply.
pub const EXECJS_MESSAGE: &str = "execjs";

pub const TOPIC_PREFIX: &str = "drab:";

pub fn topic_for_path(path: &str) -> String {
    format!("{TOPIC_PREFIX}{path}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinParams {
    pub path: String,
    #[serde(rename = "drab_return")]
    pub return_mode: String,
}

/// Snapshot of an element taken at the moment an event fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(rename = "id")]
    pub element_id: Option<String>,
    pub text: String,
    pub html: String,
    #[serde(rename = "val")]
    pub value: Option<String>,
    #[serde(rename = "data", default)]
    pub dataset: BTreeMap<String, String>,
    #[serde(rename = "drab_id")]
    pub correlation_id: CorrelationId,
    #[serde(rename = "event_function")]
    pub handler_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: EventKind,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    #[serde(rename = "sender")]
    pub sender_id: SenderId,
    #[serde(rename = "js")]
    pub script: String,
}

/// Reply leg of `execjs`. Exactly one of `ok` / `error` is present and both
/// repeat the sender so the controller can correlate from either field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecReply {
    #[serde(rename = "sender")]
    pub sender_id: SenderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<(SenderId, Value)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<(SenderId, ExecFailure)>,
}

impl ExecReply {
    pub fn ok(sender_id: SenderId, value: Value) -> Self {
        Self {
            ok: Some((sender_id.clone(), value)),
            error: None,
            sender_id,
        }
    }

    pub fn failed(sender_id: SenderId, failure: ExecFailure) -> Self {
        Self {
            ok: None,
            error: Some((sender_id.clone(), failure)),
            sender_id,
        }
    }

    pub fn result(&self) -> Result<&Value, Option<&ExecFailure>> {
        match (&self.ok, &self.error) {
            (Some((_, value)), _) => Ok(value),
            (None, Some((_, failure))) => Err(Some(failure)),
            (None, None) => Err(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ExecFailureKind;

    #[test]
    fn event_message_uses_legacy_wire_names() {
        let message = EventMessage {
            event: EventKind::Click,
            payload: EventPayload {
                element_id: Some("save".to_string()),
                text: "Save".to_string(),
                html: "<b>Save</b>".to_string(),
                value: None,
                dataset: BTreeMap::from([("rowId".to_string(), "7".to_string())]),
                correlation_id: CorrelationId::from("c-1"),
                handler_name: Some("save_clicked".to_string()),
            },
        };

        assert_eq!(
            serde_json::to_value(&message).expect("encode"),
            json!({
                "event": "click",
                "payload": {
                    "id": "save",
                    "text": "Save",
                    "html": "<b>Save</b>",
                    "val": null,
                    "data": {"rowId": "7"},
                    "drab_id": "c-1",
                    "event_function": "save_clicked"
                }
            })
        );
    }

    #[test]
    fn exec_request_decodes_from_controller_shape() {
        let request: ExecRequest =
            serde_json::from_value(json!({"js": "2+2", "sender": "s1"})).expect("decode");
        assert_eq!(request.sender_id, SenderId::from("s1"));
        assert_eq!(request.script, "2+2");
    }

    #[test]
    fn exec_reply_success_and_failure_shapes() {
        let ok = ExecReply::ok(SenderId::from("s1"), json!(4));
        assert_eq!(
            serde_json::to_value(&ok).expect("encode"),
            json!({"sender": "s1", "ok": ["s1", 4]})
        );
        assert_eq!(ok.result(), Ok(&json!(4)));

        let failed = ExecReply::failed(
            SenderId::from("s2"),
            ExecFailure::new(ExecFailureKind::Thrown, "Error: x"),
        );
        assert_eq!(
            serde_json::to_value(&failed).expect("encode"),
            json!({"sender": "s2", "error": ["s2", {"kind": "thrown", "message": "Error: x"}]})
        );
        assert!(failed.result().is_err());
    }

    #[test]
    fn join_params_carry_return_mode_as_drab_return() {
        let params = JoinParams {
            path: "/orders".to_string(),
            return_mode: "html".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&params).expect("encode"),
            json!({"path": "/orders", "drab_return": "html"})
        );
        assert_eq!(topic_for_path("/orders"), "drab:/orders");
    }
}
