use serde_json::Value;

use crate::ChannelError;

pub const JOIN_EVENT: &str = "phx_join";
pub const LEAVE_EVENT: &str = "phx_leave";
pub const REPLY_EVENT: &str = "phx_reply";
pub const ERROR_EVENT: &str = "phx_error";
pub const CLOSE_EVENT: &str = "phx_close";
pub const HEARTBEAT_TOPIC: &str = "phoenix";
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// One message in the Phoenix v2 JSON serializer:
/// `[join_ref, ref, topic, event, payload]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PhoenixFrame {
    pub join_ref: Option<String>,
    pub reference: Option<String>,
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

impl PhoenixFrame {
    pub fn encode(&self) -> Result<String, ChannelError> {
        serde_json::to_string(&Value::Array(vec![
            opt_string(&self.join_ref),
            opt_string(&self.reference),
            Value::String(self.topic.clone()),
            Value::String(self.event.clone()),
            self.payload.clone(),
        ]))
        .map_err(|err| ChannelError::Encode(err.to_string()))
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let Value::Array(mut parts) = serde_json::from_str::<Value>(raw).ok()? else {
            return None;
        };
        if parts.len() != 5 {
            return None;
        }
        let payload = parts.pop()?;
        let event = parts.pop()?.as_str()?.to_string();
        let topic = parts.pop()?.as_str()?.to_string();
        let reference = ref_field(parts.pop()?)?;
        let join_ref = ref_field(parts.pop()?)?;
        Some(Self {
            join_ref,
            reference,
            topic,
            event,
            payload,
        })
    }

    /// Splits a `phx_reply` payload into the server's verdict.
    pub fn reply_result(&self) -> Result<Value, ChannelError> {
        let status = self
            .payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("error");
        let response = self
            .payload
            .get("response")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        if status == "ok" {
            Ok(response)
        } else {
            Err(ChannelError::Rejected(response))
        }
    }
}

fn opt_string(value: &Option<String>) -> Value {
    value.clone().map_or(Value::Null, Value::String)
}

/// Refs are strings on the wire, but some servers send integers.
fn ref_field(value: Value) -> Option<Option<String>> {
    match value {
        Value::Null => Some(None),
        Value::String(s) => Some(Some(s)),
        Value::Number(n) => Some(Some(n.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn encodes_as_five_element_array() {
        let frame = PhoenixFrame {
            join_ref: Some("1".to_string()),
            reference: Some("2".to_string()),
            topic: "drab:/".to_string(),
            event: "event".to_string(),
            payload: json!({"event": "click"}),
        };
        assert_eq!(
            frame.encode().expect("encode"),
            r#"["1","2","drab:/","event",{"event":"click"}]"#
        );
        assert_eq!(
            PhoenixFrame::parse(&frame.encode().expect("encode")),
            Some(frame)
        );
    }

    #[test]
    fn parses_null_and_numeric_refs() {
        let frame =
            PhoenixFrame::parse(r#"[null, 7, "drab:/a", "execjs", {"js": "1"}]"#).expect("frame");
        assert_eq!(frame.join_ref, None);
        assert_eq!(frame.reference.as_deref(), Some("7"));
        assert_eq!(frame.event, "execjs");
    }

    #[test]
    fn rejects_malformed_frames() {
        assert_eq!(PhoenixFrame::parse("{}"), None);
        assert_eq!(PhoenixFrame::parse(r#"["1","2","t"]"#), None);
        assert_eq!(PhoenixFrame::parse(r#"["1",{},"t","e",{}]"#), None);
        assert_eq!(PhoenixFrame::parse("not json"), None);
    }

    #[test]
    fn reply_result_follows_status() {
        let ok = PhoenixFrame::parse(
            r#"[null,"3","drab:/","phx_reply",{"status":"ok","response":{"a":1}}]"#,
        )
        .expect("frame");
        assert_eq!(ok.reply_result(), Ok(json!({"a": 1})));

        let rejected = PhoenixFrame::parse(
            r#"[null,"3","drab:/","phx_reply",{"status":"error","response":{"reason":"unauthorized"}}]"#,
        )
        .expect("frame");
        assert_eq!(
            rejected.reply_result(),
            Err(ChannelError::Rejected(json!({"reason": "unauthorized"})))
        );
    }
}
