//! Messages exchanged over the real-time channel.
//!
//! Every frame is a flat JSON object with a `type` field. Inbound frames are
//! decoded once, here, into [`ClientMessage`]; the type tag is matched
//! case-insensitively and unknown tags survive as
//! [`ClientMessage::Unrecognized`] so the hub can answer them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Brand { brand: Option<String> },
    GetMap,
    GetOrders,
    PlacePixel {
        x: Option<i64>,
        y: Option<i64>,
        color: Option<i64>,
    },
    Ping,
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Failed to parse message!")]
    Malformed,
    #[error("Data missing type!")]
    MissingType,
}

impl ClientMessage {
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(raw).map_err(|_| DecodeError::Malformed)?;
        let kind = match value.get("type") {
            Some(Value::String(kind)) if !kind.is_empty() => kind.to_lowercase(),
            Some(Value::Null) | Some(Value::String(_)) | None => {
                return Err(DecodeError::MissingType)
            }
            Some(other) => other.to_string(),
        };
        let int = |key: &str| value.get(key).and_then(Value::as_i64);

        Ok(match kind.as_str() {
            "brand" => ClientMessage::Brand {
                brand: value
                    .get("brand")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            "getmap" => ClientMessage::GetMap,
            "getorders" => ClientMessage::GetOrders,
            "placepixel" => ClientMessage::PlacePixel {
                x: int("x"),
                y: int("y"),
                color: int("color"),
            },
            "ping" => ClientMessage::Ping,
            _ => ClientMessage::Unrecognized(kind),
        })
    }

    /// Wire form used by [`crate::client`].
    pub fn encode(&self) -> String {
        let value = match self {
            ClientMessage::Brand { brand } => serde_json::json!({ "type": "brand", "brand": brand }),
            ClientMessage::GetMap => serde_json::json!({ "type": "getmap" }),
            ClientMessage::GetOrders => serde_json::json!({ "type": "getorders" }),
            ClientMessage::PlacePixel { x, y, color } => {
                serde_json::json!({ "type": "placepixel", "x": x, "y": y, "color": color })
            }
            ClientMessage::Ping => serde_json::json!({ "type": "ping" }),
            ClientMessage::Unrecognized(kind) => serde_json::json!({ "type": kind }),
        };
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Map { data: String, reason: Option<String> },
    Orders { data: String, reason: Option<String> },
    Pong,
    Error { data: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            data: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // A tagged enum of strings cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_types_case_insensitively() {
        assert_eq!(ClientMessage::decode(br#"{"type":"PING"}"#), Ok(ClientMessage::Ping));
        assert_eq!(
            ClientMessage::decode(br#"{"type":"getMap"}"#),
            Ok(ClientMessage::GetMap)
        );
        assert_eq!(
            ClientMessage::decode(br#"{"type":"GetOrders"}"#),
            Ok(ClientMessage::GetOrders)
        );
    }

    #[test]
    fn decodes_placement_fields_loosely() {
        assert_eq!(
            ClientMessage::decode(br#"{"type":"placepixel","x":10,"y":"2","color":1.5}"#),
            Ok(ClientMessage::PlacePixel {
                x: Some(10),
                y: None,
                color: None
            })
        );
    }

    #[test]
    fn brand_must_be_a_string() {
        assert_eq!(
            ClientMessage::decode(br#"{"type":"brand","brand":7}"#),
            Ok(ClientMessage::Brand { brand: None })
        );
        assert_eq!(
            ClientMessage::decode(br#"{"type":"brand","brand":"rustbot"}"#),
            Ok(ClientMessage::Brand {
                brand: Some("rustbot".to_string())
            })
        );
    }

    #[test]
    fn reports_malformed_and_missing_type() {
        assert_eq!(ClientMessage::decode(b"{nope"), Err(DecodeError::Malformed));
        assert_eq!(ClientMessage::decode(br#"{"x":1}"#), Err(DecodeError::MissingType));
        assert_eq!(ClientMessage::decode(br#"{"type":""}"#), Err(DecodeError::MissingType));
        assert_eq!(ClientMessage::decode(b"[1,2]"), Err(DecodeError::MissingType));
    }

    #[test]
    fn unknown_types_are_kept() {
        assert_eq!(
            ClientMessage::decode(br#"{"type":"Subscribe"}"#),
            Ok(ClientMessage::Unrecognized("subscribe".to_string()))
        );
    }

    #[test]
    fn client_encoding_decodes_back() {
        let msg = ClientMessage::PlacePixel {
            x: Some(1),
            y: Some(2),
            color: Some(3),
        };
        assert_eq!(ClientMessage::decode(msg.encode().as_bytes()), Ok(msg));
    }

    #[test]
    fn server_messages_are_flat_and_typed() {
        let map = ServerMessage::Map {
            data: "1.png".to_string(),
            reason: None,
        };
        assert_eq!(map.to_json(), r#"{"type":"map","data":"1.png","reason":null}"#);
        assert_eq!(ServerMessage::Pong.to_json(), r#"{"type":"pong"}"#);
        assert_eq!(
            ServerMessage::error("Unknown command!").to_json(),
            r#"{"type":"error","data":"Unknown command!"}"#
        );
    }
}
