//! Text framing for Engine.IO v4 and the Socket.IO v4 packets carried inside of it.
//!
//! Only the default namespace and text packets are supported, binary attachments are rejected.

use std::time::Duration;

use anyhow::{anyhow, bail};
use serde::Deserialize;
use serde_json::Value;

use tracker_logic::prelude::*;

/// Handshake sent by the server as the very first packet
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

impl OpenInfo {
    /// How long to wait for any traffic before the server should be considered gone
    pub fn ping_deadline(&self) -> Option<Duration> {
        let total = self.ping_interval + self.ping_timeout;
        (total != 0).then(|| Duration::from_millis(total))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    Ack,
    ConnectError(String),
}

impl From<SocketPacket> for EnginePacket {
    fn from(v: SocketPacket) -> Self {
        Self::Message(v)
    }
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or_else(|| anyhow!("Empty packet"))?;
        let rest = chars.as_str();
        Ok(match kind {
            '0' => Self::Open(serde_json::from_str(rest).context("Invalid open packet")?),
            '1' => Self::Close,
            '2' => Self::Ping(rest.to_string()),
            '3' => Self::Pong(rest.to_string()),
            '4' => Self::Message(SocketPacket::decode(rest)?),
            '5' => Self::Upgrade,
            '6' => Self::Noop,
            other => bail!("Unknown engine packet type {other:?}"),
        })
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Open(info) => format!(
                "0{}",
                serde_json::json!({
                    "sid": info.sid,
                    "pingInterval": info.ping_interval,
                    "pingTimeout": info.ping_timeout,
                })
            ),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(packet) => format!("4{}", packet.encode()),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

impl SocketPacket {
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| anyhow!("Empty socket packet"))?;
        let mut rest = chars.as_str();

        if rest.starts_with('/') {
            rest = rest.find(',').map_or("", |i| &rest[i + 1..]);
        }

        // Ack IDs aren't used, skip them
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

        Ok(match kind {
            '0' => {
                if rest.is_empty() {
                    Self::Connect(None)
                } else {
                    Self::Connect(Some(
                        serde_json::from_str(rest).context("Invalid connect packet")?,
                    ))
                }
            }
            '1' => Self::Disconnect,
            '2' => {
                let mut args = serde_json::from_str::<Vec<Value>>(rest)
                    .context("Invalid event packet")?
                    .into_iter();
                let name = match args.next() {
                    Some(Value::String(name)) => name,
                    _ => bail!("Event packet is missing a name"),
                };
                Self::Event {
                    name,
                    data: args.next().unwrap_or(Value::Null),
                }
            }
            '3' => Self::Ack,
            '4' => {
                let message = match serde_json::from_str::<Value>(rest) {
                    Ok(Value::Object(obj)) => obj
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| Value::Object(obj).to_string()),
                    Ok(Value::String(s)) => s,
                    _ => rest.to_string(),
                };
                Self::ConnectError(message)
            }
            '5' | '6' => bail!("Binary packets aren't supported"),
            other => bail!("Unknown socket packet type {other:?}"),
        })
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Connect(None) => "0".to_string(),
            Self::Connect(Some(auth)) => format!("0{auth}"),
            Self::Disconnect => "1".to_string(),
            Self::Event { name, data } => {
                format!("2{}", Value::Array(vec![Value::String(name.clone()), data.clone()]))
            }
            Self::Ack => "3[]".to_string(),
            Self::ConnectError(message) => {
                format!("4{}", serde_json::json!({ "message": message }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_open() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .expect("Failed to decode");

        let info = match packet {
            EnginePacket::Open(info) => info,
            other => panic!("Not an open packet: {other:?}"),
        };
        assert_eq!(info.sid, "lv_VI97HAXpY6yYWAAAC");
        assert_eq!(info.ping_deadline(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn test_ping_pong() {
        assert_eq!(
            EnginePacket::decode("2").expect("Failed to decode"),
            EnginePacket::Ping(String::new())
        );
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
        assert_eq!(EnginePacket::Pong("hb".to_string()).encode(), "3hb");
    }

    #[test]
    fn test_namespace_connect() {
        assert_eq!(
            EnginePacket::from(SocketPacket::Connect(None)).encode(),
            "40"
        );
        assert_eq!(
            EnginePacket::decode(r#"40{"sid":"wZX3oN0bSVIhsaknAAAI"}"#).expect("Failed to decode"),
            EnginePacket::Message(SocketPacket::Connect(Some(
                json!({"sid": "wZX3oN0bSVIhsaknAAAI"})
            )))
        );
        assert_eq!(
            EnginePacket::decode("41").expect("Failed to decode"),
            EnginePacket::Message(SocketPacket::Disconnect)
        );
    }

    #[test]
    fn test_event() {
        let packet = EnginePacket::decode(
            r#"42["location-update",{"data":{"id":"a1","latitude":"40.7128"}}]"#,
        )
        .expect("Failed to decode");

        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event {
                name: "location-update".to_string(),
                data: json!({"data": {"id": "a1", "latitude": "40.7128"}}),
            })
        );
    }

    #[test]
    fn test_event_with_namespace_and_ack() {
        let packet = SocketPacket::decode(r#"2/tracker,17["client-count",4]"#)
            .expect("Failed to decode");
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "client-count".to_string(),
                data: json!(4),
            }
        );
    }

    #[test]
    fn test_event_without_data() {
        let packet = SocketPacket::decode(r#"2["ping-me"]"#).expect("Failed to decode");
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "ping-me".to_string(),
                data: Value::Null,
            }
        );
    }

    #[test]
    fn test_event_encode() {
        let packet = SocketPacket::Event {
            name: "client-count".to_string(),
            data: json!(3),
        };
        assert_eq!(packet.encode(), r#"2["client-count",3]"#);
    }

    #[test]
    fn test_connect_error() {
        assert_eq!(
            SocketPacket::decode(r#"4{"message":"Not authorized"}"#).expect("Failed to decode"),
            SocketPacket::ConnectError("Not authorized".to_string())
        );
        assert_eq!(
            SocketPacket::decode("4Invalid namespace").expect("Failed to decode"),
            SocketPacket::ConnectError("Invalid namespace".to_string())
        );
    }

    #[test]
    fn test_invalid() {
        assert!(EnginePacket::decode("").is_err());
        assert!(EnginePacket::decode("9").is_err());
        assert!(EnginePacket::decode("0{nope").is_err());
        assert!(SocketPacket::decode("2{}").is_err());
        assert!(SocketPacket::decode("2[5]").is_err());
        assert!(SocketPacket::decode(r#"51-["file",{"_placeholder":true,"num":0}]"#).is_err());
    }
}
