//! The wire envelope: JSON text, UTF-8, always carrying `v`, `type`, and
//! `timestamp` (milliseconds). Binary fields are base64; chat-keys are
//! base58. This is the only normative wire format — no other encoding is
//! produced or accepted.

use serde::{Deserialize, Serialize};

/// One entry in a group message's per-recipient fanout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SealedEntry {
    pub to_pub_key: String,
    pub n: u64,
    pub nonce: String,
    pub ciphertext: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    ChatRequest {
        v: u8,
        timestamp: i64,
        request_id: String,
        from_pub_key: String,
        to_pub_key: String,
        nonce: String,
        ciphertext: String,
    },
    ChatAccept {
        v: u8,
        timestamp: i64,
        request_id: String,
        from_pub_key: String,
        to_pub_key: String,
        conversation_id: String,
    },
    ChatDeclined {
        v: u8,
        timestamp: i64,
        request_id: String,
        from_pub_key: String,
        to_pub_key: String,
        conversation_id: String,
    },
    ChatBlocked {
        v: u8,
        timestamp: i64,
        request_id: String,
        from_pub_key: String,
        to_pub_key: String,
        conversation_id: String,
    },
    GroupInvite {
        v: u8,
        timestamp: i64,
        from_pub_key: String,
        to_pub_key: String,
        nonce: String,
        ciphertext: String,
    },
    GroupAccepted {
        v: u8,
        timestamp: i64,
        request_id: String,
        group_id: String,
        from_pub_key: String,
        to_pub_key: String,
    },
    GroupDeclined {
        v: u8,
        timestamp: i64,
        request_id: String,
        group_id: String,
        from_pub_key: String,
        to_pub_key: String,
    },
    GroupBlocked {
        v: u8,
        timestamp: i64,
        request_id: String,
        group_id: String,
        from_pub_key: String,
        to_pub_key: String,
    },
    DmMessage {
        v: u8,
        timestamp: i64,
        conversation_id: String,
        message_id: String,
        from_pub_key: String,
        n: u64,
        nonce: String,
        ciphertext: String,
    },
    DmAck {
        v: u8,
        timestamp: i64,
        conversation_id: String,
        message_id: String,
        from_pub_key: String,
        to_pub_key: String,
    },
    GroupMessage {
        v: u8,
        timestamp: i64,
        group_id: String,
        message_id: String,
        from_pub_key: String,
        sealed: Vec<SealedEntry>,
    },
}

pub const WIRE_VERSION: u8 = 1;

impl Envelope {
    pub fn encode(&self) -> Result<String, crate::error::ProtoError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a wire envelope. Malformed JSON, an unrecognized `type`
    /// discriminant, or a `v` other than [`WIRE_VERSION`] all surface as
    /// [`crate::error::ProtoError`]; the caller is expected to drop the
    /// envelope silently on any of these, per the adversarial-input
    /// handling policy.
    pub fn decode(bytes: &[u8]) -> Result<Self, crate::error::ProtoError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        match value.get("v").and_then(|v| v.as_u64()) {
            Some(v) if v == WIRE_VERSION as u64 => {}
            _ => return Err(crate::error::ProtoError::UnsupportedVersion),
        }
        serde_json::from_value(value).map_err(Into::into)
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Envelope::ChatRequest { timestamp, .. }
            | Envelope::ChatAccept { timestamp, .. }
            | Envelope::ChatDeclined { timestamp, .. }
            | Envelope::ChatBlocked { timestamp, .. }
            | Envelope::GroupInvite { timestamp, .. }
            | Envelope::GroupAccepted { timestamp, .. }
            | Envelope::GroupDeclined { timestamp, .. }
            | Envelope::GroupBlocked { timestamp, .. }
            | Envelope::DmMessage { timestamp, .. }
            | Envelope::DmAck { timestamp, .. }
            | Envelope::GroupMessage { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelopes() -> Vec<Envelope> {
        vec![
            Envelope::ChatRequest {
                v: WIRE_VERSION,
                timestamp: 1,
                request_id: "r1".into(),
                from_pub_key: "a".into(),
                to_pub_key: "b".into(),
                nonce: "nonce".into(),
                ciphertext: "ct".into(),
            },
            Envelope::DmMessage {
                v: WIRE_VERSION,
                timestamp: 2,
                conversation_id: "cid".into(),
                message_id: "m1".into(),
                from_pub_key: "a".into(),
                n: 3,
                nonce: "nonce".into(),
                ciphertext: "ct".into(),
            },
            Envelope::GroupMessage {
                v: WIRE_VERSION,
                timestamp: 3,
                group_id: "g1".into(),
                message_id: "m2".into(),
                from_pub_key: "a".into(),
                sealed: vec![SealedEntry {
                    to_pub_key: "b".into(),
                    n: 0,
                    nonce: "nonce".into(),
                    ciphertext: "ct".into(),
                }],
            },
        ]
    }

    #[test]
    fn encode_decode_roundtrips_every_sample() {
        for envelope in sample_envelopes() {
            let encoded = envelope.encode().unwrap();
            let decoded = Envelope::decode(encoded.as_bytes()).unwrap();
            assert_eq!(envelope, decoded);
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let bytes = br#"{"type":"not_a_real_type","v":1,"timestamp":0}"#;
        assert!(Envelope::decode(bytes).is_err());
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(Envelope::decode(b"not json at all").is_err());
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let bytes = br#"{"type":"dm_ack","v":2,"timestamp":0,"conversation_id":"c","message_id":"m","from_pub_key":"a","to_pub_key":"b"}"#;
        assert!(Envelope::decode(bytes).is_err());
    }
}
