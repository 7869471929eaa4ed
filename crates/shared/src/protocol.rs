//! Socket protocol definitions: the `{ op, d }` envelope and the opcode set.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every opcode the client understands.
///
/// Frames with any other `op` still parse as [`SocketFrame`] but never map to
/// an `Opcode`, so they are never dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    UserAuthInit,
    UserAuthFailure,
    UserMetadata,
    GroupCreate,
    GroupJoin,
    GroupLeave,
    GroupEdit,
    GroupDelete,
    IconChange,
    PermEdit,
    MessageCreate,
    MessageEdit,
    MessageDelete,
    InvalidSchema,
}

impl Opcode {
    pub const ALL: [Opcode; 14] = [
        Opcode::UserAuthInit,
        Opcode::UserAuthFailure,
        Opcode::UserMetadata,
        Opcode::GroupCreate,
        Opcode::GroupJoin,
        Opcode::GroupLeave,
        Opcode::GroupEdit,
        Opcode::GroupDelete,
        Opcode::IconChange,
        Opcode::PermEdit,
        Opcode::MessageCreate,
        Opcode::MessageEdit,
        Opcode::MessageDelete,
        Opcode::InvalidSchema,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Opcode::UserAuthInit => "USER_AUTH_INIT",
            Opcode::UserAuthFailure => "USER_AUTH_FAILURE",
            Opcode::UserMetadata => "USER_METADATA",
            Opcode::GroupCreate => "GROUP_CREATE",
            Opcode::GroupJoin => "GROUP_JOIN",
            Opcode::GroupLeave => "GROUP_LEAVE",
            Opcode::GroupEdit => "GROUP_EDIT",
            Opcode::GroupDelete => "GROUP_DELETE",
            Opcode::IconChange => "ICON_CHANGE",
            Opcode::PermEdit => "PERM_EDIT",
            Opcode::MessageCreate => "MESSAGE_CREATE",
            Opcode::MessageEdit => "MESSAGE_EDIT",
            Opcode::MessageDelete => "MESSAGE_DELETE",
            Opcode::InvalidSchema => "INVALID_SCHEMA",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an `op` string is not part of [`Opcode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOpcode(pub String);

impl fmt::Display for UnknownOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown opcode: {}", self.0)
    }
}

impl std::error::Error for UnknownOpcode {}

impl FromStr for Opcode {
    type Err = UnknownOpcode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOpcode(s.to_string()))
    }
}

/// The JSON text frame exchanged over the socket: `{ "op": ..., "d": ... }`.
///
/// `op` stays a raw string so unrecognised opcodes survive parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketFrame {
    pub op: String,
    #[serde(default)]
    pub d: Value,
}

impl SocketFrame {
    pub fn new(op: Opcode, d: Value) -> Self {
        Self {
            op: op.as_str().to_string(),
            d,
        }
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn opcode(&self) -> Result<Opcode, UnknownOpcode> {
        self.op.parse()
    }
}

/// Sent by the client in answer to `USER_AUTH_INIT`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthHandshake {
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_opcode_strings_match_serde_names() {
        for op in Opcode::ALL {
            let via_serde = serde_json::to_value(op).unwrap();
            assert_eq!(via_serde, json!(op.as_str()));
            assert_eq!(op.as_str().parse::<Opcode>().unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_opcode_still_parses_as_frame() {
        let frame = SocketFrame::parse(r#"{"op":"TYPING_START","d":{"x":1}}"#).unwrap();
        assert_eq!(frame.op, "TYPING_START");
        assert_eq!(frame.opcode(), Err(UnknownOpcode("TYPING_START".to_string())));
    }

    #[test]
    fn test_frame_without_payload_defaults_to_null() {
        let frame = SocketFrame::parse(r#"{"op":"USER_AUTH_INIT"}"#).unwrap();
        assert_eq!(frame.opcode().unwrap(), Opcode::UserAuthInit);
        assert!(frame.d.is_null());
    }

    #[test]
    fn test_malformed_frame_is_rejected() {
        assert!(SocketFrame::parse("{not json").is_err());
        assert!(SocketFrame::parse(r#"{"d":{}}"#).is_err());
    }
}
