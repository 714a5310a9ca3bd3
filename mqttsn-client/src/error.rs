use std::fmt;

use mqttsn_core::{MsgType, ReturnCode};

/// The error taxonomy surfaced at client call sites.
///
/// Transport and decode failures on *inbound* reads never reach here: `poll()`
/// logs and swallows those per the crate's error policy. This enum is only
/// for errors surfaced synchronously from an outbound call.
#[derive(Debug)]
pub enum MqttSnError {
    Transport(std::io::Error),
    Malformed(String),
    Timeout { msg_type: MsgType, msg_id: u16 },
    Rejected(ReturnCode),
    ProtocolViolation(&'static str),
    OutOfMessageIds,
    Closed,
}

impl fmt::Display for MqttSnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MqttSnError::Transport(err) => write!(f, "transport error: {}", err),
            MqttSnError::Malformed(reason) => write!(f, "malformed packet: {}", reason),
            MqttSnError::Timeout { msg_type, msg_id } => {
                write!(f, "timed out waiting for reply to {:?} msgId={}", msg_type, msg_id)
            }
            MqttSnError::Rejected(code) => write!(f, "request rejected: {}", code),
            MqttSnError::ProtocolViolation(reason) => write!(f, "protocol violation: {}", reason),
            MqttSnError::OutOfMessageIds => write!(f, "no message ids available, all in flight"),
            MqttSnError::Closed => write!(f, "session is closed"),
        }
    }
}

impl std::error::Error for MqttSnError {}

impl From<std::io::Error> for MqttSnError {
    fn from(err: std::io::Error) -> Self {
        MqttSnError::Transport(err)
    }
}
