//! Wire-level types and codec for the MQTT-SN v1.2 message set used by a client.
//!
//! This crate has no knowledge of sessions, retransmission or topic
//! registries; it only turns [`Packet`] values into bytes and back.

mod decode;
mod encode;
mod packet;

pub use decode::{decode, DecodeError};
pub use encode::{encode, EncodeError};
pub use packet::{
    Connack, Connect, Disconnect, Flags, MsgType, Packet, Puback, Publish, QoS, Regack, Register,
    ReturnCode, Suback, Subscribe, SubscribeTopic, TopicId, TopicIdType, Unsubscribe, Willmsg,
    Willmsgupd, Willtopic, Willtopicupd, MAX_PACKET_LEN, PROTOCOL_ID,
};
