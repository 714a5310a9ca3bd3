use core::convert::TryFrom;

use derive_more::Display;
use num_enum::{TryFromPrimitive, UnsafeFromPrimitive};

/// The fixed value of the CONNECT packet's `ProtocolId` field.
pub const PROTOCOL_ID: u8 = 0x01;

/// Largest packet a datagram may carry: a `u16` length field leaves no room for more.
pub const MAX_PACKET_LEN: usize = 0xFFFF;

/// MQTT-SN message type, one byte on the wire.
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash, TryFromPrimitive)]
pub enum MsgType {
    Advertise = 0x00,
    Searchgw = 0x01,
    Gwinfo = 0x02,
    Connect = 0x04,
    Connack = 0x05,
    Willtopicreq = 0x06,
    Willtopic = 0x07,
    Willmsgreq = 0x08,
    Willmsg = 0x09,
    Register = 0x0A,
    Regack = 0x0B,
    Publish = 0x0C,
    Puback = 0x0D,
    Pubcomp = 0x0E,
    Pubrec = 0x0F,
    Pubrel = 0x10,
    Subscribe = 0x12,
    Suback = 0x13,
    Unsubscribe = 0x14,
    Unsuback = 0x15,
    Pingreq = 0x16,
    Pingresp = 0x17,
    Disconnect = 0x18,
    Willtopicupd = 0x1A,
    Willtopicresp = 0x1B,
    Willmsgupd = 0x1C,
    Willmsgresp = 0x1D,
}

/// Quality of service, including the MQTT-SN-specific QoS −1 ("publish without a session").
#[repr(i8)]
#[derive(Debug, Eq, PartialEq, Copy, Clone, UnsafeFromPrimitive, TryFromPrimitive)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
    NoSession = -1,
}

/// How a 16-bit topic id on the wire should be interpreted.
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Copy, Clone, UnsafeFromPrimitive)]
pub enum TopicIdType {
    Normal = 0b00,
    Predefined = 0b01,
    Short = 0b10,
}

/// A resolved topic id, carrying the interpretation needed to use it on the wire.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct TopicId {
    pub id: u16,
    pub kind: TopicIdType,
}

impl TopicId {
    pub fn normal(id: u16) -> Self {
        TopicId { id, kind: TopicIdType::Normal }
    }

    pub fn predefined(id: u16) -> Self {
        TopicId { id, kind: TopicIdType::Predefined }
    }

    /// Builds a SHORT topic id from the two ASCII bytes of a 2-character topic name.
    pub fn short(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.len() == 2 {
            Some(TopicId {
                id: (u16::from(bytes[0]) << 8) | u16::from(bytes[1]),
                kind: TopicIdType::Short,
            })
        } else {
            None
        }
    }
}

const DUP_SHIFT: u8 = 7;
const QOS_SHIFT: u8 = 5;
const QOS_MASK: u8 = 0b11;
const RETAIN_BIT: u8 = 0b0001_0000;
const WILL_BIT: u8 = 0b0000_1000;
const CLEAN_SESSION_BIT: u8 = 0b0000_0100;
const TOPIC_ID_TYPE_MASK: u8 = 0b11;

/// The flags byte shared by CONNECT, WILLTOPIC, PUBLISH and SUBSCRIBE.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
pub struct Flags(pub u8);

impl Flags {
    pub fn new() -> Self {
        Flags(0)
    }

    pub fn dup(self) -> bool {
        self.0 & (1 << DUP_SHIFT) != 0
    }

    pub fn with_dup(mut self, dup: bool) -> Self {
        if dup {
            self.0 |= 1 << DUP_SHIFT;
        } else {
            self.0 &= !(1 << DUP_SHIFT);
        }
        self
    }

    pub fn qos(self) -> QoS {
        let raw = (self.0 >> QOS_SHIFT) & QOS_MASK;
        // the wire encodes QoS -1 as the two-bit value 0b11 (3)
        let signed = if raw == 0b11 { -1 } else { raw as i8 };
        unsafe { QoS::from_unchecked(signed) }
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        let raw: u8 = match qos {
            QoS::NoSession => 0b11,
            other => other as u8,
        };
        self.0 = (self.0 & !(QOS_MASK << QOS_SHIFT)) | (raw << QOS_SHIFT);
        self
    }

    pub fn retain(self) -> bool {
        self.0 & RETAIN_BIT != 0
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        if retain {
            self.0 |= RETAIN_BIT;
        } else {
            self.0 &= !RETAIN_BIT;
        }
        self
    }

    pub fn will(self) -> bool {
        self.0 & WILL_BIT != 0
    }

    pub fn with_will(mut self, will: bool) -> Self {
        if will {
            self.0 |= WILL_BIT;
        } else {
            self.0 &= !WILL_BIT;
        }
        self
    }

    pub fn clean_session(self) -> bool {
        self.0 & CLEAN_SESSION_BIT != 0
    }

    pub fn with_clean_session(mut self, clean: bool) -> Self {
        if clean {
            self.0 |= CLEAN_SESSION_BIT;
        } else {
            self.0 &= !CLEAN_SESSION_BIT;
        }
        self
    }

    pub fn topic_id_type(self) -> Option<TopicIdType> {
        let raw = self.0 & TOPIC_ID_TYPE_MASK;
        if raw == 0b11 {
            None
        } else {
            Some(unsafe { TopicIdType::from_unchecked(raw) })
        }
    }

    pub fn with_topic_id_type(mut self, kind: TopicIdType) -> Self {
        self.0 = (self.0 & !TOPIC_ID_TYPE_MASK) | (kind as u8);
        self
    }
}

/// CONNACK / REGACK / SUBACK / PUBACK return codes.
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Copy, Clone, Display, TryFromPrimitive)]
pub enum ReturnCode {
    #[display(fmt = "accepted")]
    Accepted = 0x00,
    #[display(fmt = "rejected: congestion")]
    Congestion = 0x01,
    #[display(fmt = "rejected: invalid topic id")]
    InvalidTopicId = 0x02,
    #[display(fmt = "rejected: not supported")]
    NotSupported = 0x03,
}

impl ReturnCode {
    pub fn is_accepted(self) -> bool {
        self == ReturnCode::Accepted
    }
}

impl TryFrom<u8> for QoS {
    type Error = num_enum::TryFromPrimitiveError<QoS>;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        let signed = if raw == 0b11 { -1i8 } else { raw as i8 };
        Ok(unsafe { QoS::from_unchecked(signed) })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Connect {
    pub flags: Flags,
    pub duration: u16,
    pub client_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connack {
    pub return_code: ReturnCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Willtopic {
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Willmsg {
    pub message: Vec<u8>,
}

pub type Willtopicupd = Willtopic;
pub type Willmsgupd = Willmsg;

#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub topic_id: u16,
    pub msg_id: u16,
    pub topic_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regack {
    pub topic_id: u16,
    pub msg_id: u16,
    pub return_code: ReturnCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Publish {
    pub flags: Flags,
    pub topic_id: u16,
    pub msg_id: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Puback {
    pub topic_id: u16,
    pub msg_id: u16,
    pub return_code: ReturnCode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeTopic {
    Filter(String),
    Id(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscribe {
    pub flags: Flags,
    pub msg_id: u16,
    pub topic: SubscribeTopic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Suback {
    pub flags: Flags,
    pub topic_id: u16,
    pub msg_id: u16,
    pub return_code: ReturnCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unsubscribe {
    pub flags: Flags,
    pub msg_id: u16,
    pub topic: SubscribeTopic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unsuback {
    pub msg_id: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Disconnect {
    pub duration: Option<u16>,
}

/// Every MQTT-SN packet the client core needs to send or receive.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(Connect),
    Connack(Connack),
    Willtopicreq,
    Willtopic(Willtopic),
    Willmsgreq,
    Willmsg(Willmsg),
    Register(Register),
    Regack(Regack),
    Publish(Publish),
    Puback(Puback),
    Subscribe(Subscribe),
    Suback(Suback),
    Unsubscribe(Unsubscribe),
    Unsuback(Unsuback),
    Pingreq(Vec<u8>),
    Pingresp,
    Disconnect(Disconnect),
    Willtopicupd(Willtopicupd),
    Willtopicresp(Regack2),
    Willmsgupd(Willmsgupd),
    Willmsgresp(Regack2),
}

/// WILLTOPICRESP / WILLMSGRESP carry only a return code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regack2 {
    pub return_code: ReturnCode,
}

impl Packet {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Packet::Connect(_) => MsgType::Connect,
            Packet::Connack(_) => MsgType::Connack,
            Packet::Willtopicreq => MsgType::Willtopicreq,
            Packet::Willtopic(_) => MsgType::Willtopic,
            Packet::Willmsgreq => MsgType::Willmsgreq,
            Packet::Willmsg(_) => MsgType::Willmsg,
            Packet::Register(_) => MsgType::Register,
            Packet::Regack(_) => MsgType::Regack,
            Packet::Publish(_) => MsgType::Publish,
            Packet::Puback(_) => MsgType::Puback,
            Packet::Subscribe(_) => MsgType::Subscribe,
            Packet::Suback(_) => MsgType::Suback,
            Packet::Unsubscribe(_) => MsgType::Unsubscribe,
            Packet::Unsuback(_) => MsgType::Unsuback,
            Packet::Pingreq(_) => MsgType::Pingreq,
            Packet::Pingresp => MsgType::Pingresp,
            Packet::Disconnect(_) => MsgType::Disconnect,
            Packet::Willtopicupd(_) => MsgType::Willtopicupd,
            Packet::Willtopicresp(_) => MsgType::Willtopicresp,
            Packet::Willmsgupd(_) => MsgType::Willmsgupd,
            Packet::Willmsgresp(_) => MsgType::Willmsgresp,
        }
    }
}
