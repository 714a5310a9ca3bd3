use bytes::BufMut;

use crate::packet::{
    Flags, Packet, Regack2, SubscribeTopic, TopicIdType, MAX_PACKET_LEN, PROTOCOL_ID,
};

/// Errors the encoder can raise before a single byte reaches the transport.
#[derive(Debug, derive_more::Display)]
pub enum EncodeError {
    #[display(fmt = "packet of {} bytes exceeds the {} byte datagram limit", _0, _1)]
    TooLarge(usize, usize),
}

impl std::error::Error for EncodeError {}

trait BufMutExt: BufMut {
    fn put_rest_str(&mut self, s: &str) {
        self.put_slice(s.as_bytes())
    }
}

impl<T: BufMut> BufMutExt for T {}

fn body_len(kind: TopicIdType) -> Flags {
    Flags::new().with_topic_id_type(kind)
}

fn write_body(packet: &Packet, body: &mut Vec<u8>) {
    body.put_u8(packet.msg_type() as u8);

    match packet {
        Packet::Connect(c) => {
            body.put_u8(c.flags.0);
            body.put_u8(PROTOCOL_ID);
            body.put_u16(c.duration);
            body.put_rest_str(&c.client_id);
        }
        Packet::Connack(a) => {
            body.put_u8(a.return_code as u8);
        }
        Packet::Willtopicreq => {}
        Packet::Willtopic(w) => {
            let flags = body_len(TopicIdType::Normal)
                .with_qos(w.qos)
                .with_retain(w.retain);
            body.put_u8(flags.0);
            body.put_rest_str(&w.topic);
        }
        Packet::Willmsgreq => {}
        Packet::Willmsg(m) => {
            body.put_slice(&m.message);
        }
        Packet::Register(r) => {
            body.put_u16(r.topic_id);
            body.put_u16(r.msg_id);
            body.put_rest_str(&r.topic_name);
        }
        Packet::Regack(a) => {
            body.put_u16(a.topic_id);
            body.put_u16(a.msg_id);
            body.put_u8(a.return_code as u8);
        }
        Packet::Publish(p) => {
            body.put_u8(p.flags.0);
            body.put_u16(p.topic_id);
            body.put_u16(p.msg_id);
            body.put_slice(&p.data);
        }
        Packet::Puback(a) => {
            body.put_u16(a.topic_id);
            body.put_u16(a.msg_id);
            body.put_u8(a.return_code as u8);
        }
        Packet::Subscribe(s) => {
            write_subscribe_flags(&s.topic, s.flags, body);
            body.put_u16(s.msg_id);
            write_subscribe_topic(&s.topic, body);
        }
        Packet::Suback(a) => {
            body.put_u8(a.flags.0);
            body.put_u16(a.topic_id);
            body.put_u16(a.msg_id);
            body.put_u8(a.return_code as u8);
        }
        Packet::Unsubscribe(u) => {
            write_subscribe_flags(&u.topic, u.flags, body);
            body.put_u16(u.msg_id);
            write_subscribe_topic(&u.topic, body);
        }
        Packet::Unsuback(a) => {
            body.put_u16(a.msg_id);
        }
        Packet::Pingreq(client_id) => {
            body.put_slice(client_id);
        }
        Packet::Pingresp => {}
        Packet::Disconnect(d) => {
            if let Some(duration) = d.duration {
                body.put_u16(duration);
            }
        }
        Packet::Willtopicupd(w) => {
            let flags = body_len(TopicIdType::Normal)
                .with_qos(w.qos)
                .with_retain(w.retain);
            body.put_u8(flags.0);
            body.put_rest_str(&w.topic);
        }
        Packet::Willtopicresp(r) => write_regack2(r, body),
        Packet::Willmsgupd(m) => {
            body.put_slice(&m.message);
        }
        Packet::Willmsgresp(r) => write_regack2(r, body),
    }
}

fn write_regack2(r: &Regack2, body: &mut Vec<u8>) {
    body.put_u8(r.return_code as u8);
}

fn write_subscribe_flags(topic: &SubscribeTopic, flags: Flags, body: &mut Vec<u8>) {
    let kind = match topic {
        SubscribeTopic::Filter(name) if name.len() == 2 => TopicIdType::Short,
        SubscribeTopic::Filter(_) => TopicIdType::Normal,
        SubscribeTopic::Id(_) => flags.topic_id_type().unwrap_or(TopicIdType::Predefined),
    };
    body.put_u8(flags.with_topic_id_type(kind).0);
}

fn write_subscribe_topic(topic: &SubscribeTopic, body: &mut Vec<u8>) {
    match topic {
        SubscribeTopic::Filter(name) if name.len() == 2 => {
            let bytes = name.as_bytes();
            body.put_u8(bytes[0]);
            body.put_u8(bytes[1]);
        }
        SubscribeTopic::Filter(name) => body.put_rest_str(name),
        SubscribeTopic::Id(id) => body.put_u16(*id),
    }
}

/// Encodes a single packet, including its 1- or 3-byte length prefix.
///
/// Fails only if the encoded body would not fit in a single MQTT-SN datagram.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, EncodeError> {
    let mut body = Vec::with_capacity(32);
    write_body(packet, &mut body);

    let short_len = 1 + body.len();
    let long_len = 3 + body.len();

    if short_len <= 0xFF {
        let mut buf = Vec::with_capacity(short_len);
        buf.put_u8(short_len as u8);
        buf.extend_from_slice(&body);
        Ok(buf)
    } else if long_len <= MAX_PACKET_LEN {
        let mut buf = Vec::with_capacity(long_len);
        buf.put_u8(0x01);
        buf.put_u16(long_len as u16);
        buf.extend_from_slice(&body);
        Ok(buf)
    } else {
        Err(EncodeError::TooLarge(long_len, MAX_PACKET_LEN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Publish, QoS};

    #[test]
    fn short_form_length_prefix() {
        let packet = Packet::Publish(Publish {
            flags: Flags::new().with_qos(QoS::AtMostOnce).with_topic_id_type(TopicIdType::Normal),
            topic_id: 1,
            msg_id: 0,
            data: b"hi".to_vec(),
        });
        let bytes = encode(&packet).unwrap();
        // 1(len) + 1(type) + 1(flags) + 2(topicId) + 2(msgId) + 2(data) = 9
        assert_eq!(bytes[0], 9);
        assert_eq!(bytes.len(), 9);
    }

    #[test]
    fn long_form_length_prefix_past_255_bytes() {
        let data = vec![0u8; 300];
        let packet = Packet::Publish(Publish {
            flags: Flags::new().with_qos(QoS::AtMostOnce).with_topic_id_type(TopicIdType::Normal),
            topic_id: 1,
            msg_id: 0,
            data,
        });
        let bytes = encode(&packet).unwrap();
        assert_eq!(bytes[0], 0x01);
        let declared = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
        assert_eq!(declared, bytes.len());
    }

    #[test]
    fn rejects_oversized_payload() {
        let packet = Packet::Publish(Publish {
            flags: Flags::new(),
            topic_id: 1,
            msg_id: 0,
            data: vec![0u8; MAX_PACKET_LEN],
        });
        assert!(encode(&packet).is_err());
    }
}
