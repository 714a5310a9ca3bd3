use core::convert::TryFrom;
use core::str;

use nom::{
    combinator::{map_res, rest},
    number::complete::{be_u16, be_u8},
    sequence::pair,
    IResult,
};

use crate::packet::{
    Connack, Connect, Disconnect, Flags, MsgType, Packet, Puback, Publish, Regack, Regack2,
    Register, ReturnCode, Suback, Subscribe, SubscribeTopic, TopicIdType, Unsuback, Unsubscribe,
    Willmsg, Willtopic,
};

/// Errors raised while turning one datagram back into a [`Packet`].
#[derive(Debug, derive_more::Display)]
pub enum DecodeError {
    #[display(fmt = "datagram too short to contain a length prefix")]
    Truncated,
    #[display(fmt = "declared length {} does not match datagram length {}", _0, _1)]
    LengthMismatch(usize, usize),
    #[display(fmt = "unknown message type 0x{:02x}", _0)]
    UnknownType(u8),
    #[display(fmt = "malformed {}: {}", _0, _1)]
    Malformed(&'static str, String),
}

impl std::error::Error for DecodeError {}

fn utf8_rest(input: &[u8]) -> IResult<&[u8], &str> {
    map_res(rest, str::from_utf8)(input)
}

fn parse_willtopic(input: &[u8]) -> Result<Willtopic, DecodeError> {
    let (input, flags) = be_u8::<_, nom::error::Error<&[u8]>>(input)
        .map_err(|e| DecodeError::Malformed("WILLTOPIC", e.to_string()))?;
    let flags = Flags(flags);
    let topic = utf8_rest(input)
        .map_err(|e| DecodeError::Malformed("WILLTOPIC", e.to_string()))?
        .1
        .to_owned();
    Ok(Willtopic { qos: flags.qos(), retain: flags.retain(), topic })
}

fn parse_regack2(input: &[u8]) -> Result<Regack2, DecodeError> {
    let (_, code) = be_u8::<_, nom::error::Error<&[u8]>>(input)
        .map_err(|e| DecodeError::Malformed("RETCODE", e.to_string()))?;
    let return_code = ReturnCode::try_from(code)
        .map_err(|_| DecodeError::Malformed("RETCODE", format!("unknown return code {}", code)))?;
    Ok(Regack2 { return_code })
}

/// Decodes exactly one datagram into a [`Packet`].
///
/// The whole slice must be consumed: a declared length that does not match
/// `input.len()` is rejected rather than silently truncated or padded.
pub fn decode(input: &[u8]) -> Result<Packet, DecodeError> {
    if input.is_empty() {
        return Err(DecodeError::Truncated);
    }

    let (declared_len, body) = if input[0] == 0x01 {
        let (rest, len) = be_u16::<_, nom::error::Error<&[u8]>>(&input[1..])
            .map_err(|_| DecodeError::Truncated)?;
        (len as usize, rest)
    } else {
        (input[0] as usize, &input[1..])
    };

    if declared_len != input.len() {
        return Err(DecodeError::LengthMismatch(declared_len, input.len()));
    }

    let (body, type_byte) =
        be_u8::<_, nom::error::Error<&[u8]>>(body).map_err(|_| DecodeError::Truncated)?;

    let msg_type = MsgType::try_from(type_byte).map_err(|_| DecodeError::UnknownType(type_byte))?;

    decode_body(msg_type, body)
}

fn decode_body(msg_type: MsgType, input: &[u8]) -> Result<Packet, DecodeError> {
    let malformed = |name: &'static str| move |e: nom::Err<nom::error::Error<&[u8]>>| {
        DecodeError::Malformed(name, e.to_string())
    };

    match msg_type {
        MsgType::Connect => {
            let (input, (flags, protocol_id)) =
                pair(be_u8, be_u8)(input).map_err(malformed("CONNECT"))?;
            let (input, duration) = be_u16(input).map_err(malformed("CONNECT"))?;
            let _ = protocol_id;
            let client_id = utf8_rest(input).map_err(malformed("CONNECT"))?.1.to_owned();
            Ok(Packet::Connect(Connect { flags: Flags(flags), duration, client_id }))
        }
        MsgType::Connack => {
            let (_, code) = be_u8(input).map_err(malformed("CONNACK"))?;
            let return_code = ReturnCode::try_from(code)
                .map_err(|_| DecodeError::Malformed("CONNACK", format!("unknown rc {}", code)))?;
            Ok(Packet::Connack(Connack { return_code }))
        }
        MsgType::Willtopicreq => Ok(Packet::Willtopicreq),
        MsgType::Willtopic => Ok(Packet::Willtopic(parse_willtopic(input)?)),
        MsgType::Willmsgreq => Ok(Packet::Willmsgreq),
        MsgType::Willmsg => Ok(Packet::Willmsg(Willmsg { message: input.to_vec() })),
        MsgType::Register => {
            let (input, (topic_id, msg_id)) =
                pair(be_u16, be_u16)(input).map_err(malformed("REGISTER"))?;
            let topic_name = utf8_rest(input).map_err(malformed("REGISTER"))?.1.to_owned();
            Ok(Packet::Register(Register { topic_id, msg_id, topic_name }))
        }
        MsgType::Regack => {
            let (input, (topic_id, msg_id)) =
                pair(be_u16, be_u16)(input).map_err(malformed("REGACK"))?;
            let (_, code) = be_u8(input).map_err(malformed("REGACK"))?;
            let return_code = ReturnCode::try_from(code)
                .map_err(|_| DecodeError::Malformed("REGACK", format!("unknown rc {}", code)))?;
            Ok(Packet::Regack(Regack { topic_id, msg_id, return_code }))
        }
        MsgType::Publish => {
            let (input, flags) = be_u8(input).map_err(malformed("PUBLISH"))?;
            let (input, (topic_id, msg_id)) =
                pair(be_u16, be_u16)(input).map_err(malformed("PUBLISH"))?;
            Ok(Packet::Publish(Publish {
                flags: Flags(flags),
                topic_id,
                msg_id,
                data: input.to_vec(),
            }))
        }
        MsgType::Puback => {
            let (input, (topic_id, msg_id)) =
                pair(be_u16, be_u16)(input).map_err(malformed("PUBACK"))?;
            let (_, code) = be_u8(input).map_err(malformed("PUBACK"))?;
            let return_code = ReturnCode::try_from(code)
                .map_err(|_| DecodeError::Malformed("PUBACK", format!("unknown rc {}", code)))?;
            Ok(Packet::Puback(Puback { topic_id, msg_id, return_code }))
        }
        MsgType::Subscribe => {
            let (input, flags) = be_u8(input).map_err(malformed("SUBSCRIBE"))?;
            let flags = Flags(flags);
            let (input, msg_id) = be_u16(input).map_err(malformed("SUBSCRIBE"))?;
            let topic = decode_topic(flags, input)?;
            Ok(Packet::Subscribe(Subscribe { flags, msg_id, topic }))
        }
        MsgType::Suback => {
            let (input, flags) = be_u8(input).map_err(malformed("SUBACK"))?;
            let (input, (topic_id, msg_id)) =
                pair(be_u16, be_u16)(input).map_err(malformed("SUBACK"))?;
            let (_, code) = be_u8(input).map_err(malformed("SUBACK"))?;
            let return_code = ReturnCode::try_from(code)
                .map_err(|_| DecodeError::Malformed("SUBACK", format!("unknown rc {}", code)))?;
            Ok(Packet::Suback(Suback { flags: Flags(flags), topic_id, msg_id, return_code }))
        }
        MsgType::Unsubscribe => {
            let (input, flags) = be_u8(input).map_err(malformed("UNSUBSCRIBE"))?;
            let flags = Flags(flags);
            let (input, msg_id) = be_u16(input).map_err(malformed("UNSUBSCRIBE"))?;
            let topic = decode_topic(flags, input)?;
            Ok(Packet::Unsubscribe(Unsubscribe { flags, msg_id, topic }))
        }
        MsgType::Unsuback => {
            let (_, msg_id) = be_u16(input).map_err(malformed("UNSUBACK"))?;
            Ok(Packet::Unsuback(Unsuback { msg_id }))
        }
        MsgType::Pingreq => Ok(Packet::Pingreq(input.to_vec())),
        MsgType::Pingresp => Ok(Packet::Pingresp),
        MsgType::Disconnect => {
            if input.is_empty() {
                Ok(Packet::Disconnect(Disconnect { duration: None }))
            } else {
                let (_, duration) = be_u16(input).map_err(malformed("DISCONNECT"))?;
                Ok(Packet::Disconnect(Disconnect { duration: Some(duration) }))
            }
        }
        MsgType::Willtopicupd => Ok(Packet::Willtopicupd(parse_willtopic(input)?)),
        MsgType::Willtopicresp => Ok(Packet::Willtopicresp(parse_regack2(input)?)),
        MsgType::Willmsgupd => Ok(Packet::Willmsgupd(Willmsg { message: input.to_vec() })),
        MsgType::Willmsgresp => Ok(Packet::Willmsgresp(parse_regack2(input)?)),
        MsgType::Advertise | MsgType::Searchgw | MsgType::Gwinfo => {
            Err(DecodeError::UnknownType(msg_type as u8))
        }
        MsgType::Pubrec | MsgType::Pubrel | MsgType::Pubcomp => {
            Err(DecodeError::UnknownType(msg_type as u8))
        }
    }
}

fn decode_topic(flags: Flags, input: &[u8]) -> Result<SubscribeTopic, DecodeError> {
    match flags.topic_id_type() {
        Some(TopicIdType::Normal) => {
            let name = str::from_utf8(input)
                .map_err(|e| DecodeError::Malformed("TOPIC", e.to_string()))?;
            Ok(SubscribeTopic::Filter(name.to_owned()))
        }
        Some(TopicIdType::Short) => {
            if input.len() != 2 {
                return Err(DecodeError::Malformed(
                    "TOPIC",
                    "short topic id must be 2 bytes".into(),
                ));
            }
            let name = str::from_utf8(input)
                .map_err(|e| DecodeError::Malformed("TOPIC", e.to_string()))?;
            Ok(SubscribeTopic::Filter(name.to_owned()))
        }
        Some(TopicIdType::Predefined) => {
            let (_, id) = be_u16::<_, nom::error::Error<&[u8]>>(input)
                .map_err(|e| DecodeError::Malformed("TOPIC", e.to_string()))?;
            Ok(SubscribeTopic::Id(id))
        }
        None => Err(DecodeError::Malformed("TOPIC", "reserved topic id type".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode;
    use crate::packet::{Flags, QoS};

    #[test]
    fn round_trips_publish() {
        let packet = Packet::Publish(Publish {
            flags: Flags::new().with_qos(QoS::AtLeastOnce).with_topic_id_type(TopicIdType::Normal),
            topic_id: 7,
            msg_id: 42,
            data: b"hello".to_vec(),
        });
        let bytes = encode(&packet).unwrap();
        assert_eq!(decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn rejects_truncated_datagram() {
        assert!(matches!(decode(&[5, 0x0C]), Err(DecodeError::LengthMismatch(_, _))));
    }

    #[test]
    fn rejects_unknown_type() {
        let bytes = vec![2u8, 0xFE];
        assert!(matches!(decode(&bytes), Err(DecodeError::UnknownType(0xFE))));
    }

    #[test]
    fn short_topic_round_trips_as_ascii_bytes() {
        let topic_id = crate::packet::TopicId::short("ab").unwrap();
        assert_eq!(topic_id.id, (b'a' as u16) << 8 | b'b' as u16);
    }
}
