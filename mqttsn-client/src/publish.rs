use mqttsn_core::{encode, Flags, MsgType, Packet, Publish as PublishPacket, QoS, Register, TopicId, TopicIdType};

use crate::error::MqttSnError;
use crate::pending::PendingContext;
use crate::session::Session;
use crate::transport::Transport;

impl<T: Transport> Session<T> {
    /// Publishes to a NORMAL or SHORT topic, resolving (and, for NORMAL
    /// topics not yet known to the gateway, registering) the topic id first
    /// (§4.6).
    pub fn send_publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), MqttSnError> {
        if qos != QoS::NoSession {
            self.require_active()?;
        }

        let topic_id = match self.registry.resolve_name(topic) {
            Some(id) => id,
            None => self.register_topic(topic)?,
        };

        self.publish_to(topic_id, Some(topic), payload, qos, retain)
    }

    /// Publishes to a PREDEFINED topic id, bypassing name resolution
    /// entirely (§6).
    pub fn send_publish_predefined(
        &mut self,
        topic_id: u16,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), MqttSnError> {
        if qos != QoS::NoSession {
            self.require_active()?;
        }
        self.publish_to(TopicId::predefined(topic_id), None, payload, qos, retain)
    }

    /// Publishes forcing a SHORT-topic interpretation of a raw two-byte
    /// topic id (§6).
    pub fn send_publish_with_bytes(
        &mut self,
        topic_bytes: [u8; 2],
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), MqttSnError> {
        if qos != QoS::NoSession {
            self.require_active()?;
        }
        let id = (u16::from(topic_bytes[0]) << 8) | u16::from(topic_bytes[1]);
        self.publish_to(TopicId { id, kind: TopicIdType::Short }, None, payload, qos, retain)
    }

    fn register_topic(&mut self, topic: &str) -> Result<TopicId, MqttSnError> {
        let msg_id = self.allocate_msg_id()?;
        let packet = Packet::Register(Register { topic_id: 0, msg_id, topic_name: topic.to_owned() });
        let bytes = encode(&packet).map_err(|e| MqttSnError::Malformed(e.to_string()))?;

        let key = (MsgType::Regack, msg_id);
        let timeout = self.timeout;
        let max_retries = self.max_retries;
        self.pending.insert(
            key,
            bytes.clone(),
            timeout,
            max_retries,
            false,
            PendingContext::RegisterTopic { name: topic.to_owned() },
        );
        self.send_raw(&bytes)?;

        match self.poll_until(key)? {
            Packet::Regack(ack) if ack.return_code.is_accepted() => Ok(TopicId::normal(ack.topic_id)),
            Packet::Regack(ack) => Err(MqttSnError::Rejected(ack.return_code)),
            _ => Err(MqttSnError::ProtocolViolation("expected REGACK")),
        }
    }

    fn publish_to(
        &mut self,
        topic_id: TopicId,
        name_for_invalidation: Option<&str>,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), MqttSnError> {
        let msg_id = if matches!(qos, QoS::AtLeastOnce | QoS::ExactlyOnce) {
            self.allocate_msg_id()?
        } else {
            0
        };

        let flags = Flags::new()
            .with_qos(qos)
            .with_retain(retain)
            .with_topic_id_type(topic_id.kind);

        let packet = Packet::Publish(PublishPacket {
            flags,
            topic_id: topic_id.id,
            msg_id,
            data: payload.to_vec(),
        });
        let bytes = encode(&packet).map_err(|e| MqttSnError::Malformed(e.to_string()))?;

        if qos == QoS::AtLeastOnce {
            let key = (MsgType::Puback, msg_id);
            let timeout = self.timeout;
            let max_retries = self.max_retries;
            let context = match name_for_invalidation {
                Some(name) if topic_id.kind == TopicIdType::Normal => {
                    PendingContext::PublishTopic { name: name.to_owned() }
                }
                _ => PendingContext::None,
            };
            self.pending.insert(key, bytes.clone(), timeout, max_retries, true, context);
            self.send_raw(&bytes)?;

            match self.poll_until(key)? {
                Packet::Puback(ack) if ack.return_code.is_accepted() => Ok(()),
                Packet::Puback(ack) => Err(MqttSnError::Rejected(ack.return_code)),
                _ => Err(MqttSnError::ProtocolViolation("expected PUBACK")),
            }
        } else {
            self.send_raw(&bytes)
        }
    }
}
