use mqttsn_core::{encode, Flags, MsgType, Packet, QoS, Subscribe as SubscribePacket, SubscribeTopic, TopicIdType, Unsubscribe as UnsubscribePacket};

use crate::error::MqttSnError;
use crate::listener::{Callback, ListenerHandle};
use crate::pending::PendingContext;
use crate::session::Session;
use crate::transport::Transport;

impl<T: Transport> Session<T> {
    /// Subscribes to a NORMAL or SHORT topic filter, awaiting SUBACK (§4.7).
    pub fn send_subscribe(
        &mut self,
        filter: &str,
        qos: QoS,
        listener: Callback,
    ) -> Result<ListenerHandle, MqttSnError> {
        self.require_active()?;

        let kind = if filter.len() == 2 { TopicIdType::Short } else { TopicIdType::Normal };
        let topic = SubscribeTopic::Filter(filter.to_owned());

        let handle = self.listeners.insert(filter.to_owned(), kind, listener);
        if kind == TopicIdType::Short {
            if let Some(id) = mqttsn_core::TopicId::short(filter) {
                self.listeners.bind_id(handle, id.id);
            }
        }

        self.subscribe_request(Flags::new().with_qos(qos).with_topic_id_type(kind), topic, handle)
    }

    /// Subscribes to a PREDEFINED topic id, awaiting SUBACK (§4.7).
    pub fn send_subscribe_predefined(
        &mut self,
        topic_id: u16,
        qos: QoS,
        listener: Callback,
    ) -> Result<ListenerHandle, MqttSnError> {
        self.require_active()?;

        let handle = self.listeners.insert(format!("#{}", topic_id), TopicIdType::Predefined, listener);
        self.listeners.bind_id(handle, topic_id);

        let flags = Flags::new().with_qos(qos).with_topic_id_type(TopicIdType::Predefined);
        self.subscribe_request(flags, SubscribeTopic::Id(topic_id), handle)
    }

    fn subscribe_request(
        &mut self,
        flags: Flags,
        topic: SubscribeTopic,
        handle: ListenerHandle,
    ) -> Result<ListenerHandle, MqttSnError> {
        let msg_id = self.allocate_msg_id()?;
        let packet = Packet::Subscribe(SubscribePacket { flags, msg_id, topic });
        let bytes = encode(&packet).map_err(|e| MqttSnError::Malformed(e.to_string()))?;

        let key = (MsgType::Suback, msg_id);
        let timeout = self.timeout;
        let max_retries = self.max_retries;
        self.pending.insert(key, bytes.clone(), timeout, max_retries, false, PendingContext::Subscribe { handle });
        self.send_raw(&bytes)?;

        match self.poll_until(key)? {
            Packet::Suback(ack) if ack.return_code.is_accepted() => Ok(handle),
            Packet::Suback(ack) => {
                self.listeners.remove(handle);
                Err(MqttSnError::Rejected(ack.return_code))
            }
            _ => {
                self.listeners.remove(handle);
                Err(MqttSnError::ProtocolViolation("expected SUBACK"))
            }
        }
    }

    /// Unsubscribes a NORMAL or SHORT filter previously passed to
    /// `send_subscribe` (§4.7, mirrors subscribe).
    pub fn send_unsubscribe(&mut self, filter: &str) -> Result<(), MqttSnError> {
        self.require_active()?;
        let entry = self
            .listeners
            .remove_by_filter(filter)
            .ok_or(MqttSnError::ProtocolViolation("no listener subscribed to this filter"))?;

        let kind = entry.kind;
        let topic = SubscribeTopic::Filter(filter.to_owned());
        self.unsubscribe_request(Flags::new().with_topic_id_type(kind), topic)
    }

    /// Unsubscribes a PREDEFINED topic id previously passed to
    /// `send_subscribe_predefined`.
    pub fn send_unsubscribe_predefined(&mut self, topic_id: u16) -> Result<(), MqttSnError> {
        self.require_active()?;
        self.listeners
            .remove_by_predefined_id(topic_id)
            .ok_or(MqttSnError::ProtocolViolation("no listener subscribed to this predefined id"))?;

        let flags = Flags::new().with_topic_id_type(TopicIdType::Predefined);
        self.unsubscribe_request(flags, SubscribeTopic::Id(topic_id))
    }

    fn unsubscribe_request(&mut self, flags: Flags, topic: SubscribeTopic) -> Result<(), MqttSnError> {
        let msg_id = self.allocate_msg_id()?;
        let packet = Packet::Unsubscribe(UnsubscribePacket { flags, msg_id, topic });
        let bytes = encode(&packet).map_err(|e| MqttSnError::Malformed(e.to_string()))?;

        let key = (MsgType::Unsuback, msg_id);
        let timeout = self.timeout;
        let max_retries = self.max_retries;
        self.pending.insert(key, bytes.clone(), timeout, max_retries, false, PendingContext::None);
        self.send_raw(&bytes)?;

        match self.poll_until(key)? {
            Packet::Unsuback(_) => Ok(()),
            _ => Err(MqttSnError::ProtocolViolation("expected UNSUBACK")),
        }
    }
}
