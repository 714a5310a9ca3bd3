use std::time::Instant;

use mqttsn_core::{decode, MsgType, Packet, ReturnCode, TopicIdType};

use crate::error::MqttSnError;
use crate::pending::{PendingContext, SweepAction};
use crate::session::{Session, State};
use crate::transport::Transport;

const READ_BUF_LEN: usize = mqttsn_core::MAX_PACKET_LEN;

impl<T: Transport> Session<T> {
    /// One tick of the cooperative driver (§4.8): read at most one datagram,
    /// dispatch it, sweep expired requests, check keep-alive.
    pub fn poll(&mut self) -> Result<(), MqttSnError> {
        self.read_and_dispatch()?;
        self.sweep_pending()?;
        self.check_keep_alive()?;
        Ok(())
    }

    /// Blocks, repeatedly calling `poll()`, until the session disconnects or
    /// is declared lost.
    pub fn run(&mut self) -> Result<(), MqttSnError> {
        loop {
            self.poll()?;
            if matches!(self.state, State::Disconnected | State::Lost) {
                return Ok(());
            }
        }
    }

    fn read_and_dispatch(&mut self) -> Result<(), MqttSnError> {
        let mut buf = [0u8; READ_BUF_LEN];
        match self.transport.recv(&mut buf) {
            Ok(Some(n)) => {
                log::trace!(
                    "recv {} bytes:\n{}",
                    n,
                    hexplay::HexViewBuilder::new(&buf[..n]).finish()
                );
                match decode(&buf[..n]) {
                    Ok(packet) => self.dispatch(packet),
                    Err(err) => {
                        log::warn!("dropping malformed datagram: {}", err);
                        Ok(())
                    }
                }
            }
            Ok(None) => Ok(()),
            Err(err) => {
                log::warn!("transport read failed: {}", err);
                Ok(())
            }
        }
    }

    fn dispatch(&mut self, packet: Packet) -> Result<(), MqttSnError> {
        match packet {
            Packet::Connack(ref ack) => {
                let key = (MsgType::Connack, 0);
                if self.pending.complete(key).is_some() {
                    if ack.return_code.is_accepted() {
                        self.state = State::Active;
                    } else {
                        self.state = State::Disconnected;
                    }
                    self.completed.insert(key, packet);
                }
            }
            Packet::Willtopicreq if self.state == State::Connecting => {
                self.respond_will_topic()?;
            }
            Packet::Willmsgreq if self.state == State::Connecting => {
                self.respond_will_msg()?;
            }
            Packet::Regack(ref ack) => {
                let key = (MsgType::Regack, ack.msg_id);
                if let Some(req) = self.pending.complete(key) {
                    if let PendingContext::RegisterTopic { name } = req.context {
                        if ack.return_code.is_accepted() {
                            self.registry.register_local(&name, ack.topic_id);
                        }
                    }
                    self.completed.insert(key, packet);
                }
            }
            Packet::Register(ref reg) => {
                self.registry.register_local(&reg.topic_name, reg.topic_id);
                if let Some(handle) = self.listeners.find_by_matching_filter(&reg.topic_name) {
                    self.listeners.bind_id(handle, reg.topic_id);
                }
                let ack = Packet::Regack(mqttsn_core::Regack {
                    topic_id: reg.topic_id,
                    msg_id: reg.msg_id,
                    return_code: ReturnCode::Accepted,
                });
                let bytes = mqttsn_core::encode(&ack).map_err(|e| MqttSnError::Malformed(e.to_string()))?;
                self.send_raw(&bytes)?;
            }
            Packet::Puback(ref ack) => {
                let key = (MsgType::Puback, ack.msg_id);
                if let Some(req) = self.pending.complete(key) {
                    if let PendingContext::PublishTopic { name } = req.context {
                        if ack.return_code == ReturnCode::InvalidTopicId {
                            self.registry.invalidate(&name);
                        }
                    }
                    self.completed.insert(key, packet);
                }
            }
            Packet::Suback(ref ack) => {
                let key = (MsgType::Suback, ack.msg_id);
                if let Some(req) = self.pending.complete(key) {
                    if let PendingContext::Subscribe { handle } = req.context {
                        if ack.return_code.is_accepted() {
                            self.listeners.bind_id(handle, ack.topic_id);
                        }
                    }
                    self.completed.insert(key, packet);
                }
            }
            Packet::Unsuback(ref ack) => {
                let key = (MsgType::Unsuback, ack.msg_id);
                if self.pending.complete(key).is_some() {
                    self.completed.insert(key, packet);
                }
            }
            Packet::Publish(ref publish) => {
                self.deliver_publish(publish)?;
            }
            Packet::Pingresp => {
                let key = (MsgType::Pingresp, 0);
                if self.pending.complete(key).is_some() {
                    self.completed.insert(key, packet);
                }
            }
            Packet::Disconnect(_) => {
                let key = (MsgType::Disconnect, 0);
                if self.pending.complete(key).is_some() {
                    self.completed.insert(key, packet);
                } else {
                    // gateway-initiated disconnect, e.g. after LWT dispatch.
                    self.state = State::Disconnected;
                }
            }
            Packet::Willtopicresp(ref resp) => {
                let key = (MsgType::Willtopicresp, 0);
                let _ = resp;
                if self.pending.complete(key).is_some() {
                    self.completed.insert(key, packet);
                }
            }
            Packet::Willmsgresp(ref resp) => {
                let key = (MsgType::Willmsgresp, 0);
                let _ = resp;
                if self.pending.complete(key).is_some() {
                    self.completed.insert(key, packet);
                }
            }
            other => {
                log::debug!("ignoring unexpected inbound packet: {:?}", other);
            }
        }
        Ok(())
    }

    fn deliver_publish(&mut self, publish: &mqttsn_core::Publish) -> Result<(), MqttSnError> {
        let kind = publish.flags.topic_id_type().unwrap_or(TopicIdType::Normal);
        let qos = publish.flags.qos();
        let retain = publish.flags.retain();

        let topic_name = self.registry.resolve_id(publish.topic_id, kind).map(str::to_owned);

        if qos == mqttsn_core::QoS::AtLeastOnce {
            let ack = Packet::Puback(mqttsn_core::Puback {
                topic_id: publish.topic_id,
                msg_id: publish.msg_id,
                return_code: ReturnCode::Accepted,
            });
            let bytes = mqttsn_core::encode(&ack).map_err(|e| MqttSnError::Malformed(e.to_string()))?;
            self.send_raw(&bytes)?;
        }

        if let Some(entry) = self.listeners.find_by_id(publish.topic_id) {
            let name = topic_name.unwrap_or_default();
            (entry.callback)(&name, &publish.data, qos, retain);
        } else {
            log::debug!("no listener bound to topic id {}, dropping publish", publish.topic_id);
        }

        Ok(())
    }

    fn sweep_pending(&mut self) -> Result<(), MqttSnError> {
        let timeout = self.timeout;
        for action in self.pending.sweep(timeout) {
            match action {
                SweepAction::Retransmit { key, mut payload } => {
                    if key.0 == MsgType::Publish {
                        set_dup_bit(&mut payload);
                    }
                    log::warn!("retransmitting {:?} msgId={}", key.0, key.1);
                    self.send_raw(&payload)?;
                }
                SweepAction::TimedOut { key } => {
                    if key.0 == MsgType::Pingresp {
                        log::warn!("keep-alive lost, no PINGRESP within retries");
                        self.state = State::Lost;
                    } else {
                        self.timed_out.insert(key);
                    }
                }
            }
        }
        Ok(())
    }

    fn check_keep_alive(&mut self) -> Result<(), MqttSnError> {
        if self.state != State::Active || self.keep_alive.is_zero() {
            return Ok(());
        }

        let key = (MsgType::Pingresp, 0);
        let idle = Instant::now().saturating_duration_since(self.last_outbound);
        if idle >= self.keep_alive && !self.pending_contains(key) {
            let ping = Packet::Pingreq(self.client_id.as_bytes().to_vec());
            let bytes = mqttsn_core::encode(&ping).map_err(|e| MqttSnError::Malformed(e.to_string()))?;
            let timeout = self.timeout;
            let max_retries = self.max_retries;
            self.pending.insert(key, bytes.clone(), timeout, max_retries, false, PendingContext::None);
            self.send_raw(&bytes)?;
        }
        Ok(())
    }

    fn pending_contains(&self, key: crate::pending::PendingKey) -> bool {
        self.pending.is_msg_id_pending(key.1)
    }

    /// Spins `poll()` until the pending request keyed by `key` is completed
    /// or times out (§5: "suspension points are exactly inside `poll()`").
    pub(crate) fn poll_until(&mut self, key: crate::pending::PendingKey) -> Result<Packet, MqttSnError> {
        loop {
            self.poll()?;
            if let Some(packet) = self.completed.remove(&key) {
                return Ok(packet);
            }
            if self.timed_out.remove(&key) {
                return Err(MqttSnError::Timeout { msg_type: key.0, msg_id: key.1 });
            }
        }
    }
}

fn set_dup_bit(payload: &mut [u8]) {
    // payload[0] is the length prefix (or 0x01 for the long form); the flags
    // byte immediately follows the type byte, which follows the length.
    let flags_idx = if payload.first() == Some(&0x01) { 4 } else { 2 };
    if let Some(flags) = payload.get_mut(flags_idx) {
        *flags |= 0x80;
    }
}
