use mqttsn_core::{encode, Disconnect as DisconnectPacket, Flags, MsgType, Packet, Willmsg, Willtopic};

use crate::error::MqttSnError;
use crate::pending::PendingContext;
use crate::session::{Session, State};
use crate::transport::Transport;

impl<T: Transport> Session<T> {
    /// Runs the CONNECT handshake (§4.5): emits CONNECT with the WILL flag
    /// set iff a will is configured, answers the optional WILLTOPICREQ /
    /// WILLMSGREQ mini-handshake inline, and waits for CONNACK.
    pub fn send_connect(&mut self) -> Result<(), MqttSnError> {
        if self.state != State::Disconnected {
            return Err(MqttSnError::ProtocolViolation("CONNECT is only valid from DISCONNECTED"));
        }

        let flags = Flags::new()
            .with_will(self.will.is_some())
            .with_clean_session(self.clean_session);

        let connect = Packet::Connect(mqttsn_core::Connect {
            flags,
            duration: self.keep_alive.as_secs() as u16,
            client_id: self.client_id.clone(),
        });
        let bytes = encode(&connect).map_err(|e| MqttSnError::Malformed(e.to_string()))?;

        self.state = State::Connecting;
        let key = (MsgType::Connack, 0);
        let timeout = self.timeout;
        let max_retries = self.max_retries;
        self.pending.insert(key, bytes.clone(), timeout, max_retries, false, PendingContext::None);
        self.send_raw(&bytes)?;

        let ack = self.poll_until(key)?;
        match ack {
            Packet::Connack(ack) if ack.return_code.is_accepted() => Ok(()),
            Packet::Connack(ack) => Err(MqttSnError::Rejected(ack.return_code)),
            _ => Err(MqttSnError::ProtocolViolation("expected CONNACK")),
        }
    }

    pub(crate) fn respond_will_topic(&mut self) -> Result<(), MqttSnError> {
        let will = self
            .will
            .as_ref()
            .ok_or(MqttSnError::ProtocolViolation("WILLTOPICREQ with no will configured"))?;
        let packet = Packet::Willtopic(Willtopic {
            qos: will.qos,
            retain: will.retain,
            topic: will.topic.clone(),
        });
        let bytes = encode(&packet).map_err(|e| MqttSnError::Malformed(e.to_string()))?;
        self.send_raw(&bytes)
    }

    pub(crate) fn respond_will_msg(&mut self) -> Result<(), MqttSnError> {
        let will = self
            .will
            .as_ref()
            .ok_or(MqttSnError::ProtocolViolation("WILLMSGREQ with no will configured"))?;
        let packet = Packet::Willmsg(Willmsg { message: will.message.clone() });
        let bytes = encode(&packet).map_err(|e| MqttSnError::Malformed(e.to_string()))?;
        self.send_raw(&bytes)
    }

    /// DISCONNECT (§4.5). `duration` of 0 is a plain disconnect; a positive
    /// value asks the gateway to hold the session and buffer messages while
    /// asleep.
    pub fn send_disconnect(&mut self, duration: u16) -> Result<(), MqttSnError> {
        let packet = Packet::Disconnect(DisconnectPacket {
            duration: if duration > 0 { Some(duration) } else { None },
        });
        let bytes = encode(&packet).map_err(|e| MqttSnError::Malformed(e.to_string()))?;

        let key = (MsgType::Disconnect, 0);
        let timeout = self.timeout;
        let max_retries = self.max_retries;
        self.pending.insert(key, bytes.clone(), timeout, max_retries, false, PendingContext::None);
        self.send_raw(&bytes)?;

        self.poll_until(key)?;

        if self.clean_session {
            self.registry.clear_normal();
        }
        self.state = if duration > 0 { State::Asleep } else { State::Disconnected };
        Ok(())
    }

    /// LWT topic update (§4.5), valid only while ACTIVE.
    pub fn send_will_topic_update(&mut self, topic: impl Into<String>) -> Result<(), MqttSnError> {
        self.require_active()?;
        let topic = topic.into();
        let (qos, retain) = self.will.as_ref().map(|w| (w.qos, w.retain)).unwrap_or((mqttsn_core::QoS::AtMostOnce, false));

        let packet = Packet::Willtopicupd(Willtopic { qos, retain, topic: topic.clone() });
        let bytes = encode(&packet).map_err(|e| MqttSnError::Malformed(e.to_string()))?;

        let key = (MsgType::Willtopicresp, 0);
        let timeout = self.timeout;
        let max_retries = self.max_retries;
        self.pending.insert(key, bytes.clone(), timeout, max_retries, false, PendingContext::None);
        self.send_raw(&bytes)?;

        match self.poll_until(key)? {
            Packet::Willtopicresp(resp) if resp.return_code.is_accepted() => {
                if let Some(will) = self.will.as_mut() {
                    will.topic = topic;
                } else {
                    self.will = Some(crate::session::WillConfig { topic, message: Vec::new(), qos, retain });
                }
                Ok(())
            }
            Packet::Willtopicresp(resp) => Err(MqttSnError::Rejected(resp.return_code)),
            _ => Err(MqttSnError::ProtocolViolation("expected WILLTOPICRESP")),
        }
    }

    /// LWT message update (§4.5), valid only while ACTIVE.
    pub fn send_will_message_update(&mut self, message: impl Into<Vec<u8>>) -> Result<(), MqttSnError> {
        self.require_active()?;
        let message = message.into();
        let packet = Packet::Willmsgupd(Willmsg { message: message.clone() });
        let bytes = encode(&packet).map_err(|e| MqttSnError::Malformed(e.to_string()))?;

        let key = (MsgType::Willmsgresp, 0);
        let timeout = self.timeout;
        let max_retries = self.max_retries;
        self.pending.insert(key, bytes.clone(), timeout, max_retries, false, PendingContext::None);
        self.send_raw(&bytes)?;

        match self.poll_until(key)? {
            Packet::Willmsgresp(resp) if resp.return_code.is_accepted() => {
                if let Some(will) = self.will.as_mut() {
                    will.message = message;
                }
                Ok(())
            }
            Packet::Willmsgresp(resp) => Err(MqttSnError::Rejected(resp.return_code)),
            _ => Err(MqttSnError::ProtocolViolation("expected WILLMSGRESP")),
        }
    }
}
