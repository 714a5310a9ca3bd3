use std::collections::{HashMap, HashSet};
use std::net::ToSocketAddrs;
use std::time::{Duration, Instant};

use mqttsn_core::{Packet, QoS};

use crate::error::MqttSnError;
use crate::listener::ListenerTable;
use crate::msgid::MsgIdAllocator;
use crate::pending::{PendingKey, PendingRequestTable};
use crate::registry::TopicRegistry;
use crate::transport::{Transport, UdpTransport};

pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Session lifecycle states (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Active,
    Asleep,
    Lost,
}

#[derive(Debug, Clone)]
pub struct WillConfig {
    pub topic: String,
    pub message: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Single-threaded, cooperative MQTT-SN v1.2 client session.
///
/// Every field here is owned by the session and mutated only from the thread
/// that calls `poll()`/`run()` (§5): there is no interior mutability and no
/// locking anywhere in this crate.
pub struct Session<T: Transport = UdpTransport> {
    pub(crate) transport: T,
    pub(crate) state: State,
    pub(crate) client_id: String,
    pub(crate) keep_alive: Duration,
    pub(crate) clean_session: bool,
    pub(crate) will: Option<WillConfig>,
    pub(crate) timeout: Duration,
    pub(crate) max_retries: u32,
    pub(crate) registry: TopicRegistry,
    pub(crate) pending: PendingRequestTable,
    pub(crate) listeners: ListenerTable,
    pub(crate) msgid: MsgIdAllocator,
    pub(crate) last_outbound: Instant,
    /// Acks that a `poll()` dispatch has already matched to a pending
    /// request, waiting to be picked up by the pipeline call spinning on it.
    pub(crate) completed: HashMap<PendingKey, Packet>,
    pub(crate) timed_out: HashSet<PendingKey>,
}

impl Session<UdpTransport> {
    /// Binds a UDP socket and connects it to the gateway at `addr`.
    pub fn open<A: ToSocketAddrs>(addr: A) -> Result<Self, MqttSnError> {
        let transport = UdpTransport::open(addr)?;
        Ok(Self::with_transport(transport))
    }
}

impl<T: Transport> Session<T> {
    /// Builds a session around an already-open transport and a caller-loaded
    /// predefined topic table; predefined ids never mutate for the life of
    /// the session (Open Question (c), §9).
    pub fn with_transport_and_predefined<I>(transport: T, predefined: I) -> Self
    where
        I: IntoIterator<Item = (String, u16)>,
    {
        Session {
            transport,
            state: State::Disconnected,
            client_id: default_client_id(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            clean_session: true,
            will: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            registry: TopicRegistry::with_predefined(predefined),
            pending: PendingRequestTable::new(),
            listeners: ListenerTable::new(),
            msgid: MsgIdAllocator::new(),
            last_outbound: Instant::now(),
            completed: HashMap::new(),
            timed_out: HashSet::new(),
        }
    }

    pub fn with_transport(transport: T) -> Self {
        Self::with_transport_and_predefined(transport, std::iter::empty())
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    pub fn set_client_id(&mut self, client_id: impl Into<String>) {
        self.client_id = client_id.into();
    }

    pub fn set_keep_alive(&mut self, seconds: u16) {
        self.keep_alive = Duration::from_secs(u64::from(seconds));
    }

    pub fn set_timeout(&mut self, seconds: u64) {
        self.timeout = Duration::from_secs(seconds);
    }

    pub fn set_max_retries(&mut self, retries: u32) {
        self.max_retries = retries;
    }

    pub fn set_clean_session(&mut self, clean_session: bool) {
        self.clean_session = clean_session;
    }

    pub fn set_will(&mut self, topic: impl Into<String>, message: impl Into<Vec<u8>>, qos: QoS, retain: bool) {
        self.will = Some(WillConfig { topic: topic.into(), message: message.into(), qos, retain });
    }

    pub(crate) fn allocate_msg_id(&mut self) -> Result<u16, MqttSnError> {
        let pending = &self.pending;
        self.msgid.next(|id| pending.is_msg_id_pending(id))
    }

    pub(crate) fn require_active(&self) -> Result<(), MqttSnError> {
        if self.state == State::Active {
            Ok(())
        } else {
            Err(MqttSnError::ProtocolViolation("session is not ACTIVE"))
        }
    }

    pub(crate) fn send_raw(&mut self, buf: &[u8]) -> Result<(), MqttSnError> {
        log::trace!(
            "send {} bytes:\n{}",
            buf.len(),
            hexplay::HexViewBuilder::new(buf).finish()
        );
        self.transport.send(buf)?;
        self.last_outbound = Instant::now();
        Ok(())
    }

    /// Releases the transport. Safe to call from any state; a subsequent
    /// outbound call fails with `Closed` only once the caller drops the
    /// session, since `close` consumes it (matching the teacher's
    /// `Client::disconnect(self)` by-value release).
    pub fn close(mut self) -> Result<(), MqttSnError> {
        if self.state == State::Active {
            let _ = self.send_disconnect(0);
        }
        self.state = State::Disconnected;
        Ok(())
    }
}

fn default_client_id() -> String {
    hostname::get_hostname().unwrap_or_else(|| "mqttsn-client".to_owned())
}
