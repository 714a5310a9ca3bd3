//! Client session engine for MQTT-SN v1.2 over a UDP gateway.
//!
//! This crate owns the part of the stack the wire codec
//! (`mqttsn-core`) does not: the session state machine, the topic-alias
//! registry, message-id allocation, request/response correlation with
//! retransmission, keep-alive, and publish/subscribe pipelines. The
//! transport is an external collaborator behind the [`Transport`] trait;
//! [`UdpTransport`] is the only implementation shipped.

mod connect;
mod dispatch;
mod error;
mod listener;
mod msgid;
mod pending;
mod publish;
mod registry;
mod session;
mod subscribe;
mod transport;

pub use error::MqttSnError;
pub use listener::ListenerHandle;
pub use mqttsn_core as packet;
pub use session::{Session, State, WillConfig};
pub use transport::{Transport, UdpTransport};
