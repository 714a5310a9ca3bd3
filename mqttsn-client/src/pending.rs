use std::collections::HashMap;
use std::time::{Duration, Instant};

use mqttsn_core::MsgType;

use crate::listener::ListenerHandle;

/// (expected reply type, msgId) — the correlation key for an in-flight request.
pub type PendingKey = (MsgType, u16);

/// What the dispatcher should do with a pending request's bookkeeping the
/// moment its ack arrives, before handing the ack back to whatever pipeline
/// call is spinning `poll()` waiting for it.
#[derive(Debug)]
pub enum PendingContext {
    None,
    /// A client-initiated REGISTER: on accept, bind `name` to the id the
    /// gateway returned (§4.6 step 3).
    RegisterTopic { name: String },
    /// A SUBSCRIBE: on accept, bind the returned topic id to this listener.
    Subscribe { handle: ListenerHandle },
    /// A QoS 1 PUBLISH to a NORMAL topic: on rc=InvalidTopicId, drop the
    /// mapping so the next publish re-registers (§4.6 step 5).
    PublishTopic { name: String },
}

#[derive(Debug)]
pub struct PendingRequest {
    pub payload: Vec<u8>,
    pub deadline: Instant,
    pub retries_remaining: u32,
    /// Only PUBLISH retransmits carry DUP (§4.3); everything else is resent verbatim.
    pub can_dup: bool,
    pub context: PendingContext,
}

/// What a sweep of expired entries asks the caller to do.
pub enum SweepAction {
    Retransmit { key: PendingKey, payload: Vec<u8> },
    TimedOut { key: PendingKey },
}

/// Tracks in-flight request/response pairs with a deadline and retry budget.
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    entries: HashMap<PendingKey, PendingRequest>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        key: PendingKey,
        payload: Vec<u8>,
        timeout: Duration,
        max_retries: u32,
        can_dup: bool,
        context: PendingContext,
    ) {
        self.entries.insert(
            key,
            PendingRequest {
                payload,
                deadline: Instant::now() + timeout,
                retries_remaining: max_retries,
                can_dup,
                context,
            },
        );
    }

    /// Removes and returns the entry matching an inbound ack, completing the request.
    pub fn complete(&mut self, key: PendingKey) -> Option<PendingRequest> {
        self.entries.remove(&key)
    }

    pub fn is_msg_id_pending(&self, msg_id: u16) -> bool {
        self.entries.keys().any(|(_, id)| *id == msg_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every pending entry, used when the session closes or is lost
    /// (every awaiter must be completed exactly once — invariant 2 of §8).
    pub fn drain_all(&mut self) -> Vec<PendingKey> {
        self.entries.drain().map(|(key, _)| key).collect()
    }

    /// Drains expired entries, timeout value, returning what the caller must
    /// do for each: retransmit (deadline reset, retries decremented) or
    /// surface a timeout (entry removed).
    pub fn sweep(&mut self, timeout: Duration) -> Vec<SweepAction> {
        let now = Instant::now();
        let mut actions = Vec::new();
        let expired: Vec<PendingKey> = self
            .entries
            .iter()
            .filter(|(_, req)| req.deadline <= now)
            .map(|(key, _)| *key)
            .collect();

        for key in expired {
            let entry = self.entries.get_mut(&key).expect("key came from this map");
            if entry.retries_remaining > 0 {
                entry.retries_remaining -= 1;
                entry.deadline = now + timeout;
                actions.push(SweepAction::Retransmit { key, payload: entry.payload.clone() });
            } else {
                self.entries.remove(&key);
                actions.push(SweepAction::TimedOut { key });
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_exactly_once() {
        let mut table = PendingRequestTable::new();
        let key = (MsgType::Puback, 1);
        table.insert(key, vec![1, 2, 3], Duration::from_secs(60), 3, false, PendingContext::None);
        assert!(table.complete(key).is_some());
        assert!(table.complete(key).is_none());
    }

    #[test]
    fn sweep_retransmits_until_retries_exhausted() {
        let mut table = PendingRequestTable::new();
        let key = (MsgType::Puback, 1);
        table.insert(key, vec![9], Duration::from_millis(0), 1, true, PendingContext::None);

        let first = table.sweep(Duration::from_millis(0));
        assert_eq!(first.len(), 1);
        assert!(matches!(first[0], SweepAction::Retransmit { .. }));

        let second = table.sweep(Duration::from_millis(0));
        assert_eq!(second.len(), 1);
        assert!(matches!(second[0], SweepAction::TimedOut { .. }));
        assert!(table.is_empty());
    }
}
