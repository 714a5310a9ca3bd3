use crate::error::MqttSnError;

/// Monotonic 16-bit message-id counter, wrapping from `0xFFFF` back to `1`.
///
/// `0` is reserved by the wire format for QoS 0/−1 publishes and is never
/// handed out.
#[derive(Debug)]
pub struct MsgIdAllocator {
    next: u16,
}

impl Default for MsgIdAllocator {
    fn default() -> Self {
        MsgIdAllocator { next: 1 }
    }
}

impl MsgIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next free id, probing forward past ids `is_pending`
    /// still claims. Fails with [`MqttSnError::OutOfMessageIds`] only once
    /// every one of the 65,535 usable ids is in flight.
    pub fn next<F>(&mut self, is_pending: F) -> Result<u16, MqttSnError>
    where
        F: Fn(u16) -> bool,
    {
        let start = self.next;
        loop {
            let candidate = self.next;
            self.advance();

            if !is_pending(candidate) {
                return Ok(candidate);
            }

            if self.next == start {
                return Err(MqttSnError::OutOfMessageIds);
            }
        }
    }

    fn advance(&mut self) {
        self.next = if self.next == 0xFFFF { 1 } else { self.next + 1 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_one_and_increments() {
        let mut alloc = MsgIdAllocator::new();
        assert_eq!(alloc.next(|_| false).unwrap(), 1);
        assert_eq!(alloc.next(|_| false).unwrap(), 2);
    }

    #[test]
    fn wraps_from_0xffff_to_one_skipping_zero() {
        let mut alloc = MsgIdAllocator { next: 0xFFFF };
        assert_eq!(alloc.next(|_| false).unwrap(), 0xFFFF);
        assert_eq!(alloc.next(|_| false).unwrap(), 1);
    }

    #[test]
    fn probes_past_pending_ids() {
        let mut alloc = MsgIdAllocator::new();
        let id = alloc.next(|id| id == 1).unwrap();
        assert_eq!(id, 2);
    }

    #[test]
    fn exhausted_space_is_out_of_message_ids() {
        let mut alloc = MsgIdAllocator::new();
        let err = alloc.next(|_| true).unwrap_err();
        assert!(matches!(err, MqttSnError::OutOfMessageIds));
    }
}
