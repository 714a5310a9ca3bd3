use std::collections::HashMap;

use mqttsn_core::{QoS, TopicIdType};

/// Opaque handle returned by `subscribe`, used only to `unsubscribe` later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(usize);

pub type Callback = Box<dyn FnMut(&str, &[u8], QoS, bool) + Send>;

pub struct ListenerEntry {
    pub filter: String,
    pub kind: TopicIdType,
    /// Concrete topic ids bound to this filter. A wildcard filter can
    /// accumulate more than one, as the gateway expands it into several
    /// gateway-initiated REGISTERs (§9).
    pub topic_ids: Vec<u16>,
    pub callback: Callback,
}

/// Per-subscription listener table, owned entirely by the session.
#[derive(Default)]
pub struct ListenerTable {
    entries: HashMap<usize, ListenerEntry>,
    next_handle: usize,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filter: String, kind: TopicIdType, callback: Callback) -> ListenerHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.entries.insert(handle, ListenerEntry { filter, kind, topic_ids: Vec::new(), callback });
        ListenerHandle(handle)
    }

    pub fn remove(&mut self, handle: ListenerHandle) -> Option<ListenerEntry> {
        self.entries.remove(&handle.0)
    }

    pub fn bind_id(&mut self, handle: ListenerHandle, topic_id: u16) {
        if let Some(entry) = self.entries.get_mut(&handle.0) {
            if !entry.topic_ids.contains(&topic_id) {
                entry.topic_ids.push(topic_id);
            }
        }
    }

    pub fn find_by_id(&mut self, topic_id: u16) -> Option<&mut ListenerEntry> {
        self.entries.values_mut().find(|entry| entry.topic_ids.contains(&topic_id))
    }

    /// Finds a wildcard listener whose filter matches a concrete name the
    /// gateway announced via an unsolicited REGISTER, binding it on the fly.
    pub fn find_by_matching_filter(&mut self, name: &str) -> Option<ListenerHandle> {
        self.entries
            .iter()
            .find(|(_, entry)| topic_matches(&entry.filter, name))
            .map(|(&id, _)| ListenerHandle(id))
    }

    /// Removes the NORMAL/SHORT listener subscribed under exactly this
    /// filter, the way `unsubscribe(filter)` identifies it in the original
    /// client.
    pub fn remove_by_filter(&mut self, filter: &str) -> Option<ListenerEntry> {
        let handle = self
            .entries
            .iter()
            .find(|(_, entry)| entry.kind != TopicIdType::Predefined && entry.filter == filter)
            .map(|(&id, _)| id)?;
        self.entries.remove(&handle)
    }

    /// Removes the PREDEFINED listener bound to this topic id.
    pub fn remove_by_predefined_id(&mut self, topic_id: u16) -> Option<ListenerEntry> {
        let handle = self
            .entries
            .iter()
            .find(|(_, entry)| entry.kind == TopicIdType::Predefined && entry.topic_ids.contains(&topic_id))
            .map(|(&id, _)| id)?;
        self.entries.remove(&handle)
    }
}

/// Minimal MQTT topic-filter matcher for `+` (single level) and `#` (multi
/// level, trailing only). The gateway is the authority on matching (§3); this
/// exists only so the client can bind a concrete id a gateway REGISTER
/// announces to the wildcard listener that asked for it.
fn topic_matches(filter: &str, name: &str) -> bool {
    let filter_levels: Vec<&str> = filter.split('/').collect();
    let name_levels: Vec<&str> = name.split('/').collect();

    let mut fi = 0;
    let mut ni = 0;
    while fi < filter_levels.len() {
        match filter_levels[fi] {
            "#" => return true,
            "+" => {
                if ni >= name_levels.len() {
                    return false;
                }
            }
            exact => {
                if name_levels.get(ni) != Some(&exact) {
                    return false;
                }
            }
        }
        fi += 1;
        ni += 1;
    }
    ni == name_levels.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_matches_one_level() {
        assert!(topic_matches("mqttsn/+/pub", "mqttsn/test/pub"));
        assert!(!topic_matches("mqttsn/+/pub", "mqttsn/test/extra/pub"));
    }

    #[test]
    fn hash_matches_remaining_levels() {
        assert!(topic_matches("mqttsn/#", "mqttsn/test/sub_qos0"));
        assert!(topic_matches("mqttsn/#", "mqttsn"));
    }

    #[test]
    fn exact_filters_require_exact_match() {
        assert!(topic_matches("mqttsn/test/sub_qos0", "mqttsn/test/sub_qos0"));
        assert!(!topic_matches("mqttsn/test/sub_qos0", "mqttsn/test/sub_qos1"));
    }

    #[test]
    fn wildcard_listener_accumulates_multiple_concrete_ids() {
        let mut table = ListenerTable::new();
        let handle = table.insert("mqttsn/+/pub".into(), TopicIdType::Normal, Box::new(|_, _, _, _| {}));
        table.bind_id(handle, 1);
        table.bind_id(handle, 2);
        assert!(table.find_by_id(1).is_some());
        assert!(table.find_by_id(2).is_some());
    }
}
