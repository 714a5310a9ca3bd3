use std::collections::HashMap;

use mqttsn_core::{TopicId, TopicIdType};

/// Bidirectional name/id mapping, partitioned by alias kind.
///
/// SHORT topics never appear here: their id is computed on demand from the
/// ASCII bytes of the 2-character name (§4.2). PREDEFINED entries are loaded
/// once at construction and never mutate afterwards.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    normal_name_to_id: HashMap<String, u16>,
    normal_id_to_name: HashMap<u16, String>,
    predefined_name_to_id: HashMap<String, u16>,
    predefined_id_to_name: HashMap<u16, String>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_predefined<I>(predefined: I) -> Self
    where
        I: IntoIterator<Item = (String, u16)>,
    {
        let mut registry = Self::new();
        for (name, id) in predefined {
            registry.predefined_id_to_name.insert(id, name.clone());
            registry.predefined_name_to_id.insert(name, id);
        }
        registry
    }

    /// Inserts a gateway-assigned NORMAL id, e.g. from an accepted REGACK or
    /// a gateway-initiated REGISTER.
    pub fn register_local(&mut self, name: &str, id: u16) {
        self.normal_name_to_id.insert(name.to_owned(), id);
        self.normal_id_to_name.insert(id, name.to_owned());
    }

    /// Drops a NORMAL mapping after the gateway rejects it as an invalid
    /// topic id (PUBACK rc=InvalidTopicId).
    pub fn invalidate(&mut self, name: &str) {
        if let Some(id) = self.normal_name_to_id.remove(name) {
            self.normal_id_to_name.remove(&id);
        }
    }

    /// Resolves a topic name to an id, trying SHORT, then PREDEFINED, then
    /// already-registered NORMAL mappings, in that order (§4.6 step 3).
    pub fn resolve_name(&self, name: &str) -> Option<TopicId> {
        if let Some(short) = TopicId::short(name) {
            return Some(short);
        }
        if let Some(&id) = self.predefined_name_to_id.get(name) {
            return Some(TopicId::predefined(id));
        }
        self.normal_name_to_id.get(name).map(|&id| TopicId::normal(id))
    }

    pub fn resolve_id(&self, id: u16, kind: TopicIdType) -> Option<&str> {
        match kind {
            TopicIdType::Normal => self.normal_id_to_name.get(&id).map(String::as_str),
            TopicIdType::Predefined => self.predefined_id_to_name.get(&id).map(String::as_str),
            TopicIdType::Short => None,
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.normal_name_to_id.contains_key(name)
    }

    /// Drops all NORMAL mappings, called on DISCONNECT when clean-session is set.
    pub fn clear_normal(&mut self) {
        self.normal_name_to_id.clear();
        self.normal_id_to_name.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registered_normal_topic() {
        let mut registry = TopicRegistry::new();
        registry.register_local("mqttsn/test/pub_qos0", 7);
        assert_eq!(registry.resolve_name("mqttsn/test/pub_qos0").unwrap().id, 7);
        assert_eq!(registry.resolve_id(7, TopicIdType::Normal), Some("mqttsn/test/pub_qos0"));
    }

    #[test]
    fn short_topics_never_persist() {
        let registry = TopicRegistry::new();
        let id = registry.resolve_name("ab").unwrap();
        assert_eq!(id.kind, TopicIdType::Short);
        assert!(!registry.is_registered("ab"));
    }

    #[test]
    fn predefined_topics_are_immutable() {
        let registry =
            TopicRegistry::with_predefined(vec![("weather/temp".to_owned(), 1u16)]);
        assert_eq!(registry.resolve_name("weather/temp").unwrap().kind, TopicIdType::Predefined);
    }

    #[test]
    fn clear_normal_drops_only_normal_mappings() {
        let mut registry =
            TopicRegistry::with_predefined(vec![("weather/temp".to_owned(), 1u16)]);
        registry.register_local("mqttsn/test/pub_qos0", 7);
        registry.clear_normal();
        assert!(registry.resolve_name("mqttsn/test/pub_qos0").is_none());
        assert!(registry.resolve_name("weather/temp").is_some());
    }
}
