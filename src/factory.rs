//! Message factory: id → prototype dispatch over a fixed, ordered registry.
//!
//! Several message types may share an id; they are told apart by their index among the
//! registrations with that id, in declaration order.

use crate::message::{Message, MsgId};

#[derive(Debug, Clone, Default)]
pub struct MessageFactory {
    prototypes: Vec<Message>,
    id_names: Vec<(String, u64)>,
}

impl MessageFactory {
    pub fn new(prototypes: Vec<Message>) -> Self {
        MessageFactory {
            prototypes,
            id_names: Vec::new(),
        }
    }

    /// Symbolic names for ids (the id enum), accepted by [`MessageFactory::create_by_str`].
    pub fn with_id_names(mut self, names: Vec<(String, u64)>) -> Self {
        self.id_names = names;
        self
    }

    pub fn prototypes(&self) -> &[Message] {
        &self.prototypes
    }

    pub fn id_names(&self) -> &[(String, u64)] {
        &self.id_names
    }

    pub fn id_name(&self, id: MsgId) -> Option<&str> {
        self.id_names
            .iter()
            .find(|(_, v)| *v == id.0)
            .map(|(n, _)| n.as_str())
    }

    /// Number of registered types for `id`.
    pub fn count(&self, id: MsgId) -> usize {
        self.prototypes.iter().filter(|m| m.id() == id).count()
    }

    /// Default-constructed `idx`-th type registered for `id`.
    pub fn create(&self, id: MsgId, idx: usize) -> Option<Message> {
        self.prototypes
            .iter()
            .filter(|m| m.id() == id)
            .nth(idx)
            .cloned()
    }

    /// Create from a string key: decimal or `0x` hex id, id enum name, or message type name.
    pub fn create_by_str(&self, key: &str, idx: usize) -> Option<Message> {
        let key = key.trim();
        if let Some(id) = parse_number(key) {
            return self.create(MsgId(id), idx);
        }
        if let Some((_, id)) = self.id_names.iter().find(|(n, _)| n == key) {
            return self.create(MsgId(*id), idx);
        }
        self.prototypes.iter().find(|m| m.name() == key).cloned()
    }

    /// One default instance of every registered type, in declaration order.
    pub fn create_all(&self) -> Vec<Message> {
        self.prototypes.clone()
    }
}

fn parse_number(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> MessageFactory {
        MessageFactory::new(vec![
            Message::new(1, "A"),
            Message::new(2, "B1"),
            Message::new(2, "B2"),
        ])
        .with_id_names(vec![("MsgA".into(), 1), ("MsgB".into(), 2)])
    }

    #[test]
    fn duplicate_ids_by_index() {
        let f = factory();
        assert_eq!(f.count(MsgId(2)), 2);
        assert_eq!(f.create(MsgId(2), 1).map(|m| m.name().to_string()), Some("B2".into()));
        assert!(f.create(MsgId(2), 2).is_none());
        assert!(f.create(MsgId(9), 0).is_none());
    }

    #[test]
    fn string_keys() {
        let f = factory();
        assert_eq!(f.create_by_str("0x2", 0).map(|m| m.name().to_string()), Some("B1".into()));
        assert_eq!(f.create_by_str("MsgB", 1).map(|m| m.name().to_string()), Some("B2".into()));
        assert_eq!(f.create_by_str("A", 0).map(|m| m.id()), Some(MsgId(1)));
        assert_eq!(f.create_all().len(), 3);
    }
}
