use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a list entry: either assigned by the server or a local
/// placeholder for an entry the server has not acknowledged yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ItemId {
    Server(u64),
    Provisional(u64),
}

impl ItemId {
    pub fn is_provisional(&self) -> bool {
        matches!(self, ItemId::Provisional(_))
    }

    pub fn server(&self) -> Option<u64> {
        match self {
            ItemId::Server(id) => Some(*id),
            ItemId::Provisional(_) => None,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Server(id) => write!(f, "{id}"),
            ItemId::Provisional(id) => write!(f, "tmp-{id}"),
        }
    }
}

/// Clock-seeded, strictly increasing provisional ids.
#[derive(Debug, Default, Clone)]
pub struct ProvisionalIds {
    last: u64,
}

impl ProvisionalIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> ItemId {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.last = now.max(self.last + 1);
        ItemId::Provisional(self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisional_ids_strictly_increase() {
        let mut ids = ProvisionalIds::new();
        let mut previous = 0;
        for _ in 0..1000 {
            let ItemId::Provisional(value) = ids.next() else {
                panic!("expected provisional id");
            };
            assert!(value > previous);
            previous = value;
        }
    }

    #[test]
    fn test_server_and_provisional_never_equal() {
        assert_ne!(ItemId::Server(42), ItemId::Provisional(42));
        assert_eq!(ItemId::Server(42).server(), Some(42));
        assert_eq!(ItemId::Provisional(42).server(), None);
        assert_eq!(ItemId::Provisional(42).to_string(), "tmp-42");
    }
}
