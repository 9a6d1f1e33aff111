use monitor_protocol::Item;
use monitor_protocol::ItemId;
use serde::Serialize;
use std::collections::HashSet;

/// Membership change between a window and a snapshot, by identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Diff {
    /// In the snapshot but not in the window, in snapshot order.
    pub added: Vec<ItemId>,
    /// In the window but not in the snapshot, in window order.
    pub removed: Vec<ItemId>,
}

impl Diff {
    pub fn between(current: &[Item], next: &[Item]) -> Self {
        let current_keys: HashSet<&ItemId> = current.iter().filter_map(Item::key).collect();
        let next_keys: HashSet<&ItemId> = next.iter().filter_map(Item::key).collect();

        let mut seen = HashSet::new();
        let added = next
            .iter()
            .filter_map(Item::key)
            .filter(|id| !current_keys.contains(id) && seen.insert(*id))
            .cloned()
            .collect();
        let removed = current
            .iter()
            .filter_map(Item::key)
            .filter(|id| !next_keys.contains(id))
            .cloned()
            .collect();
        Self { added, removed }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Number of membership changes, shown as the refresh affordance count.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}
