use crate::diff::Diff;
use monitor_protocol::Item;
use monitor_protocol::ItemId;
use monitor_protocol::ResultSnapshot;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::HashSet;
use tracing::debug;

/// A structural change held back until the editor opts in.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PendingRefresh {
    pub snapshot: ResultSnapshot,
    pub diff: Diff,
}

/// The items a group currently shows, in snapshot order.
///
/// Items are unique by identity and always carry one; the engine drops
/// unidentified and duplicate items on the way in.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResultWindow {
    items: Vec<Item>,
    total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending: Option<PendingRefresh>,
}

impl ResultWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Window showing exactly `snapshot`.
    pub fn from_snapshot(snapshot: ResultSnapshot) -> Self {
        Self {
            items: identified(snapshot.items),
            total: snapshot.total,
            pending: None,
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.items.iter().filter_map(Item::key)
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.key() == Some(id))
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.get(id).is_some()
    }

    pub fn pending(&self) -> Option<&PendingRefresh> {
        self.pending.as_ref()
    }

    /// Size of the held-back change, zero when nothing is pending.
    pub fn pending_count(&self) -> usize {
        self.pending.as_ref().map_or(0, |pending| pending.diff.len())
    }

    pub(crate) fn park(&mut self, pending: PendingRefresh) {
        self.pending = Some(pending);
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending = None;
    }

    pub(crate) fn set_total(&mut self, total: usize) {
        self.total = total;
    }

    /// Appends the next page after the tail. Identities already shown are
    /// skipped; the total always follows the page.
    pub fn append_page(&mut self, page: ResultSnapshot) -> usize {
        let mut known: HashSet<ItemId> = self.ids().cloned().collect();
        let before = self.items.len();
        for item in page.items {
            let Some(id) = item.key() else {
                continue;
            };
            if known.insert(id.clone()) {
                self.items.push(item);
            }
        }
        self.total = page.total;
        let appended = self.items.len() - before;
        debug!(appended, total = self.total, "appended page");
        appended
    }

    /// Copies fields of items present in both the window and `snapshot`
    /// onto the retained items. Membership, order and the total are left
    /// alone. Returns how many items were patched.
    pub fn refresh_in_place(&mut self, snapshot: &ResultSnapshot) -> usize {
        let fresh: HashMap<&ItemId, &Item> = snapshot
            .items
            .iter()
            .filter_map(|item| item.key().map(|id| (id, item)))
            .collect();
        let mut patched = 0;
        for item in &mut self.items {
            let Some(source) = item.key().and_then(|id| fresh.get(id)) else {
                continue;
            };
            item.version.clone_from(&source.version);
            item.fields.clone_from(&source.fields);
            item.highlight.clone_from(&source.highlight);
            item.gone = false;
            patched += 1;
        }
        patched
    }

    /// Flags items as gone so they grey out before the next refetch lands.
    pub fn mark_gone(&mut self, ids: &[ItemId]) -> usize {
        let mut marked = 0;
        for item in &mut self.items {
            if item.key().is_some_and(|id| ids.contains(id)) && !item.gone {
                item.gone = true;
                marked += 1;
            }
        }
        marked
    }

    /// Applies the parked snapshot as a wholesale replacement.
    pub fn apply_pending(&mut self) -> Option<Diff> {
        let pending = self.pending.take()?;
        *self = Self::from_snapshot(pending.snapshot);
        Some(pending.diff)
    }

    /// Removes departed items and splices arrivals in at their snapshot
    /// index. Retained items keep their relative order.
    pub(crate) fn splice(&mut self, snapshot: &ResultSnapshot, diff: &Diff) {
        let removed: HashSet<&ItemId> = diff.removed.iter().collect();
        self.items
            .retain(|item| item.key().is_some_and(|id| !removed.contains(id)));

        // Positions count only the items the window can hold.
        let added: HashSet<&ItemId> = diff.added.iter().collect();
        let mut seen: HashSet<&ItemId> = HashSet::new();
        let positioned = snapshot
            .items
            .iter()
            .filter_map(|item| item.key().map(|id| (id, item)))
            .filter(|(id, _)| seen.insert(*id));
        for (index, (id, item)) in positioned.enumerate() {
            if added.contains(id) {
                let at = index.min(self.items.len());
                self.items.insert(at, item.clone());
            }
        }
    }
}

/// Drops unidentified items and repeated identities, keeping first
/// occurrences.
fn identified(items: Vec<Item>) -> Vec<Item> {
    let mut seen: HashSet<ItemId> = HashSet::new();
    items
        .into_iter()
        .filter(|item| item.key().is_some_and(|id| seen.insert(id.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn snapshot(ids: &[&str], total: usize) -> ResultSnapshot {
        ResultSnapshot::new(ids.iter().map(|id| Item::new(*id)).collect(), total)
    }

    fn ids(window: &ResultWindow) -> Vec<&str> {
        window.ids().map(ItemId::as_str).collect()
    }

    #[test]
    fn from_snapshot_skips_unidentified_and_duplicate_items() {
        let mut source = snapshot(&["a", "b", "a"], 3);
        source.items.insert(1, Item::default());
        let window = ResultWindow::from_snapshot(source);
        assert_eq!(ids(&window), vec!["a", "b"]);
        assert_eq!(window.total(), 3);
    }

    #[test]
    fn append_page_extends_tail_without_duplicates() {
        let mut window = ResultWindow::from_snapshot(snapshot(&["a", "b"], 10));
        let appended = window.append_page(snapshot(&["b", "c", "d"], 11));
        assert_eq!(appended, 2);
        assert_eq!(ids(&window), vec!["a", "b", "c", "d"]);
        assert_eq!(window.total(), 11);
    }

    #[test]
    fn refresh_in_place_patches_fields_and_clears_gone() {
        let mut window = ResultWindow::from_snapshot(snapshot(&["a", "b"], 2));
        window.mark_gone(&[ItemId::new("a")]);
        let fresh = ResultSnapshot::new(
            vec![
                Item::new("a")
                    .with_version("v2")
                    .with_field("headline", json!("updated")),
                Item::new("z"),
            ],
            1,
        );
        assert_eq!(window.refresh_in_place(&fresh), 1);
        let a = window.get(&ItemId::new("a")).expect("a");
        assert!(!a.gone);
        assert_eq!(a.version.as_deref(), Some("v2"));
        assert_eq!(a.field("headline"), Some(&json!("updated")));
        assert_eq!(ids(&window), vec!["a", "b"]);
        assert_eq!(window.total(), 2);
    }

    #[test]
    fn mark_gone_only_counts_new_flags() {
        let mut window = ResultWindow::from_snapshot(snapshot(&["a", "b"], 2));
        assert_eq!(window.mark_gone(&[ItemId::new("a"), ItemId::new("x")]), 1);
        assert_eq!(window.mark_gone(&[ItemId::new("a")]), 0);
        assert!(window.get(&ItemId::new("a")).is_some_and(|item| item.gone));
    }

    #[test]
    fn splice_inserts_at_snapshot_positions() {
        let mut window = ResultWindow::from_snapshot(snapshot(&["a", "b", "c"], 3));
        let next = snapshot(&["d", "a", "e", "c"], 4);
        let diff = Diff::between(window.items(), &next.items);
        window.splice(&next, &diff);
        assert_eq!(ids(&window), vec!["d", "a", "e", "c"]);
    }

    #[test]
    fn apply_pending_replaces_window() {
        let mut window = ResultWindow::from_snapshot(snapshot(&["a"], 1));
        assert_eq!(window.apply_pending(), None);
        let next = snapshot(&["b", "a"], 2);
        let diff = Diff::between(window.items(), &next.items);
        window.park(PendingRefresh {
            snapshot: next,
            diff: diff.clone(),
        });
        assert_eq!(window.pending_count(), 1);
        assert_eq!(window.apply_pending(), Some(diff));
        assert_eq!(ids(&window), vec!["b", "a"]);
        assert_eq!(window.pending_count(), 0);
    }
}
