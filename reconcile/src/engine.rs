use crate::diff::Diff;
use crate::window::PendingRefresh;
use crate::window::ResultWindow;
use monitor_protocol::ChangeSignal;
use monitor_protocol::ResultSnapshot;
use monitor_protocol::UserId;
use serde::Serialize;
use tracing::debug;

/// Why a snapshot is being reconciled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Trigger {
    /// Explicit user action: replace wholesale, never suppress.
    pub force: bool,
    /// The editor caused the change themselves; structural changes apply
    /// immediately even when the view is disturbed.
    pub own_change: bool,
}

impl Trigger {
    pub fn soft() -> Self {
        Self::default()
    }

    pub fn forced() -> Self {
        Self {
            force: true,
            own_change: false,
        }
    }

    pub fn from_signal(signal: &ChangeSignal, identity: &UserId) -> Self {
        Self {
            force: signal.force,
            own_change: signal.user.as_ref() == Some(identity),
        }
    }
}

/// What the editor is doing with the list right now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewState {
    /// An item from this group is open in preview.
    pub has_open_preview: bool,
    pub scroll_offset: u32,
}

impl ViewState {
    pub fn at_rest() -> Self {
        Self::default()
    }

    /// Replacing the list now would move content under the editor.
    pub fn is_disturbed(&self) -> bool {
        self.has_open_preview || self.scroll_offset > 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowChange {
    /// Window rebuilt from the snapshot.
    Replaced,
    /// Membership changed and was spliced in.
    Merged,
    /// Same membership; retained items patched.
    UpdatedInPlace,
    /// Membership changed but the snapshot was parked.
    Suppressed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reconciled {
    pub window: ResultWindow,
    pub change: WindowChange,
    pub diff: Diff,
}

impl Reconciled {
    pub fn suppressed(&self) -> bool {
        self.change == WindowChange::Suppressed
    }

    /// Count surfaced with the refresh affordance.
    pub fn pending_count(&self) -> usize {
        self.window.pending_count()
    }
}

/// Merges `snapshot` into `current`.
///
/// A suppressed result leaves the visible items of `current` untouched and
/// parks the snapshot; a later reconcile with an empty diff or an
/// [`ResultWindow::apply_pending`] clears it.
pub fn reconcile(
    current: Option<&ResultWindow>,
    snapshot: ResultSnapshot,
    trigger: Trigger,
    view: ViewState,
) -> Reconciled {
    let Some(current) = current.filter(|_| !trigger.force) else {
        let diff = current
            .map(|window| Diff::between(window.items(), &snapshot.items))
            .unwrap_or_default();
        debug!(items = snapshot.items.len(), total = snapshot.total, "replacing window");
        return Reconciled {
            window: ResultWindow::from_snapshot(snapshot),
            change: WindowChange::Replaced,
            diff,
        };
    };

    let diff = Diff::between(current.items(), &snapshot.items);
    let mut next = current.clone();

    if diff.is_empty() {
        next.refresh_in_place(&snapshot);
        next.set_total(snapshot.total);
        next.clear_pending();
        return Reconciled {
            window: next,
            change: WindowChange::UpdatedInPlace,
            diff,
        };
    }

    if view.is_disturbed() && !trigger.own_change {
        debug!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            "suppressing structural change"
        );
        next.park(PendingRefresh {
            snapshot,
            diff: diff.clone(),
        });
        return Reconciled {
            window: next,
            change: WindowChange::Suppressed,
            diff,
        };
    }

    next.splice(&snapshot, &diff);
    next.refresh_in_place(&snapshot);
    next.set_total(snapshot.total);
    next.clear_pending();
    debug!(
        added = diff.added.len(),
        removed = diff.removed.len(),
        "merged structural change"
    );
    Reconciled {
        window: next,
        change: WindowChange::Merged,
        diff,
    }
}
