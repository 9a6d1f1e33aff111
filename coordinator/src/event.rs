use monitor_protocol::GroupId;
use monitor_reconcile::ResultWindow;
use serde::Serialize;

/// Notifications for the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    WindowChanged {
        group: GroupId,
        window: ResultWindow,
        /// The list was rebuilt by a forced refresh and should scroll to top.
        reset_scroll: bool,
    },
    /// A structural change is parked behind the refresh affordance.
    RefreshAvailable { group: GroupId, pending_count: usize },
    /// Non-blocking notice; the last good window stays on screen.
    FetchFailed { group: GroupId, message: String },
}

impl MonitorEvent {
    pub fn group(&self) -> &GroupId {
        match self {
            MonitorEvent::WindowChanged { group, .. }
            | MonitorEvent::RefreshAvailable { group, .. }
            | MonitorEvent::FetchFailed { group, .. } => group,
        }
    }
}
