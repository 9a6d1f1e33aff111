/*!
# Monitor Reconcile

Reconciliation engine for monitoring lists. Merges a freshly fetched
[`ResultSnapshot`] into the [`ResultWindow`] a group currently shows:

- forced refreshes and first fetches replace the window wholesale
- metadata-only changes patch retained items in place
- structural changes (items added or removed) are spliced in at their
  snapshot positions, or parked as a pending snapshot when applying them
  would disturb the editor

Pagination appends after the tail and single-item refreshes patch in place.
Every operation is total: items without an identity are skipped.

[`ResultSnapshot`]: monitor_protocol::ResultSnapshot
*/

mod diff;
mod engine;
mod window;

pub use diff::Diff;
pub use engine::Reconciled;
pub use engine::Trigger;
pub use engine::ViewState;
pub use engine::WindowChange;
pub use engine::reconcile;
pub use window::PendingRefresh;
pub use window::ResultWindow;
