/*!
# Monitor Coordinator

Keeps every active monitoring group's result window live:

- **Relevance**: each change signal is filtered per group; irrelevant
  signals are dropped without a query
- **Debounce**: relevant signals coalesce into one refetch per interval;
  the timer starts with the first signal and is never pushed back
- **Reconciliation**: snapshots are merged into the window, or parked
  behind a refresh affordance while the editor is previewing or scrolled
- **Ordering**: responses are tagged with the descriptor generation and a
  sequence number; anything stale is dropped before it reaches a window

Groups run as independent tasks behind a [`MonitorRegistry`]. Queries
from all groups share one concurrency limit.
*/

mod config;
mod error;
mod event;
mod feed;
mod group;
mod memory;
mod registry;
mod relevance;
mod service;

pub use config::AUTOREFRESH_ENV;
pub use config::DEBOUNCE_ENV;
pub use config::MAX_CONCURRENT_QUERIES_ENV;
pub use config::MonitorConfig;
pub use error::MonitorError;
pub use error::Result;
pub use error::StaleWindowError;
pub use event::MonitorEvent;
pub use feed::ChangeFeed;
pub use group::GroupHandle;
pub use group::Outcome;
pub use memory::InMemoryQueryService;
pub use registry::MonitorRegistry;
pub use service::QueryService;
pub use service::SharedUserContext;
pub use service::UserContextSource;
