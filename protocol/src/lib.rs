/*!
# Monitor Protocol

Shared data model for the live monitoring list:

- **Group Descriptor**: what a monitoring list shows (stage, desk output,
  saved search, personal workspace, spike bin, highlights collection)
- **Query Criteria**: backend-agnostic request built from a descriptor
- **Result Snapshot**: one immutable answer from the query service
- **Change Signal**: a domain notification that may require a refetch
- **User Context**: the editor state consulted before disturbing a list

The [`Predicate`] tree carries a reference evaluator so that an in-memory
backend can execute criteria exactly the way they were compiled.
*/

mod context;
mod criteria;
mod error;
mod group;
mod ids;
mod item;
mod signal;

pub mod facet;

pub use context::PreviewItem;
pub use context::UserContext;
pub use criteria::Predicate;
pub use criteria::QueryCriteria;
pub use criteria::Repository;
pub use criteria::Routing;
pub use criteria::SortDirection;
pub use criteria::SortOption;
pub use criteria::SpikeMode;
pub use error::QueryServiceError;
pub use group::DeskType;
pub use group::FacetFilters;
pub use group::GroupDescriptor;
pub use group::GroupKind;
pub use group::SavedSearch;
pub use ids::DeskId;
pub use ids::GroupId;
pub use ids::HighlightId;
pub use ids::ItemId;
pub use ids::StageId;
pub use ids::UserId;
pub use item::Item;
pub use item::ResultSnapshot;
pub use item::ID_FIELD;
pub use signal::ChangeSignal;
pub use signal::SignalKind;
