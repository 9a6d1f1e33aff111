/*!
# Monitor Criteria

Criteria compiler for monitoring groups. Maps a [`GroupDescriptor`], an
optional free-text query and active facet filters into a
[`QueryCriteria`]:

1. **Baseline**: spiked-item handling, private drafts, `takes` packages
2. **Kind predicates**: stage, desk output, sent/scheduled output, saved
   search, personal, spike and highlights scopes
3. **Facets**: required filters (type, profile, custom) and refinement
   post filters
4. **Free text**: a query string layered last; enables highlighting

The same module owns the per-kind relevance rule consulted by the update
coordinator and the preview-scope rule consulted before suppressing a
structural change.

[`GroupDescriptor`]: monitor_protocol::GroupDescriptor
[`QueryCriteria`]: monitor_protocol::QueryCriteria
*/

mod compiler;
mod error;
mod facets;
mod options;
mod scope;

pub use compiler::CriteriaCompiler;
pub use compiler::DEFAULT_WINDOW_SIZE;
pub use compiler::PUBLISHED_STATES;
pub use error::CompilationError;
pub use error::Result;
pub use options::CompilerOptions;
pub use scope::previews_group;
pub use scope::restrict_to_items;
