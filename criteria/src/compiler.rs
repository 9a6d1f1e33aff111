use crate::error::CompilationError;
use crate::error::Result;
use crate::facets::layer_facets;
use crate::options::CompilerOptions;
use monitor_protocol::DeskId;
use monitor_protocol::DeskType;
use monitor_protocol::FacetFilters;
use monitor_protocol::GroupDescriptor;
use monitor_protocol::GroupKind;
use monitor_protocol::Predicate;
use monitor_protocol::QueryCriteria;
use monitor_protocol::Repository;
use monitor_protocol::Routing;
use monitor_protocol::SavedSearch;
use monitor_protocol::SpikeMode;
use monitor_protocol::UserId;
use tracing::debug;

/// Window size used when neither the descriptor nor the caller sets one.
pub const DEFAULT_WINDOW_SIZE: usize = 25;

/// Publication states shown in a desk's output.
pub const PUBLISHED_STATES: &[&str] = &["scheduled", "published", "corrected", "killed"];

const STATE_FIELD: &str = "state";
const SPIKED_STATE: &str = "spiked";
const SCHEDULED_STATE: &str = "scheduled";
const UNPUBLISHED_STATE: &str = "unpublished";

/// Translates group descriptors into backend-agnostic query criteria.
///
/// The compiler is bound to one identity because personal scopes and the
/// draft-visibility baseline depend on who is looking.
#[derive(Debug, Clone)]
pub struct CriteriaCompiler {
    options: CompilerOptions,
    identity: UserId,
    default_window_size: usize,
}

impl CriteriaCompiler {
    pub fn new(options: CompilerOptions, identity: impl Into<UserId>) -> Self {
        Self {
            options,
            identity: identity.into(),
            default_window_size: DEFAULT_WINDOW_SIZE,
        }
    }

    pub fn with_default_window_size(mut self, size: usize) -> Self {
        self.default_window_size = size;
        self
    }

    pub fn identity(&self) -> &UserId {
        &self.identity
    }

    pub fn default_window_size(&self) -> usize {
        self.default_window_size
    }

    /// Compiles a descriptor with its own facets and no extra free text.
    pub fn compile_group(&self, descriptor: &GroupDescriptor) -> Result<QueryCriteria> {
        self.compile(descriptor, None, &FacetFilters::default())
    }

    /// Builds the criteria for `descriptor`.
    ///
    /// Kind predicates come first, then the descriptor's facets merged with
    /// `facets`, then `free_text`. Nothing layered on top replaces a kind
    /// predicate.
    pub fn compile(
        &self,
        descriptor: &GroupDescriptor,
        free_text: Option<&str>,
        facets: &FacetFilters,
    ) -> Result<QueryCriteria> {
        self.options.validate().map_err(CompilationError::Config)?;
        validate_descriptor(descriptor)?;

        let size = descriptor.window_size_or(self.default_window_size);
        if size == 0 {
            return Err(CompilationError::InvalidWindowSize);
        }

        let kind = descriptor.kind();
        let mut filters = baseline_predicates(spike_mode(kind), &self.identity);
        filters.extend(self.kind_predicates(kind));

        if let GroupKind::SavedSearch { search } = kind {
            filters.extend(saved_search_terms(search));
        }

        let facets = descriptor.facets().merged(facets);
        let layered = layer_facets(&facets)?;
        filters.extend(layered.filters);
        let mut post_filters = layered.post_filters;

        let free_text = free_text.map(str::trim).filter(|text| !text.is_empty());
        if let Some(text) = free_text {
            filters.push(Predicate::query_string(text));
        }

        match kind {
            GroupKind::DeskOutput { .. } => {
                filters.push(Predicate::not(Predicate::term(
                    STATE_FIELD,
                    UNPUBLISHED_STATE,
                )));
                if self.options.hide_previous_versions_in_output {
                    filters.push(hide_previous_versions());
                }
            }
            GroupKind::Highlights { .. } => post_filters.push(latest_published_only()),
            _ => {}
        }

        let query = combined_query(descriptor);
        let highlight =
            self.options.elastic_highlight && (query.is_some() || free_text.is_some());
        let criteria = QueryCriteria {
            filters,
            post_filters,
            query,
            sort: descriptor
                .sort()
                .cloned()
                .unwrap_or_else(|| self.options.default_sort.clone()),
            from: 0,
            size,
            highlight,
            routing: self.routing(kind),
        };

        debug!(
            group = %descriptor.id(),
            kind = kind.name(),
            filters = criteria.filters.len(),
            post_filters = criteria.post_filters.len(),
            size,
            "compiled group criteria"
        );
        Ok(criteria)
    }

    fn kind_predicates(&self, kind: &GroupKind) -> Vec<Predicate> {
        let identity = self.identity.as_str();
        match kind {
            GroupKind::Stage { stage } => vec![Predicate::term("task.stage", stage.as_str())],
            GroupKind::DeskOutput { desk, desk_type } => {
                let must = Predicate::and(vec![
                    Predicate::term("task.desk", desk.as_str()),
                    Predicate::terms(STATE_FIELD, self.output_states()),
                ]);
                match desk_type {
                    DeskType::Authoring => vec![Predicate::or(vec![
                        Predicate::term("task.last_authoring_desk", desk.as_str()),
                        must,
                    ])],
                    DeskType::Production => vec![must],
                }
            }
            GroupKind::SentOutput { desk } => vec![
                Predicate::term("task.desk_history", desk.as_str()),
                Predicate::not(Predicate::term("task.desk", desk.as_str())),
            ],
            GroupKind::ScheduledOutput { desk } => vec![
                Predicate::term("task.desk", desk.as_str()),
                Predicate::term(STATE_FIELD, SCHEDULED_STATE),
            ],
            GroupKind::SavedSearch { .. } => Vec::new(),
            GroupKind::Personal | GroupKind::SpikePersonal => vec![
                Predicate::term("original_creator", identity),
                Predicate::not(Predicate::exists("task.desk")),
            ],
            GroupKind::PersonalSent => vec![
                Predicate::term("original_creator", identity),
                Predicate::exists("task.desk"),
            ],
            GroupKind::Spike { desk } => vec![Predicate::term("task.desk", desk.as_str())],
            GroupKind::Highlights { highlight } => {
                vec![Predicate::term("highlights", highlight.as_str())]
            }
        }
    }

    fn output_states(&self) -> Vec<&'static str> {
        PUBLISHED_STATES
            .iter()
            .copied()
            .filter(|state| !(self.options.scheduled_output_separate && *state == SCHEDULED_STATE))
            .collect()
    }

    fn routing(&self, kind: &GroupKind) -> Routing {
        match kind {
            GroupKind::SavedSearch { search } if !search.repos.is_empty() => {
                routing_for(&search.repos)
            }
            GroupKind::SavedSearch { .. } => routing_for(&self.options.default_repos),
            GroupKind::DeskOutput { .. }
            | GroupKind::ScheduledOutput { .. }
            | GroupKind::Highlights { .. } => {
                Routing::FanOut(vec![Repository::Archive, Repository::Published])
            }
            _ => Routing::Single(Repository::Archive),
        }
    }
}

fn validate_descriptor(descriptor: &GroupDescriptor) -> Result<()> {
    if descriptor.id().is_blank() {
        return Err(CompilationError::EmptyGroupId);
    }

    let kind = descriptor.kind();
    let scope_is_blank = match kind {
        GroupKind::Stage { stage } => stage.is_blank(),
        GroupKind::Highlights { highlight } => highlight.is_blank(),
        other => other.desk().is_some_and(DeskId::is_blank),
    };
    if scope_is_blank {
        return Err(CompilationError::EmptyScopeId { kind: kind.name() });
    }

    if descriptor.window_size() == Some(0) {
        return Err(CompilationError::InvalidWindowSize);
    }

    Ok(())
}

fn spike_mode(kind: &GroupKind) -> SpikeMode {
    match kind {
        GroupKind::Spike { .. } | GroupKind::SpikePersonal => SpikeMode::Only,
        GroupKind::PersonalSent => SpikeMode::Include,
        GroupKind::SavedSearch { search } => search.spike.unwrap_or_default(),
        _ => SpikeMode::Exclude,
    }
}

/// Predicates applied to every group regardless of kind.
fn baseline_predicates(spike: SpikeMode, identity: &UserId) -> Vec<Predicate> {
    let mut filters = Vec::with_capacity(3);
    match spike {
        SpikeMode::Exclude => filters.push(Predicate::not(Predicate::term(
            STATE_FIELD,
            SPIKED_STATE,
        ))),
        SpikeMode::Only => filters.push(Predicate::term(STATE_FIELD, SPIKED_STATE)),
        SpikeMode::Include => {}
    }
    // Drafts in someone else's personal space stay private.
    filters.push(Predicate::or(vec![
        Predicate::exists("task.desk"),
        Predicate::term("task.user", identity.as_str()),
    ]));
    filters.push(Predicate::not(Predicate::term("package_type", "takes")));
    filters
}

fn saved_search_terms(search: &SavedSearch) -> Vec<Predicate> {
    search
        .terms
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(field, values)| Predicate::terms(field.as_str(), values.iter().map(String::as_str)))
        .collect()
}

/// The saved search's stored query is always kept; the group query is
/// conjoined in front of it.
fn combined_query(descriptor: &GroupDescriptor) -> Option<String> {
    let group_query = descriptor.query();
    match descriptor.kind() {
        GroupKind::SavedSearch { search } => {
            let stored = search
                .query
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty());
            match (group_query, stored) {
                (Some(group), Some(stored)) => Some(format!("({group}) {stored}")),
                (Some(group), None) => Some(format!("({group})")),
                (None, Some(stored)) => Some(stored.to_string()),
                (None, None) => None,
            }
        }
        _ => group_query.map(str::to_string),
    }
}

fn hide_previous_versions() -> Predicate {
    Predicate::not(Predicate::or(vec![
        Predicate::term("last_published_version", false),
        Predicate::exists("rewritten_by"),
    ]))
}

/// Unpublished items pass; published copies pass only as the latest version.
fn latest_published_only() -> Predicate {
    Predicate::or(vec![
        Predicate::not(Predicate::exists("last_published_version")),
        Predicate::term("last_published_version", true),
    ])
}

fn routing_for(repos: &[Repository]) -> Routing {
    match repos {
        [single] => Routing::Single(*single),
        many => Routing::FanOut(many.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_protocol::SortDirection;
    use monitor_protocol::SortOption;
    use monitor_protocol::facet;
    use pretty_assertions::assert_eq;
    use serde_json::Map;
    use serde_json::Value;
    use serde_json::json;

    fn compiler() -> CriteriaCompiler {
        CriteriaCompiler::new(CompilerOptions::default(), "me")
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn count_field(criteria: &QueryCriteria, field: &str) -> usize {
        criteria
            .filters
            .iter()
            .flat_map(Predicate::nodes)
            .filter(|node| node.field() == Some(field))
            .count()
    }

    #[test]
    fn stage_requires_exactly_one_stage_predicate_and_no_desk_term() {
        let criteria = compiler()
            .compile_group(&GroupDescriptor::stage("s1"))
            .expect("compile");
        let stage_terms: Vec<&Predicate> = criteria
            .filters
            .iter()
            .filter(|p| matches!(p, Predicate::Term { field, .. } if field == "task.stage"))
            .collect();
        assert_eq!(stage_terms, vec![&Predicate::term("task.stage", "s1")]);
        let desk_terms = criteria
            .filters
            .iter()
            .flat_map(Predicate::nodes)
            .filter(|node| matches!(node, Predicate::Term { field, .. } if field == "task.desk"))
            .count();
        assert_eq!(desk_terms, 0);
        assert_eq!(criteria.routing, Routing::Single(Repository::Archive));
        assert_eq!(criteria.size, DEFAULT_WINDOW_SIZE);
        assert!(!criteria.highlight);
    }

    #[test]
    fn authoring_desk_output_has_last_authoring_branch() {
        let criteria = compiler()
            .compile_group(&GroupDescriptor::desk_output("news", DeskType::Authoring))
            .expect("compile");
        assert_eq!(count_field(&criteria, "task.last_authoring_desk"), 1);
        let has_or = criteria.filters.iter().any(|p| {
            matches!(p, Predicate::Or { predicates } if predicates.contains(&Predicate::term("task.last_authoring_desk", "news")))
        });
        assert!(has_or);
        assert_eq!(
            criteria.routing,
            Routing::FanOut(vec![Repository::Archive, Repository::Published])
        );
    }

    #[test]
    fn production_desk_output_has_no_disjunction_beyond_baseline() {
        let compiler = compiler();
        let production = compiler
            .compile_group(&GroupDescriptor::desk_output("news", DeskType::Production))
            .expect("compile");
        let stage = compiler
            .compile_group(&GroupDescriptor::stage("s1"))
            .expect("compile");
        let disjunctions = |criteria: &QueryCriteria| {
            criteria
                .filters
                .iter()
                .flat_map(Predicate::nodes)
                .filter(|node| matches!(node, Predicate::Or { .. }))
                .count()
        };
        assert_eq!(disjunctions(&production), disjunctions(&stage));
        assert_eq!(count_field(&production, "task.last_authoring_desk"), 0);
    }

    #[test]
    fn desk_output_states_respect_scheduled_option() {
        let separate = CriteriaCompiler::new(
            CompilerOptions {
                scheduled_output_separate: true,
                ..CompilerOptions::default()
            },
            "me",
        );
        let criteria = separate
            .compile_group(&GroupDescriptor::desk_output("news", DeskType::Production))
            .expect("compile");
        let states = criteria
            .filters
            .iter()
            .flat_map(Predicate::nodes)
            .find_map(|node| match node {
                Predicate::Terms { field, values } if field == STATE_FIELD => Some(values.clone()),
                _ => None,
            })
            .unwrap_or_default();
        assert_eq!(
            states,
            vec![json!("published"), json!("corrected"), json!("killed")]
        );
        assert!(
            criteria
                .filters
                .contains(&Predicate::not(Predicate::term(STATE_FIELD, UNPUBLISHED_STATE)))
        );
    }

    #[test]
    fn sent_output_requires_history_but_not_current_desk() {
        let criteria = compiler()
            .compile_group(&GroupDescriptor::sent_output("news"))
            .expect("compile");
        let passed_through = fields(json!({
            "task": {"desk": "sports", "desk_history": ["news", "sports"]},
            "state": "in_progress",
        }));
        let still_here = fields(json!({
            "task": {"desk": "news", "desk_history": ["news"]},
            "state": "in_progress",
        }));
        assert!(criteria.matches_primary(&passed_through));
        assert!(!criteria.matches_primary(&still_here));
    }

    #[test]
    fn spike_groups_select_only_spiked_items() {
        let criteria = compiler()
            .compile_group(&GroupDescriptor::spike("news"))
            .expect("compile");
        let spiked = fields(json!({"task": {"desk": "news"}, "state": "spiked"}));
        let live = fields(json!({"task": {"desk": "news"}, "state": "in_progress"}));
        assert!(criteria.matches_primary(&spiked));
        assert!(!criteria.matches_primary(&live));
    }

    #[test]
    fn personal_and_personal_sent_split_on_desk_task() {
        let compiler = compiler();
        let personal = compiler
            .compile_group(&GroupDescriptor::personal())
            .expect("compile");
        let sent = compiler
            .compile_group(&GroupDescriptor::personal_sent())
            .expect("compile");
        let draft = fields(json!({"original_creator": "me", "task": {"user": "me"}}));
        let handed_over = fields(json!({
            "original_creator": "me",
            "task": {"desk": "news"},
            "state": "spiked",
        }));
        assert!(personal.matches_primary(&draft));
        assert!(!personal.matches_primary(&handed_over));
        assert!(sent.matches_primary(&handed_over));
        assert!(!sent.matches_primary(&draft));
    }

    #[test]
    fn other_users_drafts_are_excluded() {
        let criteria = compiler()
            .compile_group(&GroupDescriptor::saved_search("s", SavedSearch::default()))
            .expect("compile");
        let foreign_draft = fields(json!({"task": {"user": "someone-else"}}));
        let takes = fields(json!({"task": {"desk": "news"}, "package_type": "takes"}));
        assert!(!criteria.matches_primary(&foreign_draft));
        assert!(!criteria.matches_primary(&takes));
    }

    #[test]
    fn saved_search_query_is_conjoined_with_group_query() {
        let descriptor = GroupDescriptor::saved_search(
            "search",
            SavedSearch::default()
                .with_query("weather")
                .with_repos([Repository::Ingest])
                .with_term("urgency", ["1", "2"]),
        )
        .with_query("flood");
        let criteria = compiler().compile_group(&descriptor).expect("compile");
        assert_eq!(criteria.query.as_deref(), Some("(flood) weather"));
        assert!(criteria.highlight);
        assert_eq!(criteria.routing, Routing::Single(Repository::Ingest));
        assert!(
            criteria
                .filters
                .contains(&Predicate::terms("urgency", ["1", "2"]))
        );
    }

    #[test]
    fn saved_search_without_repos_fans_out_to_defaults() {
        let criteria = compiler()
            .compile_group(&GroupDescriptor::saved_search("s", SavedSearch::default()))
            .expect("compile");
        assert_eq!(criteria.routing.repositories().len(), 4);
        assert_eq!(criteria.query, None);
        assert!(!criteria.highlight);
    }

    #[test]
    fn free_text_is_layered_and_enables_highlight() {
        let criteria = compiler()
            .compile(
                &GroupDescriptor::stage("s1"),
                Some("  storm "),
                &FacetFilters::default(),
            )
            .expect("compile");
        assert!(criteria.highlight);
        assert_eq!(criteria.filters.last(), Some(&Predicate::query_string("storm")));
        assert!(criteria.filters.contains(&Predicate::term("task.stage", "s1")));
    }

    #[test]
    fn highlighting_follows_backend_switch() {
        let compiler = CriteriaCompiler::new(
            CompilerOptions {
                elastic_highlight: false,
                ..CompilerOptions::default()
            },
            "me",
        );
        let criteria = compiler
            .compile_group(&GroupDescriptor::stage("s1").with_query("storm"))
            .expect("compile");
        assert!(!criteria.highlight);
    }

    #[test]
    fn highlights_keep_latest_published_version_only() {
        let criteria = compiler()
            .compile_group(&GroupDescriptor::highlights("h1"))
            .expect("compile");
        let old = fields(json!({"last_published_version": false}));
        let latest = fields(json!({"last_published_version": true}));
        let draft = fields(json!({}));
        assert!(!criteria.matches_post_filters(&old));
        assert!(criteria.matches_post_filters(&latest));
        assert!(criteria.matches_post_filters(&draft));
    }

    #[test]
    fn hide_previous_versions_applies_to_desk_output() {
        let compiler = CriteriaCompiler::new(
            CompilerOptions {
                hide_previous_versions_in_output: true,
                ..CompilerOptions::default()
            },
            "me",
        );
        let criteria = compiler
            .compile_group(&GroupDescriptor::desk_output("news", DeskType::Production))
            .expect("compile");
        let rewritten = fields(json!({
            "task": {"desk": "news"},
            "state": "published",
            "rewritten_by": "other",
        }));
        let current = fields(json!({"task": {"desk": "news"}, "state": "published"}));
        assert!(!criteria.matches_primary(&rewritten));
        assert!(criteria.matches_primary(&current));
    }

    #[test]
    fn facets_never_replace_kind_predicates() {
        let descriptor = GroupDescriptor::stage("s1")
            .with_facet(facet::FILE_TYPE, ["text"])
            .with_facet("urgency", ["1"]);
        let criteria = compiler().compile_group(&descriptor).expect("compile");
        assert!(criteria.filters.contains(&Predicate::term("task.stage", "s1")));
        assert_eq!(criteria.post_filters, vec![Predicate::terms("urgency", ["1"])]);
    }

    #[test]
    fn custom_sort_and_window_size_override_defaults() {
        let descriptor = GroupDescriptor::stage("s1")
            .with_sort(SortOption::new("urgency", SortDirection::Asc))
            .with_window_size(10);
        let criteria = compiler().compile_group(&descriptor).expect("compile");
        assert_eq!(criteria.sort, SortOption::new("urgency", SortDirection::Asc));
        assert_eq!(criteria.size, 10);
        assert_eq!(criteria.from, 0);
    }

    #[test]
    fn malformed_descriptors_fail_fast() {
        let compiler = compiler();
        assert_eq!(
            compiler.compile_group(&GroupDescriptor::stage("")),
            Err(CompilationError::EmptyGroupId)
        );
        assert_eq!(
            compiler.compile_group(&GroupDescriptor::new(
                "x",
                GroupKind::Spike { desk: "".into() }
            )),
            Err(CompilationError::EmptyScopeId { kind: "spike" })
        );
        assert_eq!(
            compiler.compile_group(&GroupDescriptor::personal().with_window_size(0)),
            Err(CompilationError::InvalidWindowSize)
        );
    }
}
