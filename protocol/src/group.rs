use crate::criteria::Repository;
use crate::criteria::SortOption;
use crate::criteria::SpikeMode;
use crate::ids::DeskId;
use crate::ids::GroupId;
use crate::ids::HighlightId;
use crate::ids::StageId;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use strum_macros::Display;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeskType {
    #[default]
    Authoring,
    Production,
}

/// Filter stored with a saved search.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSearch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Repositories the search targets; empty means the configured default.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repos: Vec<Repository>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spike: Option<SpikeMode>,
    /// Stored parameter filters, `field -> accepted values`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub terms: BTreeMap<String, Vec<String>>,
}

impl SavedSearch {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_repos(mut self, repos: impl IntoIterator<Item = Repository>) -> Self {
        self.repos = repos.into_iter().collect();
        self
    }

    pub fn with_term<I, S>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terms
            .insert(field.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the search runs against `repo`. A search without stored
    /// repositories runs against all of them.
    pub fn targets(&self, repo: Repository) -> bool {
        self.repos.is_empty() || self.repos.contains(&repo)
    }
}

/// What a monitoring list shows. Each variant carries only the scope it
/// needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupKind {
    Stage {
        stage: StageId,
    },
    DeskOutput {
        desk: DeskId,
        #[serde(default)]
        desk_type: DeskType,
    },
    SentOutput {
        desk: DeskId,
    },
    ScheduledOutput {
        desk: DeskId,
    },
    SavedSearch {
        search: SavedSearch,
    },
    Personal,
    PersonalSent,
    Spike {
        desk: DeskId,
    },
    SpikePersonal,
    Highlights {
        highlight: HighlightId,
    },
}

impl GroupKind {
    pub fn name(&self) -> &'static str {
        match self {
            GroupKind::Stage { .. } => "stage",
            GroupKind::DeskOutput { .. } => "desk_output",
            GroupKind::SentOutput { .. } => "sent_output",
            GroupKind::ScheduledOutput { .. } => "scheduled_output",
            GroupKind::SavedSearch { .. } => "saved_search",
            GroupKind::Personal => "personal",
            GroupKind::PersonalSent => "personal_sent",
            GroupKind::Spike { .. } => "spike",
            GroupKind::SpikePersonal => "spike_personal",
            GroupKind::Highlights { .. } => "highlights",
        }
    }

    pub fn stage(&self) -> Option<&StageId> {
        match self {
            GroupKind::Stage { stage } => Some(stage),
            _ => None,
        }
    }

    pub fn desk(&self) -> Option<&DeskId> {
        match self {
            GroupKind::DeskOutput { desk, .. }
            | GroupKind::SentOutput { desk }
            | GroupKind::ScheduledOutput { desk }
            | GroupKind::Spike { desk } => Some(desk),
            _ => None,
        }
    }
}

/// Facet name -> accepted values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacetFilters(BTreeMap<String, BTreeSet<String>>);

impl FacetFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, S>(&mut self, facet: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(facet.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
    }

    pub fn get(&self, facet: &str) -> Option<&BTreeSet<String>> {
        self.0.get(facet)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Layers `other` on top of `self`; values of a shared facet are unioned.
    pub fn merged(&self, other: &FacetFilters) -> FacetFilters {
        let mut out = self.clone();
        for (facet, values) in other.iter() {
            out.insert(facet.clone(), values.iter().cloned());
        }
        out
    }
}

/// Identifies what a monitoring list shows.
///
/// The kind is fixed at construction: it decides both the predicates and
/// the backend routing, so switching it means building a new descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    id: GroupId,
    #[serde(flatten)]
    kind: GroupKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    #[serde(default, skip_serializing_if = "FacetFilters::is_empty")]
    facets: FacetFilters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    window_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sort: Option<SortOption>,
}

impl GroupDescriptor {
    pub fn new(id: impl Into<GroupId>, kind: GroupKind) -> Self {
        Self {
            id: id.into(),
            kind,
            query: None,
            facets: FacetFilters::default(),
            window_size: None,
            sort: None,
        }
    }

    pub fn stage(stage: impl Into<StageId>) -> Self {
        let stage = stage.into();
        Self::new(stage.to_string(), GroupKind::Stage { stage })
    }

    pub fn desk_output(desk: impl Into<DeskId>, desk_type: DeskType) -> Self {
        let desk = desk.into();
        Self::new(
            format!("{desk}:output"),
            GroupKind::DeskOutput { desk, desk_type },
        )
    }

    pub fn sent_output(desk: impl Into<DeskId>) -> Self {
        let desk = desk.into();
        Self::new(format!("{desk}:sent"), GroupKind::SentOutput { desk })
    }

    pub fn scheduled_output(desk: impl Into<DeskId>) -> Self {
        let desk = desk.into();
        Self::new(
            format!("{desk}:scheduled"),
            GroupKind::ScheduledOutput { desk },
        )
    }

    pub fn saved_search(id: impl Into<GroupId>, search: SavedSearch) -> Self {
        Self::new(id, GroupKind::SavedSearch { search })
    }

    pub fn personal() -> Self {
        Self::new("personal", GroupKind::Personal)
    }

    pub fn personal_sent() -> Self {
        Self::new("personal:sent", GroupKind::PersonalSent)
    }

    pub fn spike(desk: impl Into<DeskId>) -> Self {
        let desk = desk.into();
        Self::new(format!("{desk}:spike"), GroupKind::Spike { desk })
    }

    pub fn spike_personal() -> Self {
        Self::new("personal:spike", GroupKind::SpikePersonal)
    }

    pub fn highlights(highlight: impl Into<HighlightId>) -> Self {
        let highlight = highlight.into();
        Self::new(
            format!("highlights:{highlight}"),
            GroupKind::Highlights { highlight },
        )
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_facet<I, S>(mut self, facet: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.facets.insert(facet, values);
        self
    }

    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = Some(size);
        self
    }

    pub fn with_sort(mut self, sort: SortOption) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    pub fn kind(&self) -> &GroupKind {
        &self.kind
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.trim().is_empty())
    }

    pub fn facets(&self) -> &FacetFilters {
        &self.facets
    }

    /// Configured window size, falling back to `default` when unset.
    pub fn window_size_or(&self, default: usize) -> usize {
        self.window_size.unwrap_or(default)
    }

    pub fn window_size(&self) -> Option<usize> {
        self.window_size
    }

    pub fn sort(&self) -> Option<&SortOption> {
        self.sort.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn output_groups_use_desk_scoped_ids() {
        let group = GroupDescriptor::desk_output("sports", DeskType::Production);
        assert_eq!(group.id().as_str(), "sports:output");
        assert_eq!(group.kind().desk(), Some(&DeskId::new("sports")));
        assert_eq!(group.kind().name(), "desk_output");
    }

    #[test]
    fn stage_groups_are_named_after_their_stage() {
        let group = GroupDescriptor::stage("s1");
        assert_eq!(group.id().as_str(), "s1");
        assert_eq!(group.kind().stage(), Some(&StageId::new("s1")));
    }

    #[test]
    fn descriptor_round_trips_with_flattened_kind() {
        let group = GroupDescriptor::saved_search(
            "search-1",
            SavedSearch::default()
                .with_query("flood")
                .with_repos([Repository::Ingest]),
        )
        .with_window_size(10);
        let json = serde_json::to_value(&group).expect("serialize descriptor");
        assert_eq!(json["kind"], "saved_search");
        assert_eq!(json["search"]["query"], "flood");
        let back: GroupDescriptor = serde_json::from_value(json).expect("deserialize descriptor");
        assert_eq!(back, group);
    }

    #[test]
    fn blank_query_is_treated_as_absent() {
        let group = GroupDescriptor::personal().with_query("   ");
        assert_eq!(group.query(), None);
    }

    #[test]
    fn merged_facets_union_values() {
        let mut base = FacetFilters::new();
        base.insert("type", ["text"]);
        let mut extra = FacetFilters::new();
        extra.insert("type", ["picture"]);
        extra.insert("urgency", ["1"]);
        let merged = base.merged(&extra);
        assert_eq!(merged.get("type").map(BTreeSet::len), Some(2));
        assert_eq!(merged.get("urgency").map(BTreeSet::len), Some(1));
    }
}
