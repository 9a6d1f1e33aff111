use crate::ids::DeskId;
use crate::ids::ItemId;
use crate::ids::StageId;
use crate::ids::UserId;
use serde::Deserialize;
use serde::Serialize;
use serde_with::skip_serializing_none;
use std::collections::BTreeSet;
use strum_macros::Display;
use strum_macros::EnumString;

/// Domain notification kinds that may require a monitoring list to refetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SignalKind {
    StageChanged,
    Moved,
    Fetched,
    Spiked,
    Unspiked,
    Published,
    ContentUpdate,
    Copied,
    Duplicated,
    Translated,
    Unlinked,
    HighlightsChanged,
    MarkedDesks,
    IngestUpdate,
}

impl SignalKind {
    /// Kinds that refresh every active group without a relevance check.
    pub fn is_unconditional(self) -> bool {
        matches!(
            self,
            SignalKind::StageChanged
                | SignalKind::Copied
                | SignalKind::Duplicated
                | SignalKind::Translated
                | SignalKind::Unlinked
                | SignalKind::HighlightsChanged
                | SignalKind::MarkedDesks
        )
    }
}

/// A change notification from the change feed.
///
/// Only the scope fields relevant to `kind` are populated; `stages` and
/// `desks` list every stage and desk touched by the change.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSignal {
    pub kind: SignalKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemId>,
    pub from_stage: Option<StageId>,
    pub to_stage: Option<StageId>,
    pub from_desk: Option<DeskId>,
    pub to_desk: Option<DeskId>,
    /// User who made the change.
    pub user: Option<UserId>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub stages: BTreeSet<StageId>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub desks: BTreeSet<DeskId>,
    /// Request a refresh that bypasses the "don't disturb" rule.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
}

impl ChangeSignal {
    pub fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
            from_stage: None,
            to_stage: None,
            from_desk: None,
            to_desk: None,
            user: None,
            stages: BTreeSet::new(),
            desks: BTreeSet::new(),
            force: false,
        }
    }

    pub fn with_item(mut self, id: impl Into<ItemId>) -> Self {
        self.items.push(id.into());
        self
    }

    pub fn with_stage(mut self, stage: impl Into<StageId>) -> Self {
        self.stages.insert(stage.into());
        self
    }

    pub fn with_desk(mut self, desk: impl Into<DeskId>) -> Self {
        self.desks.insert(desk.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<UserId>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Records a move between stages; both ends are also added to `stages`.
    pub fn moved_between_stages(
        mut self,
        from: impl Into<StageId>,
        to: impl Into<StageId>,
    ) -> Self {
        let from = from.into();
        let to = to.into();
        self.stages.insert(from.clone());
        self.stages.insert(to.clone());
        self.from_stage = Some(from);
        self.to_stage = Some(to);
        self
    }

    /// Records a move between desks; both ends are also added to `desks`.
    pub fn moved_between_desks(mut self, from: impl Into<DeskId>, to: impl Into<DeskId>) -> Self {
        let from = from.into();
        let to = to.into();
        self.desks.insert(from.clone());
        self.desks.insert(to.clone());
        self.from_desk = Some(from);
        self.to_desk = Some(to);
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// Whether the stage appears anywhere in the signal's scope.
    pub fn touches_stage(&self, stage: &StageId) -> bool {
        self.stages.contains(stage)
            || self.from_stage.as_ref() == Some(stage)
            || self.to_stage.as_ref() == Some(stage)
    }

    /// Whether the desk appears anywhere in the signal's scope.
    pub fn touches_desk(&self, desk: &DeskId) -> bool {
        self.desks.contains(desk)
            || self.from_desk.as_ref() == Some(desk)
            || self.to_desk.as_ref() == Some(desk)
    }
}
