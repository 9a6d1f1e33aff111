use crate::ids::DeskId;
use crate::ids::HighlightId;
use crate::ids::ItemId;
use crate::ids::StageId;
use crate::ids::UserId;
use serde::Deserialize;
use serde::Serialize;

/// The item open in the editor's preview pane.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewItem {
    pub id: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desk: Option<DeskId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<HighlightId>,
}

impl PreviewItem {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn on_stage(mut self, stage: impl Into<StageId>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn on_desk(mut self, desk: impl Into<DeskId>) -> Self {
        self.desk = Some(desk.into());
        self
    }

    pub fn in_highlight(mut self, highlight: impl Into<HighlightId>) -> Self {
        self.highlights.push(highlight.into());
        self
    }
}

/// Editor state consulted before replacing a visible list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub identity: UserId,
    /// Vertical scroll offset of the list; zero means scrolled to top.
    #[serde(default)]
    pub scroll_offset: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<PreviewItem>,
}

impl UserContext {
    pub fn new(identity: impl Into<UserId>) -> Self {
        Self {
            identity: identity.into(),
            ..Self::default()
        }
    }

    pub fn scrolled_to(mut self, offset: u32) -> Self {
        self.scroll_offset = offset;
        self
    }

    pub fn previewing(mut self, preview: PreviewItem) -> Self {
        self.preview = Some(preview);
        self
    }
}
