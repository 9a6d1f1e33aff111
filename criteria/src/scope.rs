use crate::compiler::CriteriaCompiler;
use monitor_protocol::ChangeSignal;
use monitor_protocol::GroupDescriptor;
use monitor_protocol::GroupKind;
use monitor_protocol::ID_FIELD;
use monitor_protocol::ItemId;
use monitor_protocol::Predicate;
use monitor_protocol::PreviewItem;
use monitor_protocol::QueryCriteria;

impl CriteriaCompiler {
    /// Kind rule deciding whether a change may affect the group.
    ///
    /// Kinds without a way to tell always answer `true`.
    pub fn should_update(&self, descriptor: &GroupDescriptor, signal: &ChangeSignal) -> bool {
        match descriptor.kind() {
            GroupKind::Stage { stage } => signal.touches_stage(stage),
            GroupKind::Personal | GroupKind::PersonalSent => {
                signal.user.as_ref() == Some(self.identity())
            }
            GroupKind::DeskOutput { desk, .. }
            | GroupKind::SentOutput { desk }
            | GroupKind::ScheduledOutput { desk } => signal.touches_desk(desk),
            GroupKind::SavedSearch { .. }
            | GroupKind::Spike { .. }
            | GroupKind::SpikePersonal
            | GroupKind::Highlights { .. } => true,
        }
    }
}

/// Whether the item open in preview belongs to the group's scope.
pub fn previews_group(descriptor: &GroupDescriptor, preview: &PreviewItem) -> bool {
    match descriptor.kind() {
        GroupKind::Stage { stage } => preview.stage.as_ref() == Some(stage),
        GroupKind::DeskOutput { desk, .. }
        | GroupKind::SentOutput { desk }
        | GroupKind::ScheduledOutput { desk }
        | GroupKind::Spike { desk } => preview.desk.as_ref() == Some(desk),
        GroupKind::Highlights { highlight } => preview.highlights.contains(highlight),
        GroupKind::SavedSearch { .. } => true,
        GroupKind::Personal | GroupKind::PersonalSent | GroupKind::SpikePersonal => {
            preview.desk.is_none()
        }
    }
}

/// Keeps the group criteria but narrows it to `ids`, fetching all of them
/// in one page.
pub fn restrict_to_items(criteria: &QueryCriteria, ids: &[ItemId]) -> QueryCriteria {
    let mut restricted = criteria.clone();
    restricted
        .filters
        .push(Predicate::terms(ID_FIELD, ids.iter().map(ItemId::as_str)));
    restricted.with_window(0, ids.len().max(1))
}
