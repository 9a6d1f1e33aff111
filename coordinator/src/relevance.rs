use monitor_criteria::CriteriaCompiler;
use monitor_protocol::ChangeSignal;
use monitor_protocol::GroupDescriptor;
use monitor_protocol::GroupKind;
use monitor_protocol::ItemId;
use monitor_protocol::Repository;
use monitor_protocol::SignalKind;
use monitor_reconcile::ResultWindow;

/// What a change signal means for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Relevance {
    Ignore,
    /// Refetch after the debounce interval; `gone` items are greyed out
    /// right away.
    Schedule { gone: Vec<ItemId> },
    /// Explicit user action: refetch now, replace wholesale.
    Force,
}

impl Relevance {
    fn schedule() -> Self {
        Relevance::Schedule { gone: Vec::new() }
    }
}

pub(crate) fn assess(
    compiler: &CriteriaCompiler,
    descriptor: &GroupDescriptor,
    window: Option<&ResultWindow>,
    signal: &ChangeSignal,
) -> Relevance {
    if signal.force {
        return Relevance::Force;
    }
    if signal.kind.is_unconditional() {
        return Relevance::schedule();
    }

    let kind = descriptor.kind();
    if signal.kind == SignalKind::IngestUpdate {
        let searches_ingest = matches!(
            kind,
            GroupKind::SavedSearch { search } if search.targets(Repository::Ingest)
        );
        let refresh_showing = window.is_some_and(|window| window.pending().is_some());
        return if searches_ingest && !refresh_showing {
            Relevance::schedule()
        } else {
            Relevance::Ignore
        };
    }

    let stage = kind.stage();
    if stage.is_some() && signal.from_stage.as_ref() == stage {
        return Relevance::Schedule {
            gone: signal.items.clone(),
        };
    }

    if let GroupKind::DeskOutput { desk, .. } = kind
        && (signal.from_desk.as_ref() == Some(desk) || signal.to_desk.as_ref() == Some(desk))
    {
        return Relevance::schedule();
    }

    if matches!(signal.kind, SignalKind::Spiked | SignalKind::Unspiked) {
        let shown: Vec<ItemId> = signal
            .items
            .iter()
            .filter(|id| window.is_some_and(|window| window.contains(id)))
            .cloned()
            .collect();
        if !shown.is_empty() {
            return Relevance::Schedule { gone: shown };
        }
    }

    if stage.is_some() && signal.to_stage.as_ref() == stage {
        return Relevance::schedule();
    }

    if compiler.should_update(descriptor, signal) {
        return Relevance::schedule();
    }

    Relevance::Ignore
}
