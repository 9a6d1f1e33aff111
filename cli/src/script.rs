use anyhow::Context;
use anyhow::Result;
use monitor_coordinator::GroupHandle;
use monitor_coordinator::InMemoryQueryService;
use monitor_coordinator::MonitorRegistry;
use monitor_coordinator::Outcome;
use monitor_coordinator::SharedUserContext;
use monitor_protocol::ChangeSignal;
use monitor_protocol::GroupId;
use monitor_protocol::Item;
use monitor_protocol::ItemId;
use monitor_protocol::PreviewItem;
use monitor_protocol::QueryServiceError;
use monitor_protocol::Repository;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Item seeded into the in-memory store before a replay.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredItem {
    #[serde(default = "default_repo")]
    pub repo: Repository,
    pub item: Item,
}

fn default_repo() -> Repository {
    Repository::Archive
}

/// One step of a replay script.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Upsert {
        #[serde(default = "default_repo")]
        repo: Repository,
        item: Item,
    },
    Remove {
        id: ItemId,
    },
    Signal {
        signal: ChangeSignal,
    },
    /// Opens `item` in preview, or closes the preview when absent.
    Preview {
        #[serde(default)]
        item: Option<PreviewItem>,
    },
    Scroll {
        group: GroupId,
        offset: u32,
    },
    FailNext {
        message: String,
    },
    Refresh {
        group: GroupId,
    },
    ApplyPending {
        group: GroupId,
    },
    FetchNext {
        group: GroupId,
    },
    RefreshItem {
        group: GroupId,
        id: ItemId,
    },
    Wait {
        ms: u64,
    },
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Applies one step. Explicit requests wait for their outcome so later
/// steps observe it.
pub async fn apply_step(
    step: Step,
    registry: &MonitorRegistry,
    service: &InMemoryQueryService,
    context: &SharedUserContext,
) -> Result<Option<Outcome>> {
    debug!(?step, "replaying step");
    match step {
        Step::Upsert { repo, item } => service.upsert(repo, item),
        Step::Remove { id } => {
            service.remove(&id);
        }
        Step::Signal { signal } => registry.publish(signal).await,
        Step::Preview { item } => context.set_preview(item),
        Step::Scroll { group, offset } => context.set_scroll(&group, offset),
        Step::FailNext { message } => service.fail_next(QueryServiceError::Backend(message)),
        Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
        Step::Refresh { group } => {
            let handle = group_handle(registry, &group).await?;
            return Ok(Some(handle.refresh_now().await?));
        }
        Step::ApplyPending { group } => {
            let handle = group_handle(registry, &group).await?;
            return Ok(Some(handle.apply_pending().await?));
        }
        Step::FetchNext { group } => {
            let handle = group_handle(registry, &group).await?;
            return Ok(Some(handle.fetch_next().await?));
        }
        Step::RefreshItem { group, id } => {
            let handle = group_handle(registry, &group).await?;
            return Ok(Some(handle.refresh_item(id).await?));
        }
    }
    Ok(None)
}

async fn group_handle(
    registry: &MonitorRegistry,
    group: &GroupId,
) -> Result<Arc<GroupHandle>> {
    registry
        .group(group)
        .await
        .with_context(|| format!("group {group} is not configured"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_every_step_kind() {
        let steps: Vec<Step> = serde_json::from_str(
            r#"[
                {"step": "upsert", "item": {"id": "a", "fields": {"headline": "x"}}},
                {"step": "remove", "id": "a"},
                {"step": "signal", "signal": {"kind": "content_update", "stages": ["s1"]}},
                {"step": "preview", "item": {"id": "a", "stage": "s1"}},
                {"step": "preview"},
                {"step": "scroll", "group": "s1", "offset": 120},
                {"step": "fail_next", "message": "down"},
                {"step": "refresh", "group": "s1"},
                {"step": "apply_pending", "group": "s1"},
                {"step": "fetch_next", "group": "s1"},
                {"step": "refresh_item", "group": "s1", "id": "a"},
                {"step": "wait", "ms": 50}
            ]"#,
        )
        .expect("script parses");
        assert_eq!(steps.len(), 12);
        match &steps[0] {
            Step::Upsert { repo, item } => {
                assert_eq!(*repo, Repository::Archive);
                assert_eq!(item.key(), Some(&ItemId::new("a")));
            }
            other => panic!("unexpected step {other:?}"),
        }
        assert!(matches!(&steps[4], Step::Preview { item: None }));
    }

    #[test]
    fn unknown_steps_are_rejected() {
        let parsed: std::result::Result<Vec<Step>, _> =
            serde_json::from_str(r#"[{"step": "teleport"}]"#);
        assert!(parsed.is_err());
    }
}
