use async_trait::async_trait;
use monitor_protocol::GroupId;
use monitor_protocol::PreviewItem;
use monitor_protocol::QueryCriteria;
use monitor_protocol::QueryServiceError;
use monitor_protocol::ResultSnapshot;
use monitor_protocol::UserContext;
use monitor_protocol::UserId;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

/// Backend executing compiled criteria. Shared by every active group.
#[async_trait]
pub trait QueryService: Send + Sync {
    async fn execute(
        &self,
        criteria: &QueryCriteria,
    ) -> std::result::Result<ResultSnapshot, QueryServiceError>;
}

/// Read-only view of the editor state, consulted at reconciliation time.
pub trait UserContextSource: Send + Sync {
    fn identity(&self) -> UserId;

    fn current(&self, group: &GroupId) -> UserContext;
}

#[derive(Debug, Default)]
struct ContextState {
    preview: Option<PreviewItem>,
    scroll: HashMap<GroupId, u32>,
}

/// [`UserContextSource`] backed by state the rendering layer updates.
#[derive(Debug)]
pub struct SharedUserContext {
    identity: UserId,
    state: RwLock<ContextState>,
}

impl SharedUserContext {
    pub fn new(identity: impl Into<UserId>) -> Self {
        Self {
            identity: identity.into(),
            state: RwLock::new(ContextState::default()),
        }
    }

    pub fn set_preview(&self, preview: Option<PreviewItem>) {
        self.write().preview = preview;
    }

    pub fn set_scroll(&self, group: &GroupId, offset: u32) {
        self.write().scroll.insert(group.clone(), offset);
    }

    fn read(&self) -> RwLockReadGuard<'_, ContextState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ContextState> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl UserContextSource for SharedUserContext {
    fn identity(&self) -> UserId {
        self.identity.clone()
    }

    fn current(&self, group: &GroupId) -> UserContext {
        let state = self.read();
        UserContext {
            identity: self.identity.clone(),
            scroll_offset: state.scroll.get(group).copied().unwrap_or_default(),
            preview: state.preview.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scroll_offsets_are_per_group() {
        let context = SharedUserContext::new("me");
        let stage = GroupId::new("s1");
        context.set_scroll(&stage, 40);
        context.set_preview(Some(PreviewItem::new("a")));
        assert_eq!(context.current(&stage).scroll_offset, 40);
        assert_eq!(context.current(&GroupId::new("s2")).scroll_offset, 0);
        assert_eq!(
            context.current(&GroupId::new("s2")).preview,
            Some(PreviewItem::new("a"))
        );
    }
}
