use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::error::Result;
use crate::event::MonitorEvent;
use crate::feed::ChangeFeed;
use crate::group::GroupHandle;
use crate::group::GroupServices;
use crate::service::QueryService;
use crate::service::UserContextSource;
use monitor_criteria::CriteriaCompiler;
use monitor_protocol::ChangeSignal;
use monitor_protocol::GroupDescriptor;
use monitor_protocol::GroupId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::Semaphore;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

type Groups = Arc<Mutex<HashMap<GroupId, Arc<GroupHandle>>>>;

/// Owns the active groups and fans change signals out to them.
///
/// Every group shares one query limiter, so the number of outstanding
/// queries stays bounded no matter how many groups a desk view opens.
pub struct MonitorRegistry {
    services: GroupServices,
    groups: Groups,
    shutdown: CancellationToken,
}

impl MonitorRegistry {
    pub fn new(
        config: MonitorConfig,
        service: Arc<dyn QueryService>,
        context: Arc<dyn UserContextSource>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<MonitorEvent>)> {
        config.validate().map_err(MonitorError::Config)?;
        let compiler = CriteriaCompiler::new(config.compiler.clone(), context.identity())
            .with_default_window_size(config.default_window_size);
        let (events, event_rx) = mpsc::unbounded_channel();
        let services = GroupServices {
            limiter: Arc::new(Semaphore::new(config.max_concurrent_queries)),
            config: Arc::new(config),
            compiler: Arc::new(compiler),
            service,
            context,
            events,
        };
        let registry = Self {
            services,
            groups: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        };
        Ok((registry, event_rx))
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.services.config
    }

    pub fn compiler(&self) -> &CriteriaCompiler {
        &self.services.compiler
    }

    /// Starts the group for `descriptor`, or swaps the descriptor of the
    /// group already active under the same id.
    ///
    /// The descriptor is compiled up front so a malformed one never
    /// becomes active.
    pub async fn activate(&self, descriptor: GroupDescriptor) -> Result<Arc<GroupHandle>> {
        self.services.compiler.compile_group(&descriptor)?;
        let mut groups = self.groups.lock().await;
        if let Some(existing) = groups.get(descriptor.id()).filter(|handle| handle.is_active()) {
            let existing = existing.clone();
            existing.replace_descriptor(descriptor)?;
            return Ok(existing);
        }

        let id = descriptor.id().clone();
        let handle = Arc::new(GroupHandle::spawn(
            descriptor,
            self.services.clone(),
            &self.shutdown,
        ));
        groups.insert(id.clone(), handle.clone());
        info!(group = %id, active = groups.len(), "activated group");
        Ok(handle)
    }

    /// Stops the group; in-flight responses for it are dropped.
    pub async fn deactivate(&self, id: &GroupId) -> bool {
        let removed = self.groups.lock().await.remove(id);
        match removed {
            Some(handle) => {
                handle.deactivate();
                info!(group = %id, "deactivated group");
                true
            }
            None => false,
        }
    }

    pub async fn deactivate_all(&self) {
        let drained: Vec<_> = self.groups.lock().await.drain().collect();
        for (id, handle) in drained {
            handle.deactivate();
            debug!(group = %id, "deactivated group");
        }
    }

    pub async fn group(&self, id: &GroupId) -> Option<Arc<GroupHandle>> {
        self.groups.lock().await.get(id).cloned()
    }

    pub async fn active_groups(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = self.groups.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Hands `signal` to every active group.
    pub async fn publish(&self, signal: ChangeSignal) {
        dispatch(&self.groups, signal).await;
    }

    /// Subscribes to `feed` and dispatches its signals until the registry
    /// is dropped.
    pub fn attach_feed(&self, feed: &ChangeFeed) {
        let mut rx = feed.subscribe();
        let groups = self.groups.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = rx.recv() => received,
                };
                match received {
                    Ok(signal) => dispatch(&groups, signal).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "change feed lagged; resyncing all groups");
                        let handles: Vec<_> = groups.lock().await.values().cloned().collect();
                        for handle in handles {
                            if let Err(err) = handle.resync() {
                                debug!(group = %handle.id(), error = %err, "skipping inactive group");
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("change feed detached");
        });
    }
}

impl Drop for MonitorRegistry {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn dispatch(groups: &Groups, signal: ChangeSignal) {
    let handles: Vec<_> = groups.lock().await.values().cloned().collect();
    debug!(kind = %signal.kind, groups = handles.len(), "dispatching change signal");
    for handle in handles {
        if let Err(err) = handle.on_change_signal(signal.clone()) {
            debug!(group = %handle.id(), error = %err, "skipping inactive group");
        }
    }
}
