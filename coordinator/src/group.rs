use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::error::Result;
use crate::error::StaleWindowError;
use crate::event::MonitorEvent;
use crate::relevance::Relevance;
use crate::relevance::assess;
use crate::service::QueryService;
use crate::service::UserContextSource;
use monitor_criteria::CriteriaCompiler;
use monitor_criteria::previews_group;
use monitor_criteria::restrict_to_items;
use monitor_protocol::ChangeSignal;
use monitor_protocol::GroupDescriptor;
use monitor_protocol::GroupId;
use monitor_protocol::ItemId;
use monitor_protocol::QueryCriteria;
use monitor_protocol::QueryServiceError;
use monitor_protocol::ResultSnapshot;
use monitor_reconcile::ResultWindow;
use monitor_reconcile::Trigger;
use monitor_reconcile::ViewState;
use monitor_reconcile::WindowChange;
use monitor_reconcile::reconcile;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

/// Window after an explicit request, and whether a structural change is
/// being held back.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub window: ResultWindow,
    pub suppressed: bool,
}

/// Collaborators shared by every group of a registry.
#[derive(Clone)]
pub(crate) struct GroupServices {
    pub config: Arc<MonitorConfig>,
    pub compiler: Arc<CriteriaCompiler>,
    pub service: Arc<dyn QueryService>,
    pub context: Arc<dyn UserContextSource>,
    pub limiter: Arc<Semaphore>,
    pub events: mpsc::UnboundedSender<MonitorEvent>,
}

type Reply = oneshot::Sender<Result<Outcome>>;

enum Command {
    Signal(ChangeSignal),
    Resync,
    RefreshNow(Reply),
    ApplyPending(Reply),
    FetchNext(Reply),
    RefreshItem(ItemId, Reply),
    Window(oneshot::Sender<Option<ResultWindow>>),
    Replace(Box<GroupDescriptor>),
}

#[derive(Debug, Clone, PartialEq)]
enum FetchKind {
    /// Signal-driven refetch of the resident window.
    Soft(Trigger),
    /// Explicit refresh: default window size, replaced wholesale.
    Forced,
    NextPage,
    Item(ItemId),
}

struct FetchRequest {
    kind: FetchKind,
    reply: Option<Reply>,
}

struct InFlight {
    seq: u64,
    request: FetchRequest,
    task: JoinHandle<()>,
}

struct FetchDone {
    generation: u64,
    seq: u64,
    result: std::result::Result<ResultSnapshot, QueryServiceError>,
}

/// Handle to the task that owns one group's window.
///
/// Dropping the handle deactivates the group: pending and in-flight
/// queries are cancelled and no late response can reach the window.
pub struct GroupHandle {
    id: GroupId,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

impl GroupHandle {
    pub(crate) fn spawn(
        descriptor: GroupDescriptor,
        services: GroupServices,
        parent: &CancellationToken,
    ) -> Self {
        let id = descriptor.id().clone();
        let cancel = parent.child_token();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let task = GroupTask {
            descriptor,
            services,
            window: None,
            generation: 0,
            next_seq: 0,
            in_flight: None,
            queue: VecDeque::new(),
            wants_refetch: false,
            rerun_after_flight: false,
            soft_trigger: Trigger::soft(),
            done_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run(command_rx, done_rx));
        Self {
            id,
            commands,
            cancel,
        }
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.commands.is_closed()
    }

    /// Feeds a change signal through the relevance filter. The outcome is
    /// reported through [`MonitorEvent`]s.
    pub fn on_change_signal(&self, signal: ChangeSignal) -> Result<()> {
        self.send(Command::Signal(signal))
    }

    /// Schedules a debounced refetch without a specific signal, e.g. after
    /// the change feed dropped messages.
    pub fn resync(&self) -> Result<()> {
        self.send(Command::Resync)
    }

    /// Forced refresh: refetches the default window size, replaces the
    /// window and withdraws any refresh affordance.
    pub async fn refresh_now(&self) -> Result<Outcome> {
        self.ask(Command::RefreshNow).await
    }

    /// Applies the parked snapshot without refetching.
    pub async fn apply_pending(&self) -> Result<Outcome> {
        self.ask(Command::ApplyPending).await
    }

    /// Appends the next page after the window's tail.
    pub async fn fetch_next(&self) -> Result<Outcome> {
        self.ask(Command::FetchNext).await
    }

    /// Refetches one item with the group criteria and patches it in place.
    pub async fn refresh_item(&self, id: ItemId) -> Result<Outcome> {
        self.ask(|reply| Command::RefreshItem(id, reply)).await
    }

    pub async fn window(&self) -> Result<Option<ResultWindow>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Window(tx))?;
        rx.await.map_err(|_| MonitorError::Deactivated(self.id.clone()))
    }

    /// Swaps the descriptor of this group. The window is discarded and any
    /// response still in flight for the old descriptor becomes stale.
    pub fn replace_descriptor(&self, descriptor: GroupDescriptor) -> Result<()> {
        if descriptor.id() != &self.id {
            return Err(MonitorError::Config(format!(
                "descriptor {} cannot replace group {}",
                descriptor.id(),
                self.id
            )));
        }
        self.send(Command::Replace(Box::new(descriptor)))
    }

    pub fn deactivate(&self) {
        self.cancel.cancel();
    }

    fn send(&self, command: Command) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MonitorError::Deactivated(self.id.clone()));
        }
        self.commands
            .send(command)
            .map_err(|_| MonitorError::Deactivated(self.id.clone()))
    }

    async fn ask(&self, make: impl FnOnce(Reply) -> Command) -> Result<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))?;
        rx.await
            .map_err(|_| MonitorError::Deactivated(self.id.clone()))?
    }
}

impl Drop for GroupHandle {
    fn drop(&mut self) {
        self.deactivate();
    }
}

struct GroupTask {
    descriptor: GroupDescriptor,
    services: GroupServices,
    window: Option<ResultWindow>,
    /// Bumped whenever the descriptor changes; responses carry the value
    /// they were issued under.
    generation: u64,
    next_seq: u64,
    in_flight: Option<InFlight>,
    queue: VecDeque<FetchRequest>,
    /// A debounced soft refetch is wanted.
    wants_refetch: bool,
    /// The debounce fired while a query was in flight.
    rerun_after_flight: bool,
    soft_trigger: Trigger,
    done_tx: mpsc::UnboundedSender<FetchDone>,
    cancel: CancellationToken,
}

impl GroupTask {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut done_rx: mpsc::UnboundedReceiver<FetchDone>,
    ) {
        info!(group = %self.descriptor.id(), kind = self.descriptor.kind().name(), "group activated");
        let cancel = self.cancel.clone();
        let debounce = self.services.config.debounce();
        let mut timer: Option<Pin<Box<Sleep>>> = None;

        self.request(FetchRequest {
            kind: FetchKind::Forced,
            reply: None,
        });

        loop {
            // The timer starts with the first relevant signal and is never
            // pushed back by later ones.
            if !self.wants_refetch {
                timer = None;
            } else if timer.is_none() {
                debug!(group = %self.descriptor.id(), "refetch scheduled");
                timer = Some(Box::pin(sleep(debounce)));
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                maybe = commands.recv() => {
                    let Some(command) = maybe else { break; };
                    self.handle_command(command);
                }
                Some(done) = done_rx.recv() => self.handle_done(done),
                _ = async {
                    if let Some(timer) = &mut timer {
                        timer.await;
                    }
                }, if timer.is_some() => {
                    timer = None;
                    self.wants_refetch = false;
                    self.on_debounce_elapsed();
                }
            }
        }

        self.shutdown();
        info!(group = %self.descriptor.id(), "group deactivated");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Signal(signal) => self.on_signal(signal),
            Command::Resync => self.wants_refetch = true,
            Command::RefreshNow(reply) => self.request(FetchRequest {
                kind: FetchKind::Forced,
                reply: Some(reply),
            }),
            Command::ApplyPending(reply) => self.apply_pending(reply),
            Command::FetchNext(reply) => self.request(FetchRequest {
                kind: FetchKind::NextPage,
                reply: Some(reply),
            }),
            Command::RefreshItem(id, reply) => self.request(FetchRequest {
                kind: FetchKind::Item(id),
                reply: Some(reply),
            }),
            Command::Window(reply) => {
                let _ = reply.send(self.window.clone());
            }
            Command::Replace(descriptor) => self.replace(*descriptor),
        }
    }

    fn on_signal(&mut self, signal: ChangeSignal) {
        let relevance = assess(
            &self.services.compiler,
            &self.descriptor,
            self.window.as_ref(),
            &signal,
        );
        match relevance {
            Relevance::Ignore => {
                debug!(group = %self.descriptor.id(), kind = %signal.kind, "signal ignored");
            }
            Relevance::Force => self.request(FetchRequest {
                kind: FetchKind::Forced,
                reply: None,
            }),
            Relevance::Schedule { gone } => {
                if !gone.is_empty()
                    && let Some(window) = self.window.as_mut()
                    && window.mark_gone(&gone) > 0
                {
                    let window = window.clone();
                    self.emit_window(window, false);
                }
                if signal.user.as_ref() == Some(self.services.compiler.identity()) {
                    self.soft_trigger.own_change = true;
                }
                self.wants_refetch = true;
            }
        }
    }

    fn on_debounce_elapsed(&mut self) {
        if self.in_flight.is_some() {
            self.rerun_after_flight = true;
            return;
        }
        let trigger = std::mem::take(&mut self.soft_trigger);
        self.request(FetchRequest {
            kind: FetchKind::Soft(trigger),
            reply: None,
        });
    }

    fn request(&mut self, request: FetchRequest) {
        if request.kind == FetchKind::Forced {
            // A forced refresh reflects everything a pending soft refetch would.
            self.wants_refetch = false;
            self.rerun_after_flight = false;
            self.soft_trigger = Trigger::soft();
            let group = self.descriptor.id().clone();
            self.queue.retain_mut(|queued| {
                if queued.kind != FetchKind::Forced {
                    return true;
                }
                if let Some(reply) = queued.reply.take() {
                    let _ = reply.send(Err(MonitorError::Superseded(group.clone())));
                }
                false
            });
            if let Some(in_flight) = self
                .in_flight
                .take_if(|in_flight| matches!(in_flight.request.kind, FetchKind::Soft(_)))
            {
                debug!(group = %group, seq = in_flight.seq, "forced refresh preempts soft refetch");
                in_flight.task.abort();
            }
        }

        if self.in_flight.is_some() {
            self.queue.push_back(request);
        } else {
            self.start(request);
        }
    }

    fn start(&mut self, request: FetchRequest) {
        let criteria = match self.criteria_for(&request.kind) {
            Ok(criteria) => criteria,
            Err(err) => {
                self.fail(request, err);
                return;
            }
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        let generation = self.generation;
        debug!(
            group = %self.descriptor.id(),
            generation,
            seq,
            from = criteria.from,
            size = criteria.size,
            "issuing query"
        );

        let service = self.services.service.clone();
        let limiter = self.services.limiter.clone();
        let done_tx = self.done_tx.clone();
        let cancel = self.cancel.clone();
        let task = tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = run_query(service, limiter, criteria) => result,
            };
            let _ = done_tx.send(FetchDone {
                generation,
                seq,
                result,
            });
        });
        self.in_flight = Some(InFlight { seq, request, task });
    }

    fn criteria_for(&self, kind: &FetchKind) -> Result<QueryCriteria> {
        let base = self.services.compiler.compile_group(&self.descriptor)?;
        let window_size = self
            .descriptor
            .window_size_or(self.services.config.default_window_size);
        let resident = self.window.as_ref().map_or(0, ResultWindow::len);
        Ok(match kind {
            FetchKind::Soft(_) => base.with_window(0, resident.max(window_size)),
            FetchKind::Forced => base.with_window(0, window_size),
            FetchKind::NextPage => base.with_window(resident, self.services.config.page_size),
            FetchKind::Item(id) => restrict_to_items(&base, std::slice::from_ref(id)),
        })
    }

    fn handle_done(&mut self, done: FetchDone) {
        let group = self.descriptor.id().clone();
        if done.generation != self.generation {
            let stale = StaleWindowError {
                group,
                generation: done.generation,
            };
            debug!(error = %stale, "discarding response");
            return;
        }
        let Some(in_flight) = self
            .in_flight
            .take_if(|in_flight| in_flight.seq == done.seq)
        else {
            debug!(group = %group, seq = done.seq, "discarding superseded response");
            return;
        };

        match done.result {
            Ok(snapshot) => self.apply(in_flight.request, snapshot),
            Err(err) => self.fail(in_flight.request, MonitorError::Query(err)),
        }
        self.after_flight();
    }

    fn after_flight(&mut self) {
        while self.in_flight.is_none() {
            let Some(next) = self.queue.pop_front() else {
                break;
            };
            self.start(next);
        }
        if self.rerun_after_flight {
            self.rerun_after_flight = false;
            self.wants_refetch = true;
        }
    }

    fn apply(&mut self, request: FetchRequest, snapshot: ResultSnapshot) {
        let group = self.descriptor.id().clone();
        let outcome = match request.kind {
            FetchKind::Soft(trigger) => self.apply_soft(trigger, snapshot),
            FetchKind::Forced => {
                let reconciled = reconcile(
                    self.window.as_ref(),
                    snapshot,
                    Trigger::forced(),
                    ViewState::at_rest(),
                );
                self.store(reconciled.window, true)
            }
            FetchKind::NextPage => {
                let mut window = self.window.clone().unwrap_or_default();
                let appended = window.append_page(snapshot);
                debug!(group = %group, appended, "fetched next page");
                self.store(window, false)
            }
            FetchKind::Item(id) => {
                let mut window = self.window.clone().unwrap_or_default();
                window.refresh_in_place(&snapshot);
                if snapshot.position(&id).is_none() {
                    window.mark_gone(std::slice::from_ref(&id));
                }
                if self.window.as_ref() == Some(&window) {
                    self.outcome()
                } else {
                    self.store(window, false)
                }
            }
        };
        if let Some(reply) = request.reply {
            let _ = reply.send(Ok(outcome));
        }
    }

    fn apply_soft(&mut self, mut trigger: Trigger, snapshot: ResultSnapshot) -> Outcome {
        let group = self.descriptor.id().clone();
        if self.services.config.autorefresh_content {
            trigger.force = true;
        }
        let context = self.services.context.current(&group);
        let view = ViewState {
            has_open_preview: context
                .preview
                .as_ref()
                .is_some_and(|preview| previews_group(&self.descriptor, preview)),
            scroll_offset: context.scroll_offset,
        };
        let reconciled = reconcile(self.window.as_ref(), snapshot, trigger, view);
        debug!(
            group = %group,
            change = ?reconciled.change,
            added = reconciled.diff.added.len(),
            removed = reconciled.diff.removed.len(),
            "reconciled"
        );
        match reconciled.change {
            WindowChange::Suppressed => {
                let pending_count = reconciled.pending_count();
                self.window = Some(reconciled.window);
                let _ = self.services.events.send(MonitorEvent::RefreshAvailable {
                    group,
                    pending_count,
                });
                self.outcome()
            }
            WindowChange::UpdatedInPlace if self.window.as_ref() == Some(&reconciled.window) => {
                self.outcome()
            }
            WindowChange::UpdatedInPlace | WindowChange::Merged | WindowChange::Replaced => {
                self.store(reconciled.window, false)
            }
        }
    }

    fn apply_pending(&mut self, reply: Reply) {
        let applied = self
            .window
            .as_mut()
            .and_then(ResultWindow::apply_pending)
            .is_some();
        let outcome = match self.window.clone() {
            Some(window) if applied => self.store(window, true),
            _ => self.outcome(),
        };
        let _ = reply.send(Ok(outcome));
    }

    fn replace(&mut self, descriptor: GroupDescriptor) {
        self.generation += 1;
        info!(
            group = %descriptor.id(),
            kind = descriptor.kind().name(),
            generation = self.generation,
            "descriptor replaced"
        );
        let group = self.descriptor.id().clone();
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.task.abort();
            if let Some(reply) = in_flight.request.reply {
                let _ = reply.send(Err(MonitorError::Superseded(group.clone())));
            }
        }
        for queued in self.queue.drain(..) {
            if let Some(reply) = queued.reply {
                let _ = reply.send(Err(MonitorError::Superseded(group.clone())));
            }
        }
        self.wants_refetch = false;
        self.rerun_after_flight = false;
        self.soft_trigger = Trigger::soft();
        self.descriptor = descriptor;
        self.window = None;
        self.request(FetchRequest {
            kind: FetchKind::Forced,
            reply: None,
        });
    }

    fn fail(&mut self, request: FetchRequest, err: MonitorError) {
        let group = self.descriptor.id().clone();
        if err.is_transient() {
            warn!(group = %group, error = %err, "refetch failed; keeping last window");
        } else {
            error!(group = %group, error = %err, "refetch rejected; keeping last window");
        }
        let _ = self.services.events.send(MonitorEvent::FetchFailed {
            group,
            message: err.to_string(),
        });
        if let Some(reply) = request.reply {
            let _ = reply.send(Err(err));
        }
    }

    fn store(&mut self, window: ResultWindow, reset_scroll: bool) -> Outcome {
        self.window = Some(window.clone());
        self.emit_window(window, reset_scroll);
        self.outcome()
    }

    fn emit_window(&self, window: ResultWindow, reset_scroll: bool) {
        let _ = self.services.events.send(MonitorEvent::WindowChanged {
            group: self.descriptor.id().clone(),
            window,
            reset_scroll,
        });
    }

    fn outcome(&self) -> Outcome {
        let window = self.window.clone().unwrap_or_default();
        Outcome {
            suppressed: window.pending().is_some(),
            window,
        }
    }

    fn shutdown(&mut self) {
        let group = self.descriptor.id().clone();
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.task.abort();
            if let Some(reply) = in_flight.request.reply {
                let _ = reply.send(Err(MonitorError::Deactivated(group.clone())));
            }
        }
        for queued in self.queue.drain(..) {
            if let Some(reply) = queued.reply {
                let _ = reply.send(Err(MonitorError::Deactivated(group.clone())));
            }
        }
        self.window = None;
    }
}

async fn run_query(
    service: Arc<dyn QueryService>,
    limiter: Arc<Semaphore>,
    criteria: QueryCriteria,
) -> std::result::Result<ResultSnapshot, QueryServiceError> {
    let _permit = limiter
        .acquire_owned()
        .await
        .map_err(|err| QueryServiceError::Backend(format!("query limiter closed: {err}")))?;
    service.execute(&criteria).await
}
