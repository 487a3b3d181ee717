use std::sync::Arc;

use chrono::NaiveDate;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{
    Mutex, broadcast,
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tracing::{debug, info, warn};

use crate::{
    aggregate::{self, DailyProgress, DailySummary},
    calendar::{Calendar, DayKey},
    config::TrackerConfig,
    core::{
        goal::{Goal, GoalManager},
        store::{MealStore, StoreError},
    },
    entry::{MealSink, Submission},
    error::ValidationError,
    meal::{MealDraft, MealPatch, MealRecord},
    persist::{self, KvStore, PersistError, StorageKeys, snapshot},
    types::{MealId, Revision},
};

use super::events::TrackerEvent;

/// Failure of a runtime request.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The store refused the mutation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The goal value was rejected.
    #[error(transparent)]
    Goal(#[from] ValidationError),
    /// The runtime has stopped.
    #[error("tracker runtime is not running")]
    ChannelClosed,
}

/// Channel sizes for the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Pending persistence messages before writes are deferred.
    pub persist_queue_bound: usize,
    /// Broadcast buffer; slow subscribers lag past this.
    pub event_capacity: usize,
    /// Queued commands before callers wait.
    pub command_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            persist_queue_bound: 16,
            event_capacity: 256,
            command_capacity: 64,
        }
    }
}

/// Point-in-time view of the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerStatus {
    /// Mutations applied so far.
    pub revision: Revision,
    /// Highest revision known to be in storage.
    pub persisted: Revision,
    /// False when running without storage or after a storage failure.
    pub persistent: bool,
    /// Number of meals held.
    pub meals: usize,
    /// Current goal.
    pub goal: Goal,
}

/// Cloneable client of the tracker runtime.
#[derive(Clone)]
pub struct TrackerHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<TrackerEvent>,
}

type Reply<T> = oneshot::Sender<Result<T, RuntimeError>>;

enum GoalInput {
    Grams(f64),
    Text(String),
}

enum Command {
    Create {
        draft: MealDraft,
        resp: Reply<MealRecord>,
    },
    Update {
        id: MealId,
        patch: MealPatch,
        resp: Reply<MealRecord>,
    },
    Reschedule {
        id: MealId,
        date: NaiveDate,
        resp: Reply<MealRecord>,
    },
    Delete {
        id: MealId,
        resp: Reply<MealRecord>,
    },
    Submit {
        submission: Submission,
        resp: Reply<MealRecord>,
    },
    Undo {
        resp: Reply<MealId>,
    },
    Redo {
        resp: Reply<MealId>,
    },
    SetGoal {
        input: GoalInput,
        resp: Reply<Goal>,
    },
    CurrentGoal {
        resp: oneshot::Sender<Goal>,
    },
    Get {
        id: MealId,
        resp: oneshot::Sender<Option<MealRecord>>,
    },
    Day {
        day: DayKey,
        resp: oneshot::Sender<Vec<MealRecord>>,
    },
    Today {
        resp: oneshot::Sender<DailyProgress>,
    },
    Weekly {
        resp: oneshot::Sender<Vec<DailySummary>>,
    },
    Monthly {
        resp: oneshot::Sender<Vec<DailySummary>>,
    },
    Streak {
        resp: oneshot::Sender<u32>,
    },
    Snapshot {
        resp: oneshot::Sender<Vec<MealRecord>>,
    },
    Status {
        resp: oneshot::Sender<TrackerStatus>,
    },
    Flush {
        resp: oneshot::Sender<Revision>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

enum PersistMsg {
    Write { key: String, bytes: Vec<u8> },
    /// Everything queued before this covers `revision`.
    Mark { revision: Revision },
    Flush { resp: oneshot::Sender<Option<Revision>> },
    Shutdown { resp: oneshot::Sender<()> },
}

enum PersistStatus {
    Persisted(Revision),
    Degraded(String),
}

/// Loads state from `kv` and starts the runtime. Must be called inside a
/// tokio runtime.
///
/// If anything fails to load the tracker runs without storage, so the stored
/// values are left untouched.
pub fn open_tracker(
    kv: Box<dyn KvStore>,
    calendar: Calendar,
    config: &TrackerConfig,
) -> Result<TrackerHandle, ValidationError> {
    let default_goal = config.default_goal()?;
    let loaded = persist::load_state(kv.as_ref(), &config.storage_keys(), calendar, default_goal);
    let kv = if loaded.degraded {
        warn!("storage unreadable; tracker will not persist this session");
        None
    } else {
        Some(kv)
    };
    Ok(spawn_tracker(loaded.store, loaded.goals, kv, config))
}

/// Starts the runtime over already-loaded state. `kv` of `None` keeps the session in memory.
pub fn spawn_tracker(
    store: MealStore,
    goals: GoalManager,
    kv: Option<Box<dyn KvStore>>,
    config: &TrackerConfig,
) -> TrackerHandle {
    let runtime = &config.runtime;
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(runtime.command_capacity.max(1));
    let (events_tx, _) = broadcast::channel::<TrackerEvent>(runtime.event_capacity.max(1));

    let (persist_tx, mut status_rx) = match kv {
        Some(kv) => {
            let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg>(runtime.persist_queue_bound.max(1));
            let (status_tx, status_rx) = mpsc::unbounded_channel::<PersistStatus>();
            spawn_persistence_worker(kv, persist_rx, status_tx);
            (Some(persist_tx), Some(status_rx))
        }
        None => (None, None),
    };

    info!(
        meals = store.len(),
        goal = goals.goal().grams(),
        persistent = persist_tx.is_some(),
        "tracker runtime started"
    );

    let mut tracker = Tracker {
        store,
        goals,
        keys: config.storage_keys(),
        revision: 0,
        persisted: 0,
        meals_dirty: false,
        goal_dirty: false,
        events_tx: events_tx.clone(),
        persist_tx,
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break; };
                    if tracker.handle(cmd).await {
                        break;
                    }
                }
                Some(status) = next_status(&mut status_rx) => {
                    tracker.on_status(status);
                }
            }
        }
        debug!("tracker runtime stopped");
    });

    TrackerHandle { cmd_tx, events_tx }
}

async fn next_status(rx: &mut Option<mpsc::UnboundedReceiver<PersistStatus>>) -> Option<PersistStatus> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl TrackerHandle {
    /// New receiver of every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events_tx.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Logs a meal.
    pub async fn create(&self, draft: MealDraft) -> Result<MealRecord, RuntimeError> {
        self.request(|resp| Command::Create { draft, resp }).await?
    }

    /// Edits fields of a meal.
    pub async fn update(&self, id: MealId, patch: MealPatch) -> Result<MealRecord, RuntimeError> {
        self.request(|resp| Command::Update { id, patch, resp }).await?
    }

    /// Moves a meal to another local day.
    pub async fn reschedule(&self, id: MealId, date: NaiveDate) -> Result<MealRecord, RuntimeError> {
        self.request(|resp| Command::Reschedule { id, date, resp }).await?
    }

    /// Removes a meal.
    pub async fn delete(&self, id: MealId) -> Result<MealRecord, RuntimeError> {
        self.request(|resp| Command::Delete { id, resp }).await?
    }

    /// Commits what an entry pipeline prepared.
    pub async fn submit(&self, submission: Submission) -> Result<MealRecord, RuntimeError> {
        self.request(|resp| Command::Submit { submission, resp }).await?
    }

    /// Reverts the latest change, returning the affected meal.
    pub async fn undo(&self) -> Result<MealId, RuntimeError> {
        self.request(|resp| Command::Undo { resp }).await?
    }

    /// Reapplies the latest undone change, returning the affected meal.
    pub async fn redo(&self) -> Result<MealId, RuntimeError> {
        self.request(|resp| Command::Redo { resp }).await?
    }

    /// Sets the goal from a number.
    pub async fn set_goal(&self, grams: f64) -> Result<Goal, RuntimeError> {
        self.request(|resp| Command::SetGoal {
            input: GoalInput::Grams(grams),
            resp,
        })
        .await?
    }

    /// Sets the goal from user-typed text.
    pub async fn set_goal_str(&self, raw: impl Into<String>) -> Result<Goal, RuntimeError> {
        let raw = raw.into();
        self.request(|resp| Command::SetGoal {
            input: GoalInput::Text(raw),
            resp,
        })
        .await?
    }

    /// Current goal.
    pub async fn goal(&self) -> Result<Goal, RuntimeError> {
        self.request(|resp| Command::CurrentGoal { resp }).await
    }

    /// One meal by id.
    pub async fn get(&self, id: MealId) -> Result<Option<MealRecord>, RuntimeError> {
        self.request(|resp| Command::Get { id, resp }).await
    }

    /// Meals of one local day, newest first.
    pub async fn day(&self, day: DayKey) -> Result<Vec<MealRecord>, RuntimeError> {
        self.request(|resp| Command::Day { day, resp }).await
    }

    /// Today's progress against the goal.
    pub async fn today(&self) -> Result<DailyProgress, RuntimeError> {
        self.request(|resp| Command::Today { resp }).await
    }

    /// Monday..Sunday of the current week.
    pub async fn weekly(&self) -> Result<Vec<DailySummary>, RuntimeError> {
        self.request(|resp| Command::Weekly { resp }).await
    }

    /// The current month and the five before it, oldest first.
    pub async fn monthly(&self) -> Result<Vec<DailySummary>, RuntimeError> {
        self.request(|resp| Command::Monthly { resp }).await
    }

    /// Consecutive days on which the goal was met.
    pub async fn streak(&self) -> Result<u32, RuntimeError> {
        self.request(|resp| Command::Streak { resp }).await
    }

    /// Every record, in insertion order.
    pub async fn snapshot(&self) -> Result<Vec<MealRecord>, RuntimeError> {
        self.request(|resp| Command::Snapshot { resp }).await
    }

    /// Revision, persistence progress and counts.
    pub async fn status(&self) -> Result<TrackerStatus, RuntimeError> {
        self.request(|resp| Command::Status { resp }).await
    }

    /// Waits until every change so far has been written, returning the
    /// highest persisted revision.
    pub async fn flush(&self) -> Result<Revision, RuntimeError> {
        self.request(|resp| Command::Flush { resp }).await
    }

    /// Flushes and stops the runtime. Later calls fail with `ChannelClosed`.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await
    }
}

struct Tracker {
    store: MealStore,
    goals: GoalManager,
    keys: StorageKeys,
    revision: Revision,
    persisted: Revision,
    meals_dirty: bool,
    goal_dirty: bool,
    events_tx: broadcast::Sender<TrackerEvent>,
    persist_tx: Option<mpsc::Sender<PersistMsg>>,
}

impl Tracker {
    /// Returns true once the loop should stop.
    async fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Create { draft, resp } => {
                let res = self.store.create(draft).map_err(RuntimeError::from);
                if let Ok(meal) = &res {
                    self.meals_changed(TrackerEvent::MealCreated { id: meal.id });
                }
                let _ = resp.send(res);
            }
            Command::Update { id, patch, resp } => {
                let res = self.store.update(id, patch).map_err(RuntimeError::from);
                if res.is_ok() {
                    self.meals_changed(TrackerEvent::MealUpdated { id });
                }
                let _ = resp.send(res);
            }
            Command::Reschedule { id, date, resp } => {
                let res = self.store.reschedule(id, date).map_err(RuntimeError::from);
                if res.is_ok() {
                    self.meals_changed(TrackerEvent::MealUpdated { id });
                }
                let _ = resp.send(res);
            }
            Command::Delete { id, resp } => {
                let res = self.store.delete(id).map_err(RuntimeError::from);
                if res.is_ok() {
                    self.meals_changed(TrackerEvent::MealDeleted { id });
                }
                let _ = resp.send(res);
            }
            Command::Submit { submission, resp } => {
                let creating = matches!(submission, Submission::Create(_));
                let res = self.store.submit(submission).map_err(RuntimeError::from);
                if let Ok(meal) = &res {
                    let id = meal.id;
                    self.meals_changed(if creating {
                        TrackerEvent::MealCreated { id }
                    } else {
                        TrackerEvent::MealUpdated { id }
                    });
                }
                let _ = resp.send(res);
            }
            Command::Undo { resp } => {
                let res = self
                    .store
                    .undo()
                    .map(|applied| applied.op.meal_id())
                    .map_err(RuntimeError::from);
                if let Ok(id) = res {
                    self.meals_changed(TrackerEvent::UndoApplied { id });
                }
                let _ = resp.send(res);
            }
            Command::Redo { resp } => {
                let res = self
                    .store
                    .redo()
                    .map(|applied| applied.op.meal_id())
                    .map_err(RuntimeError::from);
                if let Ok(id) = res {
                    self.meals_changed(TrackerEvent::RedoApplied { id });
                }
                let _ = resp.send(res);
            }
            Command::SetGoal { input, resp } => {
                let res = match input {
                    GoalInput::Grams(grams) => self.goals.set_goal(grams),
                    GoalInput::Text(raw) => self.goals.set_goal_str(&raw),
                }
                .map_err(RuntimeError::from);
                if let Ok(goal) = res {
                    self.revision += 1;
                    self.goal_dirty = true;
                    self.sync_storage();
                    self.emit(TrackerEvent::GoalChanged { goal });
                }
                let _ = resp.send(res);
            }
            Command::CurrentGoal { resp } => {
                let _ = resp.send(self.goals.goal());
            }
            Command::Get { id, resp } => {
                let _ = resp.send(self.store.get_cloned(id));
            }
            Command::Day { day, resp } => {
                let zone = self.store.calendar().zone();
                let _ = resp.send(aggregate::select_day(self.store.records(), day, &zone));
            }
            Command::Today { resp } => {
                let calendar = self.store.calendar();
                let _ = resp.send(aggregate::daily_progress(
                    self.store.records(),
                    self.goals.goal(),
                    calendar.now_ms(),
                    &calendar.zone(),
                ));
            }
            Command::Weekly { resp } => {
                let calendar = self.store.calendar();
                let _ = resp.send(aggregate::weekly_summaries(
                    self.store.records(),
                    self.goals.goal(),
                    calendar.now_ms(),
                    &calendar.zone(),
                ));
            }
            Command::Monthly { resp } => {
                let calendar = self.store.calendar();
                let _ = resp.send(aggregate::monthly_summaries(
                    self.store.records(),
                    self.goals.goal(),
                    calendar.now_ms(),
                    &calendar.zone(),
                ));
            }
            Command::Streak { resp } => {
                let calendar = self.store.calendar();
                let _ = resp.send(aggregate::streak(
                    self.store.records(),
                    self.goals.goal(),
                    calendar.now_ms(),
                    &calendar.zone(),
                ));
            }
            Command::Snapshot { resp } => {
                let _ = resp.send(self.store.export_snapshot());
            }
            Command::Status { resp } => {
                let _ = resp.send(TrackerStatus {
                    revision: self.revision,
                    persisted: self.persisted,
                    persistent: self.persist_tx.is_some(),
                    meals: self.store.len(),
                    goal: self.goals.goal(),
                });
            }
            Command::Flush { resp } => {
                let persisted = self.flush().await;
                let _ = resp.send(persisted);
            }
            Command::Shutdown { resp } => {
                self.flush().await;
                if let Some(tx) = self.persist_tx.take() {
                    let (done_tx, done_rx) = oneshot::channel();
                    if tx.send(PersistMsg::Shutdown { resp: done_tx }).await.is_ok() {
                        let _ = done_rx.await;
                    }
                }
                let _ = resp.send(());
                return true;
            }
        }

        false
    }

    fn meals_changed(&mut self, event: TrackerEvent) {
        self.revision += 1;
        self.meals_dirty = true;
        self.sync_storage();
        self.emit(event);
    }

    fn emit(&self, event: TrackerEvent) {
        // No subscribers is not an error.
        let _ = self.events_tx.send(event);
    }

    fn on_status(&mut self, status: PersistStatus) {
        match status {
            PersistStatus::Persisted(revision) => {
                self.persisted = self.persisted.max(revision);
                self.emit(TrackerEvent::PersistedUpTo { revision });
            }
            PersistStatus::Degraded(reason) => {
                self.persist_tx = None;
                self.emit(TrackerEvent::PersistenceDegraded { reason });
            }
        }
    }

    fn meals_write(&self) -> Option<PersistMsg> {
        match snapshot::encode_meals(&self.store.export_snapshot()) {
            Ok(bytes) => Some(PersistMsg::Write {
                key: self.keys.meals.clone(),
                bytes,
            }),
            Err(err) => {
                warn!(error = %err, "failed to encode meals; write skipped");
                None
            }
        }
    }

    fn goal_write(&self) -> Option<PersistMsg> {
        match snapshot::encode_goal(self.goals.goal()) {
            Ok(bytes) => Some(PersistMsg::Write {
                key: self.keys.goal.clone(),
                bytes,
            }),
            Err(err) => {
                warn!(error = %err, "failed to encode goal; write skipped");
                None
            }
        }
    }

    /// Queues every dirty value without waiting. Values that do not fit stay
    /// dirty and go out with the next change or flush.
    fn sync_storage(&mut self) {
        let Some(tx) = self.persist_tx.clone() else {
            return;
        };

        if self.meals_dirty {
            self.meals_dirty = match self.meals_write() {
                Some(msg) => !self.offer(&tx, msg),
                None => false,
            };
        }
        if self.goal_dirty {
            self.goal_dirty = match self.goal_write() {
                Some(msg) => !self.offer(&tx, msg),
                None => false,
            };
        }
        if !self.meals_dirty && !self.goal_dirty {
            self.offer(&tx, PersistMsg::Mark {
                revision: self.revision,
            });
        }
    }

    fn offer(&mut self, tx: &mpsc::Sender<PersistMsg>, msg: PersistMsg) -> bool {
        match tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(revision = self.revision, "persistence queue full; write deferred");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("persistence worker stopped; continuing in memory only");
                self.persist_tx = None;
                false
            }
        }
    }

    async fn flush(&mut self) -> Revision {
        let Some(tx) = self.persist_tx.clone() else {
            return self.persisted;
        };

        let mut msgs = Vec::new();
        if std::mem::take(&mut self.meals_dirty) {
            msgs.extend(self.meals_write());
        }
        if std::mem::take(&mut self.goal_dirty) {
            msgs.extend(self.goal_write());
        }
        msgs.push(PersistMsg::Mark {
            revision: self.revision,
        });
        let (resp, done) = oneshot::channel();
        msgs.push(PersistMsg::Flush { resp });

        for msg in msgs {
            if tx.send(msg).await.is_err() {
                self.persist_tx = None;
                return self.persisted;
            }
        }

        match done.await {
            Ok(Some(revision)) => self.persisted = self.persisted.max(revision),
            _ => self.persist_tx = None,
        }
        self.persisted
    }
}

/// Latest bytes per key plus the highest mark seen, built from one drain of
/// the queue.
#[derive(Default)]
struct Batch {
    writes: HashMap<String, Vec<u8>>,
    mark: Option<Revision>,
}

enum Control {
    Flush(oneshot::Sender<Option<Revision>>),
    Shutdown(oneshot::Sender<()>),
}

impl Batch {
    fn absorb(&mut self, msg: PersistMsg) -> Option<Control> {
        match msg {
            PersistMsg::Write { key, bytes } => {
                self.writes.insert(key, bytes);
                None
            }
            PersistMsg::Mark { revision } => {
                self.mark = Some(self.mark.map_or(revision, |m| m.max(revision)));
                None
            }
            PersistMsg::Flush { resp } => Some(Control::Flush(resp)),
            PersistMsg::Shutdown { resp } => Some(Control::Shutdown(resp)),
        }
    }
}

fn spawn_persistence_worker(
    kv: Box<dyn KvStore>,
    mut rx: mpsc::Receiver<PersistMsg>,
    status_tx: mpsc::UnboundedSender<PersistStatus>,
) {
    let kv = Arc::new(Mutex::new(kv));
    tokio::spawn(async move {
        let mut last_persisted: Revision = 0;
        let mut degraded = false;

        while let Some(first) = rx.recv().await {
            let mut batch = Batch::default();
            let mut control = batch.absorb(first);
            while control.is_none() {
                match rx.try_recv() {
                    Ok(msg) => control = batch.absorb(msg),
                    Err(_) => break,
                }
            }

            if degraded {
                debug!(writes = batch.writes.len(), "storage degraded; writes dropped");
            } else {
                let call_flush = matches!(control, Some(Control::Flush(_) | Control::Shutdown(_)));
                let mark = batch.mark;
                match write_batch(&kv, batch.writes, call_flush).await {
                    Ok(()) => {
                        if let Some(revision) = mark {
                            last_persisted = last_persisted.max(revision);
                            let _ = status_tx.send(PersistStatus::Persisted(last_persisted));
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "storage write failed; continuing in memory only");
                        degraded = true;
                        let _ = status_tx.send(PersistStatus::Degraded(err.to_string()));
                    }
                }
            }

            match control {
                Some(Control::Flush(resp)) => {
                    let _ = resp.send((!degraded).then_some(last_persisted));
                }
                Some(Control::Shutdown(resp)) => {
                    let _ = resp.send(());
                    break;
                }
                None => {}
            }
        }
    });
}

async fn write_batch(
    kv: &Arc<Mutex<Box<dyn KvStore>>>,
    writes: HashMap<String, Vec<u8>>,
    call_flush: bool,
) -> Result<(), PersistError> {
    if writes.is_empty() && !call_flush {
        return Ok(());
    }

    let kv_ref = Arc::clone(kv);
    tokio::task::spawn_blocking(move || {
        let mut kv = kv_ref.blocking_lock();
        for (key, bytes) in &writes {
            kv.set(key, bytes)?;
        }
        if call_flush {
            kv.flush()?;
        }
        debug!(keys = writes.len(), "storage batch written");
        Ok::<(), PersistError>(())
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?
}
