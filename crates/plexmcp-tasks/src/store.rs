//! Task store contract and the in-memory implementation.
//!
//! Every operation filters on the presenting session id: a task created
//! under session S is invisible to any other session, and a mismatch reads
//! as not-found rather than as an authorization failure. All read paths
//! return snapshots; terminal writes are one-shot and first-writer-wins.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, trace};

use plexmcp_protocol::types::{Task, TaskMetadata, TaskStatus, Timestamp};
use plexmcp_protocol::{Error, RequestId, Result};

use crate::id::TaskIdGenerator;

/// Store limits and defaults.
#[derive(Debug, Clone)]
pub struct TaskStoreConfig {
    /// TTL applied when the caller requests none.
    pub default_ttl: Duration,
    /// Upper clamp on requested TTLs.
    pub max_ttl: Duration,
    /// Cadence of the expired-task reaper.
    pub reaper_interval: Duration,
    /// Global cap on live tasks.
    pub max_tasks: usize,
    /// Per-session cap on live tasks.
    pub max_tasks_per_session: usize,
    /// Fixed page size for `list`.
    pub page_size: usize,
    /// `pollInterval` hint attached to created tasks.
    pub poll_interval: Duration,
}

impl Default for TaskStoreConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(600),
            max_ttl: Duration::from_secs(3600),
            reaper_interval: Duration::from_secs(60),
            max_tasks: 1000,
            max_tasks_per_session: 100,
            page_size: 20,
            poll_interval: Duration::from_millis(2000),
        }
    }
}

/// Persistence seam for the task subsystem.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a task in `working` state. The effective TTL is the request
    /// clamped to the store maximum, or the default when absent.
    async fn create(
        &self,
        metadata: &TaskMetadata,
        request_id: RequestId,
        request: Value,
        session_id: Option<&str>,
    ) -> Result<Task>;

    /// Snapshot a task. Expired or foreign-session tasks read as not-found.
    async fn get(&self, task_id: &str, session_id: Option<&str>) -> Result<Task>;

    /// Move a non-terminal task to a non-terminal status (or refresh its
    /// status message). Terminal targets go through [`Self::store_result`].
    async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
        session_id: Option<&str>,
    ) -> Result<Task>;

    /// One-shot terminal transition carrying the result payload atomically.
    /// Exactly one concurrent caller succeeds; later callers observe the
    /// terminal state via the invalid-state error.
    async fn store_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Value,
        status_message: Option<String>,
        session_id: Option<&str>,
    ) -> Result<Task>;

    /// The terminal result: the stored payload for `completed`, the failure
    /// surfaced as an error for `failed`/`cancelled`, invalid-state while
    /// non-terminal.
    async fn get_result(&self, task_id: &str, session_id: Option<&str>) -> Result<Value>;

    /// Suspend until the task reaches a terminal state, then snapshot it.
    async fn wait_terminal(&self, task_id: &str, session_id: Option<&str>) -> Result<Task>;

    /// One page of tasks in `(created_at, task_id)` order with an opaque
    /// resume cursor.
    async fn list(
        &self,
        session_id: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<(Vec<Task>, Option<String>)>;

    /// Cancel a task. Idempotent: a terminal task is returned unchanged.
    async fn cancel(
        &self,
        task_id: &str,
        reason: Option<String>,
        session_id: Option<&str>,
    ) -> Result<Task>;
}

fn not_found(task_id: &str) -> Error {
    Error::invalid_params(format!("task not found: {task_id}"))
}

/// Opaque keyset cursor: the last `(created_at, task_id)` pair seen.
#[derive(Serialize, Deserialize)]
struct PageCursor {
    created_at: i64,
    task_id: String,
}

fn encode_cursor(created_at_micros: i64, task_id: &str) -> String {
    let cursor = PageCursor {
        created_at: created_at_micros,
        task_id: task_id.to_string(),
    };
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(&cursor).expect("cursor serializes"))
}

fn decode_cursor(raw: &str) -> Result<PageCursor> {
    let bytes = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| Error::invalid_params("malformed pagination cursor"))?;
    serde_json::from_slice(&bytes).map_err(|_| Error::invalid_params("malformed pagination cursor"))
}

struct StoredTask {
    task: Task,
    session_id: Option<String>,
    #[allow(dead_code)]
    originating_request_id: RequestId,
    #[allow(dead_code)]
    originating_request: Value,
    terminal_result: Option<Value>,
    expires_at: Instant,
    status_tx: watch::Sender<TaskStatus>,
}

impl StoredTask {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn visible_to(&self, session_id: Option<&str>) -> bool {
        self.session_id.as_deref() == session_id
    }
}

/// In-memory [`TaskStore`].
pub struct InMemoryTaskStore {
    tasks: DashMap<String, StoredTask>,
    ids: TaskIdGenerator,
    config: TaskStoreConfig,
}

impl InMemoryTaskStore {
    /// Create a store.
    pub fn new(config: TaskStoreConfig) -> Arc<Self> {
        Arc::new(Self {
            tasks: DashMap::new(),
            ids: TaskIdGenerator::new(),
            config,
        })
    }

    /// Start the periodic reaper; returns its handle for shutdown.
    pub fn start_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let interval = store.config.reaper_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.reap_expired();
            }
        })
    }

    /// Drop expired tasks. Exposed so tests can force a pass.
    pub fn reap_expired(&self) {
        let now = Instant::now();
        let before = self.tasks.len();
        self.tasks.retain(|_, stored| !stored.is_expired(now));
        let reaped = before - self.tasks.len();
        if reaped > 0 {
            debug!(reaped, "expired tasks removed");
        }
    }

    /// Live (unexpired) task count, for cap enforcement and metrics.
    pub fn live_count(&self) -> usize {
        let now = Instant::now();
        self.tasks
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    fn effective_ttl(&self, requested: Option<u64>) -> Duration {
        match requested {
            Some(millis) => Duration::from_millis(millis).min(self.config.max_ttl),
            None => self.config.default_ttl.min(self.config.max_ttl),
        }
    }

    fn check_caps(&self, session_id: Option<&str>) -> Result<()> {
        let now = Instant::now();
        let mut total = 0usize;
        let mut in_session = 0usize;
        for entry in self.tasks.iter() {
            if entry.is_expired(now) {
                continue;
            }
            total += 1;
            if entry.session_id.as_deref() == session_id {
                in_session += 1;
            }
        }
        if total >= self.config.max_tasks {
            return Err(Error::invalid_params(format!(
                "task limit reached: {} tasks already live",
                self.config.max_tasks
            )));
        }
        if in_session >= self.config.max_tasks_per_session {
            return Err(Error::invalid_params(format!(
                "per-session task limit reached: {} tasks already live",
                self.config.max_tasks_per_session
            )));
        }
        Ok(())
    }

    /// Run `mutate` against a live, visible task. Centralizes the expiry and
    /// session checks every mutation shares.
    fn with_live_task<T>(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        mutate: impl FnOnce(&mut StoredTask) -> Result<T>,
    ) -> Result<T> {
        let now = Instant::now();
        let mut entry = self.tasks.get_mut(task_id).ok_or_else(|| not_found(task_id))?;
        if entry.is_expired(now) || !entry.visible_to(session_id) {
            return Err(not_found(task_id));
        }
        mutate(&mut entry)
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(
        &self,
        metadata: &TaskMetadata,
        request_id: RequestId,
        request: Value,
        session_id: Option<&str>,
    ) -> Result<Task> {
        self.check_caps(session_id)?;

        let ttl = self.effective_ttl(metadata.ttl);
        let now = Timestamp::now();
        let task = Task {
            task_id: self.ids.next_id(),
            status: TaskStatus::Working,
            status_message: None,
            created_at: now,
            last_updated_at: now,
            ttl: Some(ttl.as_millis() as u64),
            poll_interval: Some(self.config.poll_interval.as_millis() as u64),
        };
        let (status_tx, _) = watch::channel(TaskStatus::Working);
        self.tasks.insert(
            task.task_id.clone(),
            StoredTask {
                task: task.clone(),
                session_id: session_id.map(str::to_string),
                originating_request_id: request_id,
                originating_request: request,
                terminal_result: None,
                expires_at: Instant::now() + ttl,
                status_tx,
            },
        );
        trace!(task_id = %task.task_id, ?session_id, "task created");
        Ok(task)
    }

    async fn get(&self, task_id: &str, session_id: Option<&str>) -> Result<Task> {
        let now = Instant::now();
        let entry = self.tasks.get(task_id).ok_or_else(|| not_found(task_id))?;
        if entry.is_expired(now) || !entry.visible_to(session_id) {
            return Err(not_found(task_id));
        }
        Ok(entry.task.clone())
    }

    async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
        session_id: Option<&str>,
    ) -> Result<Task> {
        if status.is_terminal() {
            return Err(Error::internal(
                "terminal transitions must carry a result via store_result",
            ));
        }
        self.with_live_task(task_id, session_id, |stored| {
            if !stored.task.status.can_transition_to(status) {
                return Err(Error::internal(format!(
                    "invalid task transition {} -> {}",
                    stored.task.status, status
                )));
            }
            stored.task.status = status;
            stored.task.status_message = status_message;
            stored.task.last_updated_at = Timestamp::now();
            let _ = stored.status_tx.send(status);
            Ok(stored.task.clone())
        })
    }

    async fn store_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Value,
        status_message: Option<String>,
        session_id: Option<&str>,
    ) -> Result<Task> {
        if !status.is_terminal() {
            return Err(Error::internal("store_result requires a terminal status"));
        }
        self.with_live_task(task_id, session_id, |stored| {
            if stored.task.status.is_terminal() {
                return Err(Error::internal(format!(
                    "task {task_id} already reached {}",
                    stored.task.status
                )));
            }
            stored.task.status = status;
            stored.task.status_message = status_message;
            stored.task.last_updated_at = Timestamp::now();
            stored.terminal_result = Some(result);
            let _ = stored.status_tx.send(status);
            Ok(stored.task.clone())
        })
    }

    async fn get_result(&self, task_id: &str, session_id: Option<&str>) -> Result<Value> {
        let now = Instant::now();
        let entry = self.tasks.get(task_id).ok_or_else(|| not_found(task_id))?;
        if entry.is_expired(now) || !entry.visible_to(session_id) {
            return Err(not_found(task_id));
        }
        match entry.task.status {
            TaskStatus::Completed => Ok(entry
                .terminal_result
                .clone()
                .unwrap_or(Value::Null)),
            TaskStatus::Failed => Err(Error::internal(
                entry
                    .task
                    .status_message
                    .clone()
                    .unwrap_or_else(|| "task failed".to_string()),
            )),
            TaskStatus::Cancelled => Err(Error::cancelled(format!("task {task_id} was cancelled"))),
            TaskStatus::Working | TaskStatus::InputRequired => Err(Error::invalid_params(format!(
                "task {task_id} has not reached a terminal state"
            ))),
        }
    }

    async fn wait_terminal(&self, task_id: &str, session_id: Option<&str>) -> Result<Task> {
        let mut rx = {
            let now = Instant::now();
            let entry = self.tasks.get(task_id).ok_or_else(|| not_found(task_id))?;
            if entry.is_expired(now) || !entry.visible_to(session_id) {
                return Err(not_found(task_id));
            }
            if entry.task.status.is_terminal() {
                return Ok(entry.task.clone());
            }
            entry.status_tx.subscribe()
        };
        loop {
            rx.changed()
                .await
                .map_err(|_| not_found(task_id))?;
            if rx.borrow().is_terminal() {
                return self.get(task_id, session_id).await;
            }
        }
    }

    async fn list(
        &self,
        session_id: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<(Vec<Task>, Option<String>)> {
        let after = cursor.map(decode_cursor).transpose()?;
        let now = Instant::now();

        let mut page_keys: Vec<(i64, String)> = self
            .tasks
            .iter()
            .filter(|entry| !entry.is_expired(now) && entry.visible_to(session_id))
            .map(|entry| {
                (
                    entry.task.created_at.0.timestamp_micros(),
                    entry.task.task_id.clone(),
                )
            })
            .filter(|key| match &after {
                Some(cursor) => *key > (cursor.created_at, cursor.task_id.clone()),
                None => true,
            })
            .collect();
        page_keys.sort();

        let has_more = page_keys.len() > self.config.page_size;
        page_keys.truncate(self.config.page_size);

        let next_cursor = if has_more {
            page_keys
                .last()
                .map(|(created, id)| encode_cursor(*created, id))
        } else {
            None
        };

        // Snapshot the page; entries deleted mid-pagination simply drop out.
        let tasks = page_keys
            .into_iter()
            .filter_map(|(_, id)| self.tasks.get(&id).map(|e| e.task.clone()))
            .collect();
        Ok((tasks, next_cursor))
    }

    async fn cancel(
        &self,
        task_id: &str,
        reason: Option<String>,
        session_id: Option<&str>,
    ) -> Result<Task> {
        self.with_live_task(task_id, session_id, |stored| {
            if stored.task.status.is_terminal() {
                // Idempotent: a cancel of a finished task returns it unchanged.
                return Ok(stored.task.clone());
            }
            stored.task.status = TaskStatus::Cancelled;
            stored.task.status_message = reason;
            stored.task.last_updated_at = Timestamp::now();
            let _ = stored.status_tx.send(TaskStatus::Cancelled);
            Ok(stored.task.clone())
        })
    }
}
