//! Task coordinator.
//!
//! Turns task-augmented requests into background executions and serves the
//! `tasks/*` protocol surface on a session. Executions are scoped to a
//! cancellation source derived from three triggers: the task's TTL timer,
//! an explicit `tasks/cancel`, and the session's termination.
//!
//! Tasks never hold a session object; they carry the plain session-id string
//! and look up the live session through the registry when emitting status
//! notifications. A detached session suppresses notifications silently.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use plexmcp_protocol::types::{
    CancelTaskRequest, CreateTaskResult, GetTaskRequest, ListTasksRequest, ListTasksResult, Task,
    TaskMetadata, TaskStatus, TaskStatusNotification, TaskSupport,
};
use plexmcp_protocol::{Error, Result, methods};
use plexmcp_session::{RequestContext, RequestHandler, Session};

use crate::store::TaskStore;

/// The work a task-augmented primitive performs in the background. Receives
/// the handle for status updates and input-required suspension; observes the
/// handle's cancellation token cooperatively.
pub type TaskExecution = Box<dyn FnOnce(TaskHandle) -> BoxFuture<'static, Result<Value>> + Send>;

/// Coordinates task admission, execution, and the `tasks/*` surface.
pub struct TaskCoordinator {
    store: Arc<dyn TaskStore>,
    sessions: DashMap<String, Session>,
    executions: DashMap<String, CancellationToken>,
    /// Emit `notifications/tasks/status` on every status write.
    notify_status: bool,
}

impl TaskCoordinator {
    /// Create a coordinator over a store.
    pub fn new(store: Arc<dyn TaskStore>, notify_status: bool) -> Arc<Self> {
        Arc::new(Self {
            store,
            sessions: DashMap::new(),
            executions: DashMap::new(),
            notify_status,
        })
    }

    /// The admission failure for a primitive that declared `forbidden`.
    pub fn rejection_for(primitive: &str) -> Error {
        Error::invalid_params(format!(
            "{primitive} does not support task-augmented execution"
        ))
    }

    /// The admission failure when no task store is installed.
    pub fn rejection_without_store() -> Error {
        Error::invalid_params("task-augmented execution requires a task store")
    }

    /// Register the `tasks/*` request handlers on a session and track it for
    /// status notifications.
    pub fn attach(self: &Arc<Self>, session: &Session) {
        if let Some(session_id) = session.session_id() {
            self.sessions.insert(session_id, session.clone());
        }
        session.on_request(methods::TASKS_GET, Arc::new(GetHandler(self.clone())));
        session.on_request(methods::TASKS_RESULT, Arc::new(ResultHandler(self.clone())));
        session.on_request(methods::TASKS_LIST, Arc::new(ListHandler(self.clone())));
        session.on_request(methods::TASKS_CANCEL, Arc::new(CancelHandler(self.clone())));
    }

    /// Remove a session from the notification registry.
    pub fn detach(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Admit a task-augmented request: create the task, start the background
    /// execution, and return the stub response.
    ///
    /// `support` is the target primitive's declared task support; `request`
    /// is the originating request params, persisted with the task.
    pub async fn admit(
        self: &Arc<Self>,
        ctx: &RequestContext,
        primitive: &str,
        support: TaskSupport,
        metadata: &TaskMetadata,
        request: Value,
        execution: TaskExecution,
    ) -> Result<Value> {
        if support == TaskSupport::Forbidden {
            return Err(Self::rejection_for(primitive));
        }
        let session_id = ctx.session().session_id();
        let task = self
            .store
            .create(
                metadata,
                ctx.request_id().clone(),
                request,
                session_id.as_deref(),
            )
            .await?;
        self.emit_status(&task, session_id.as_deref());

        self.spawn_execution(
            task.clone(),
            session_id,
            ctx.session().termination().child_token(),
            execution,
        );

        serde_json::to_value(CreateTaskResult { task }).map_err(Into::into)
    }

    fn spawn_execution(
        self: &Arc<Self>,
        task: Task,
        session_id: Option<String>,
        session_scope: CancellationToken,
        execution: TaskExecution,
    ) {
        let scope = session_scope.child_token();
        self.executions.insert(task.task_id.clone(), scope.clone());

        let coordinator = self.clone();
        let ttl = task.ttl.map(Duration::from_millis);
        tokio::spawn(async move {
            let task_id = task.task_id.clone();
            let handle = TaskHandle {
                coordinator: coordinator.clone(),
                task_id: task_id.clone(),
                session_id: session_id.clone(),
                cancellation: scope.clone(),
            };

            let ttl_timer = async {
                match ttl {
                    Some(ttl) => tokio::time::sleep(ttl).await,
                    None => std::future::pending().await,
                }
            };

            let outcome = tokio::select! {
                outcome = execution(handle) => Some(outcome),
                () = scope.cancelled() => None,
                () = ttl_timer => {
                    // Expiry makes the task dead; the execution observes a
                    // cancelled context and the reaper removes the record.
                    scope.cancel();
                    debug!(%task_id, "task ttl elapsed; execution cancelled");
                    None
                }
            };

            let session = session_id.as_deref();
            let write = match outcome {
                Some(Ok(result)) => {
                    coordinator
                        .store
                        .store_result(&task_id, TaskStatus::Completed, result, None, session)
                        .await
                }
                Some(Err(err)) => {
                    coordinator
                        .store
                        .store_result(
                            &task_id,
                            TaskStatus::Failed,
                            Value::Null,
                            Some(err.message.clone()),
                            session,
                        )
                        .await
                }
                None => coordinator
                    .store
                    .cancel(&task_id, Some("execution cancelled".to_string()), session)
                    .await,
            };
            match write {
                Ok(task) => coordinator.emit_status(&task, session),
                // A terminal state was already written (cancel raced
                // completion) or the task expired; both are final.
                Err(err) => trace!(%task_id, %err, "terminal write skipped"),
            }
            coordinator.executions.remove(&task_id);
        });
    }

    /// Best-effort status notification to the initiating peer. Delivery
    /// failure never affects task state.
    fn emit_status(&self, task: &Task, session_id: Option<&str>) {
        if !self.notify_status {
            return;
        }
        let Some(session_id) = session_id else {
            return;
        };
        let Some(session) = self.sessions.get(session_id).map(|s| s.value().clone()) else {
            trace!(session_id, "status notification suppressed: session detached");
            return;
        };
        let notification = TaskStatusNotification::from_task(task);
        tokio::spawn(async move {
            let params = match serde_json::to_value(&notification) {
                Ok(params) => params,
                Err(_) => return,
            };
            if let Err(err) = session
                .send_notification(methods::NOTIFICATION_TASK_STATUS, Some(params))
                .await
            {
                warn!(%err, task_id = %notification.task_id, "status notification not delivered");
            }
        });
    }

    async fn cancel_task(
        &self,
        task_id: &str,
        reason: Option<String>,
        session_id: Option<&str>,
    ) -> Result<Task> {
        let task = self.store.cancel(task_id, reason, session_id).await?;
        if let Some((_, token)) = self.executions.remove(task_id) {
            token.cancel();
        }
        self.emit_status(&task, session_id);
        Ok(task)
    }
}

/// Handle given to a task execution.
#[derive(Clone)]
pub struct TaskHandle {
    coordinator: Arc<TaskCoordinator>,
    task_id: String,
    session_id: Option<String>,
    cancellation: CancellationToken,
}

impl TaskHandle {
    /// The task's identifier.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Token tripped by TTL expiry, `tasks/cancel`, or session termination.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Refresh the task's status message while it keeps working.
    pub async fn set_message(&self, message: impl Into<String>) -> Result<()> {
        let task = self
            .coordinator
            .store
            .update_status(
                &self.task_id,
                TaskStatus::Working,
                Some(message.into()),
                self.session_id.as_deref(),
            )
            .await?;
        self.coordinator
            .emit_status(&task, self.session_id.as_deref());
        Ok(())
    }

    /// Run a nested requestor-facing call (task-aware sampling or
    /// elicitation) under the `input_required` status.
    ///
    /// The task transitions `working → input_required` for the duration of
    /// `nested` and back to `working` when it returns, regardless of its
    /// outcome, unless a terminal transition already occurred.
    pub async fn input_required_scope<T, F>(&self, nested: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let session = self.session_id.as_deref();
        match self
            .coordinator
            .store
            .update_status(&self.task_id, TaskStatus::InputRequired, None, session)
            .await
        {
            Ok(task) => self.coordinator.emit_status(&task, session),
            Err(err) => trace!(task_id = %self.task_id, %err, "input_required transition skipped"),
        }

        let output = nested.await;

        match self
            .coordinator
            .store
            .update_status(&self.task_id, TaskStatus::Working, None, session)
            .await
        {
            Ok(task) => self.coordinator.emit_status(&task, session),
            Err(err) => trace!(task_id = %self.task_id, %err, "working transition skipped"),
        }
        output
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let params = params.ok_or_else(|| Error::invalid_params("missing params"))?;
    serde_json::from_value(params).map_err(|e| Error::invalid_params(e.to_string()))
}

struct GetHandler(Arc<TaskCoordinator>);

#[async_trait]
impl RequestHandler for GetHandler {
    async fn handle(&self, ctx: RequestContext, params: Option<Value>) -> Result<Value> {
        let request: GetTaskRequest = parse_params(params)?;
        let session_id = ctx.session().session_id();
        let task = self
            .0
            .store
            .get(&request.task_id, session_id.as_deref())
            .await?;
        serde_json::to_value(task).map_err(Into::into)
    }
}

struct ResultHandler(Arc<TaskCoordinator>);

#[async_trait]
impl RequestHandler for ResultHandler {
    async fn handle(&self, ctx: RequestContext, params: Option<Value>) -> Result<Value> {
        let request: GetTaskRequest = parse_params(params)?;
        let session_id = ctx.session().session_id();
        // Block until terminal, then surface the stored outcome.
        self.0
            .store
            .wait_terminal(&request.task_id, session_id.as_deref())
            .await?;
        self.0
            .store
            .get_result(&request.task_id, session_id.as_deref())
            .await
    }
}

struct ListHandler(Arc<TaskCoordinator>);

#[async_trait]
impl RequestHandler for ListHandler {
    async fn handle(&self, ctx: RequestContext, params: Option<Value>) -> Result<Value> {
        let request: ListTasksRequest = match params {
            Some(params) => {
                serde_json::from_value(params).map_err(|e| Error::invalid_params(e.to_string()))?
            }
            None => ListTasksRequest::default(),
        };
        let session_id = ctx.session().session_id();
        let (tasks, next_cursor) = self
            .0
            .store
            .list(session_id.as_deref(), request.cursor.as_deref())
            .await?;
        serde_json::to_value(ListTasksResult { tasks, next_cursor }).map_err(Into::into)
    }
}

struct CancelHandler(Arc<TaskCoordinator>);

#[async_trait]
impl RequestHandler for CancelHandler {
    async fn handle(&self, ctx: RequestContext, params: Option<Value>) -> Result<Value> {
        let request: CancelTaskRequest = parse_params(params)?;
        let session_id = ctx.session().session_id();
        let task = self
            .0
            .cancel_task(&request.task_id, request.reason, session_id.as_deref())
            .await?;
        serde_json::to_value(task).map_err(Into::into)
    }
}
