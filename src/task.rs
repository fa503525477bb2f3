//! Task lifecycle around the RAG workflow.
//!
//! A submitted query becomes a task that moves through
//! `pending → working → completed | failed`. Transitions are monotonic:
//! once a task reaches a terminal state, later updates (including
//! cancellation) are ignored. Every transition appends a status event, so
//! the event log is an append-only history of the run.
//!
//! State lives in process memory. Restarting the service forgets all
//! tasks; callers are expected to resubmit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::Artifact;
use crate::workflow::Orchestrator;

const WORKING_MESSAGE: &str = "Searching the knowledge base for relevant information...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Working,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// One entry in a task's append-only status history.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    pub state: TaskState,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Caller-visible snapshot of a task.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub task_id: String,
    pub context_id: String,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub events: Vec<TaskEvent>,
    pub artifact: Option<Artifact>,
    pub error: Option<String>,
}

struct TaskEntry {
    task: Task,
    cancel: Arc<AtomicBool>,
}

/// Runs submitted queries through the orchestrator as background tasks and
/// tracks their lifecycle.
pub struct TaskExecutor {
    orchestrator: Arc<Orchestrator>,
    tasks: Arc<RwLock<HashMap<String, TaskEntry>>>,
}

impl TaskExecutor {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new task and start processing it in the background.
    ///
    /// Returns the task's initial snapshot immediately; callers poll
    /// [`TaskExecutor::get`] for progress. An empty query fails the task
    /// before any background work is spawned.
    pub fn submit(&self, query: &str, context_id: Option<String>) -> Task {
        let task_id = Uuid::new_v4().to_string();
        let context_id = context_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();

        let task = Task {
            task_id: task_id.clone(),
            context_id,
            state: TaskState::Pending,
            created_at: now,
            events: vec![TaskEvent {
                state: TaskState::Pending,
                message: "task created".to_string(),
                timestamp: now,
            }],
            artifact: None,
            error: None,
        };
        let cancel = Arc::new(AtomicBool::new(false));

        {
            let mut tasks = self.tasks.write().unwrap();
            tasks.insert(
                task_id.clone(),
                TaskEntry {
                    task: task.clone(),
                    cancel: cancel.clone(),
                },
            );
        }
        info!(task_id = %task_id, "task submitted");

        if query.trim().is_empty() {
            self.transition(
                &task_id,
                TaskState::Failed,
                "invalid input: query must not be empty",
                None,
                Some("invalid input: query must not be empty".to_string()),
            );
            return self.get(&task_id).unwrap_or(task);
        }

        let orchestrator = self.orchestrator.clone();
        let tasks = self.tasks.clone();
        let query = query.to_string();
        let spawn_id = task_id.clone();

        tokio::spawn(async move {
            let executor = ExecutorHandle { tasks };

            if cancel.load(Ordering::SeqCst) {
                executor.transition(
                    &spawn_id,
                    TaskState::Failed,
                    "task cancelled",
                    None,
                    Some(RagError::Cancelled.to_string()),
                );
                return;
            }

            executor.transition(&spawn_id, TaskState::Working, WORKING_MESSAGE, None, None);

            let state = orchestrator.run(&query, vec![]).await;

            if cancel.load(Ordering::SeqCst) {
                executor.transition(
                    &spawn_id,
                    TaskState::Failed,
                    "task cancelled",
                    None,
                    Some(RagError::Cancelled.to_string()),
                );
                return;
            }

            match (state.answer, state.error) {
                (Some(answer), None) => {
                    let artifact = Artifact {
                        answer,
                        sources: state.sources,
                    };
                    executor.transition(
                        &spawn_id,
                        TaskState::Completed,
                        "task completed",
                        Some(artifact),
                        None,
                    );
                }
                (_, error) => {
                    let summary = error.unwrap_or_else(|| "unknown error".to_string());
                    let message = summary.clone();
                    executor.transition(&spawn_id, TaskState::Failed, &message, None, Some(summary));
                }
            }
        });

        self.get(&task_id).unwrap_or(task)
    }

    /// Snapshot of a task by id.
    pub fn get(&self, task_id: &str) -> Result<Task> {
        let tasks = self.tasks.read().unwrap();
        tasks
            .get(task_id)
            .map(|entry| entry.task.clone())
            .ok_or_else(|| RagError::TaskNotFound(task_id.to_string()))
    }

    /// Request cancellation. Best effort: a task already in a terminal
    /// state is returned unchanged, and a task mid-flight fails at the
    /// next cancellation check rather than being interrupted.
    pub fn cancel(&self, task_id: &str) -> Result<Task> {
        {
            let tasks = self.tasks.read().unwrap();
            let entry = tasks
                .get(task_id)
                .ok_or_else(|| RagError::TaskNotFound(task_id.to_string()))?;
            entry.cancel.store(true, Ordering::SeqCst);
        }

        self.transition(
            task_id,
            TaskState::Failed,
            "task cancelled",
            None,
            Some(RagError::Cancelled.to_string()),
        );
        self.get(task_id)
    }

    fn transition(
        &self,
        task_id: &str,
        state: TaskState,
        message: &str,
        artifact: Option<Artifact>,
        error: Option<String>,
    ) {
        ExecutorHandle {
            tasks: self.tasks.clone(),
        }
        .transition(task_id, state, message, artifact, error);
    }
}

/// Shared map handle usable from spawned tasks.
struct ExecutorHandle {
    tasks: Arc<RwLock<HashMap<String, TaskEntry>>>,
}

impl ExecutorHandle {
    fn transition(
        &self,
        task_id: &str,
        state: TaskState,
        message: &str,
        artifact: Option<Artifact>,
        error: Option<String>,
    ) {
        let mut tasks = self.tasks.write().unwrap();
        let Some(entry) = tasks.get_mut(task_id) else {
            warn!(task_id, "transition for unknown task dropped");
            return;
        };

        // Terminal states are final; late updates are dropped, not applied.
        if entry.task.state.is_terminal() {
            return;
        }

        entry.task.state = state;
        entry.task.events.push(TaskEvent {
            state,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
        if artifact.is_some() {
            entry.task.artifact = artifact;
        }
        if error.is_some() {
            entry.task.error = error;
        }

        info!(task_id, state = ?state, "task transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as RagResult;
    use crate::gateway::memory::InMemoryVectorStore;
    use crate::gateway::{LanguageGateway, VectorRecord, VectorStore};
    use crate::retriever::Retriever;
    use crate::retry::BackoffPolicy;
    use crate::synthesize::Synthesizer;
    use crate::workflow::OrchestratorSettings;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Gateway whose generation call sleeps, so tests can observe
    /// intermediate task states.
    struct SlowGateway {
        delay: Duration,
    }

    #[async_trait]
    impl LanguageGateway for SlowGateway {
        async fn embed(&self, _: &str) -> RagResult<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        async fn generate(&self, _: &str, _: u32, _: f32) -> RagResult<String> {
            tokio::time::sleep(self.delay).await;
            Ok("a grounded answer".to_string())
        }
    }

    async fn executor(delay: Duration) -> TaskExecutor {
        let gateway: Arc<dyn LanguageGateway> = Arc::new(SlowGateway { delay });
        let store = Arc::new(InMemoryVectorStore::new("test"));
        store
            .insert(&[VectorRecord {
                chunk_id: "c0".to_string(),
                vector: vec![1.0, 0.0],
                text: "relevant context".to_string(),
                source_path: "doc.txt".to_string(),
            }])
            .await
            .unwrap();

        let backoff = BackoffPolicy::new(2, Duration::from_millis(1));
        let orchestrator = Orchestrator::new(
            Retriever::new(gateway.clone(), store, backoff),
            Synthesizer::new(gateway, backoff, 256, 0.7),
            OrchestratorSettings {
                top_k: 3,
                score_threshold: 0.5,
                max_context_chars: 4000,
                max_query_chars: 1000,
            },
        );
        TaskExecutor::new(Arc::new(orchestrator))
    }

    async fn wait_terminal(executor: &TaskExecutor, task_id: &str) -> Task {
        for _ in 0..200 {
            let task = executor.get(task_id).unwrap();
            if task.state.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {task_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn successful_task_runs_to_completed_with_artifact() {
        let executor = executor(Duration::ZERO).await;
        let task = executor.submit("what is in the context?", None);
        assert_eq!(task.state, TaskState::Pending);

        let done = wait_terminal(&executor, &task.task_id).await;
        assert_eq!(done.state, TaskState::Completed);
        let artifact = done.artifact.unwrap();
        assert_eq!(artifact.answer, "a grounded answer");
        assert_eq!(artifact.sources.len(), 1);
        assert!(done.error.is_none());

        // pending → working → completed, one event each.
        let states: Vec<TaskState> = done.events.iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![TaskState::Pending, TaskState::Working, TaskState::Completed]
        );
    }

    #[tokio::test]
    async fn empty_query_fails_without_background_work() {
        let executor = executor(Duration::ZERO).await;
        let task = executor.submit("   ", None);

        assert_eq!(task.state, TaskState::Failed);
        assert!(task.error.unwrap().contains("must not be empty"));
        assert!(task.artifact.is_none());
    }

    #[tokio::test]
    async fn get_unknown_task_is_not_found() {
        let executor = executor(Duration::ZERO).await;
        let err = executor.get("no-such-task").unwrap_err();
        assert!(matches!(err, RagError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn cancel_marks_running_task_failed() {
        let executor = executor(Duration::from_secs(5)).await;
        let task = executor.submit("slow question", None);

        let cancelled = executor.cancel(&task.task_id).unwrap();
        assert_eq!(cancelled.state, TaskState::Failed);
        assert_eq!(cancelled.error.as_deref(), Some("task cancelled"));
    }

    #[tokio::test]
    async fn terminal_task_ignores_later_transitions() {
        let executor = executor(Duration::ZERO).await;
        let task = executor.submit("question", None);
        let done = wait_terminal(&executor, &task.task_id).await;
        assert_eq!(done.state, TaskState::Completed);

        // Cancellation after completion changes nothing.
        let after = executor.cancel(&task.task_id).unwrap();
        assert_eq!(after.state, TaskState::Completed);
        assert_eq!(after.events.len(), done.events.len());
        assert!(after.error.is_none());
    }

    #[tokio::test]
    async fn context_id_is_preserved_when_supplied() {
        let executor = executor(Duration::ZERO).await;
        let task = executor.submit("question", Some("ctx-42".to_string()));
        assert_eq!(task.context_id, "ctx-42");
    }

    #[tokio::test]
    async fn event_log_only_grows() {
        let executor = executor(Duration::from_millis(50)).await;
        let task = executor.submit("question", None);

        let mut last_len = 0;
        loop {
            let snapshot = executor.get(&task.task_id).unwrap();
            assert!(snapshot.events.len() >= last_len);
            last_len = snapshot.events.len();
            if snapshot.state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
