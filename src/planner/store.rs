//! Shared owner of the live schedule.
//!
//! Every mutation, whether it comes from an assistant batch or a direct user
//! action, goes through the same async mutex, so a delete from the UI cannot
//! race an assistant update to the same id. Sessions that resolve titles hold
//! the guard across resolve and apply, which makes each batch observe every
//! batch applied before it.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use super::action::Action;
use super::model::{EntityId, Priority, Task, Todo};
use super::reducer::{ApplySummary, Schedule};

/// Cloneable handle to the schedule.
#[derive(Debug, Clone, Default)]
pub struct PlannerStore {
    inner: Arc<Mutex<Schedule>>,
}

impl PlannerStore {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            inner: Arc::new(Mutex::new(schedule)),
        }
    }

    /// Exclusive access for a resolve-then-apply sequence.
    pub async fn lock(&self) -> MutexGuard<'_, Schedule> {
        self.inner.lock().await
    }

    /// Copy of the current collections.
    pub async fn snapshot(&self) -> Schedule {
        self.inner.lock().await.clone()
    }

    /// Apply an assistant or import batch.
    pub async fn apply(&self, actions: &[Action]) -> ApplySummary {
        let mut schedule = self.inner.lock().await;
        let summary = schedule.apply(actions);
        info!(
            applied = summary.applied,
            skipped = summary.skipped,
            tasks = schedule.tasks.len(),
            todos = schedule.todos.len(),
            "applied action batch"
        );
        summary
    }

    /// Add an anytime todo typed by the user.
    pub async fn add_todo(&self, title: &str, priority: Priority) -> Option<EntityId> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        let todo = Todo {
            priority,
            ..Todo::new(title)
        };
        let id = todo.id.clone();
        self.inner.lock().await.todos.push(todo);
        Some(id)
    }

    /// Flip a todo's done flag. Returns the new value, or `None` if absent.
    pub async fn toggle_todo(&self, id: &EntityId) -> Option<bool> {
        let mut schedule = self.inner.lock().await;
        let todo = schedule.todos.iter_mut().find(|t| &t.id == id)?;
        todo.done = !todo.done;
        Some(todo.done)
    }

    pub async fn delete_todo(&self, id: &EntityId) -> bool {
        let mut schedule = self.inner.lock().await;
        let before = schedule.todos.len();
        schedule.todos.retain(|t| &t.id != id);
        before != schedule.todos.len()
    }

    /// Finish a task: it leaves the timeline.
    pub async fn complete_task(&self, id: &EntityId) -> Option<Task> {
        let mut schedule = self.inner.lock().await;
        let pos = schedule.tasks.iter().position(|t| &t.id == id)?;
        Some(schedule.tasks.remove(pos))
    }

    /// Flip a subtask's done flag. Returns the new value, or `None` if absent.
    pub async fn toggle_subtask(&self, task_id: &EntityId, subtask_id: &EntityId) -> Option<bool> {
        let mut schedule = self.inner.lock().await;
        let subtask = schedule
            .tasks
            .iter_mut()
            .find(|t| &t.id == task_id)?
            .subtasks
            .iter_mut()
            .find(|s| &s.id == subtask_id)?;
        subtask.done = !subtask.done;
        Some(subtask.done)
    }
}
