//! Folds action batches into the task and todo collections.
//!
//! The reducer never fails. Anything it cannot interpret (a create without a
//! title, an update or delete whose id no longer exists) is skipped and the
//! rest of the batch still applies, in order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::action::{Action, CreateSpec, EntityPatch};
use super::model::{
    DEFAULT_DURATION_MINUTES, DEFAULT_TASK_COLOR, DEFAULT_TASK_ICON, DEFAULT_TODO_ICON, EntityId,
    Subtask, Task, Todo, is_timed,
};
use super::resolver::EntityPool;

/// Both collections owned together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub todos: Vec<Todo>,
}

/// How many actions of a batch changed something.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub applied: usize,
    pub skipped: usize,
}

impl Schedule {
    pub fn new(tasks: Vec<Task>, todos: Vec<Todo>) -> Self {
        Self { tasks, todos }
    }

    /// Resolution view over the current contents.
    pub fn pool(&self) -> EntityPool<'_> {
        EntityPool::new(&self.tasks, &self.todos)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.todos.is_empty()
    }

    /// Apply `actions` in order.
    pub fn apply(&mut self, actions: &[Action]) -> ApplySummary {
        let mut summary = ApplySummary::default();
        for action in actions {
            if self.apply_one(action) {
                summary.applied += 1;
            } else {
                debug!(kind = action.kind(), "action skipped");
                summary.skipped += 1;
            }
        }
        summary
    }

    fn apply_one(&mut self, action: &Action) -> bool {
        match action {
            Action::ClearAll => {
                self.tasks.clear();
                self.todos.clear();
                true
            }
            Action::Create(spec) => self.create(spec),
            Action::Update { id, updates } => self.update(id, updates),
            Action::Delete { id } => self.delete(id),
        }
    }

    fn create(&mut self, spec: &CreateSpec) -> bool {
        let title = spec.title.trim();
        if title.is_empty() {
            return false;
        }
        if is_timed(spec.start_time.as_deref()) {
            self.tasks.push(task_from_spec(title, spec));
        } else {
            self.todos.push(Todo {
                id: EntityId::mint(),
                title: title.to_owned(),
                done: false,
                icon: non_blank(spec.icon.as_deref()).unwrap_or(DEFAULT_TODO_ICON).to_owned(),
                priority: spec.priority.unwrap_or_default(),
            });
        }
        true
    }

    fn update(&mut self, id: &EntityId, patch: &EntityPatch) -> bool {
        if let Some(pos) = self.tasks.iter().position(|t| &t.id == id) {
            let clears_time = matches!(&patch.start_time, Some(t) if !is_timed(t.as_deref()));
            if clears_time {
                let task = self.tasks.remove(pos);
                self.todos.push(todo_from_task(task, patch));
            } else {
                merge_task(&mut self.tasks[pos], patch);
            }
            return true;
        }
        if let Some(pos) = self.todos.iter().position(|t| &t.id == id) {
            let new_time = match &patch.start_time {
                Some(Some(t)) if is_timed(Some(t.as_str())) => Some(t.trim().to_owned()),
                _ => None,
            };
            match new_time {
                Some(start_time) => {
                    let todo = self.todos.remove(pos);
                    self.tasks.push(task_from_todo(todo, start_time, patch));
                }
                None => merge_todo(&mut self.todos[pos], patch),
            }
            return true;
        }
        false
    }

    /// Removes the same entity `update` would touch: the first task with
    /// `id`, else the first todo.
    fn delete(&mut self, id: &EntityId) -> bool {
        if let Some(pos) = self.tasks.iter().position(|t| &t.id == id) {
            self.tasks.remove(pos);
            return true;
        }
        if let Some(pos) = self.todos.iter().position(|t| &t.id == id) {
            self.todos.remove(pos);
            return true;
        }
        false
    }
}

/// Pure form of [`Schedule::apply`]: returns new collections, inputs untouched.
pub fn apply(actions: &[Action], tasks: &[Task], todos: &[Todo]) -> (Vec<Task>, Vec<Todo>) {
    let mut schedule = Schedule::new(tasks.to_vec(), todos.to_vec());
    schedule.apply(actions);
    (schedule.tasks, schedule.todos)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn task_from_spec(title: &str, spec: &CreateSpec) -> Task {
    Task {
        id: EntityId::mint(),
        title: title.to_owned(),
        start_time: spec.start_time.as_deref().map(|s| s.trim().to_owned()),
        duration: spec.duration.unwrap_or(DEFAULT_DURATION_MINUTES),
        icon: non_blank(spec.icon.as_deref()).unwrap_or(DEFAULT_TASK_ICON).to_owned(),
        color: non_blank(spec.color.as_deref()).unwrap_or(DEFAULT_TASK_COLOR).to_owned(),
        subtasks: spec
            .subtasks
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(Subtask::new)
            .collect(),
        done: false,
    }
}

fn merge_task(task: &mut Task, patch: &EntityPatch) {
    if let Some(title) = non_blank(patch.title.as_deref()) {
        task.title = title.trim().to_owned();
    }
    if let Some(Some(start)) = &patch.start_time {
        task.start_time = Some(start.trim().to_owned());
    }
    if let Some(duration) = patch.duration {
        task.duration = duration;
    }
    if let Some(icon) = non_blank(patch.icon.as_deref()) {
        task.icon = icon.to_owned();
    }
    if let Some(color) = non_blank(patch.color.as_deref()) {
        task.color = color.to_owned();
    }
    if let Some(done) = patch.done {
        task.done = done;
    }
}

fn merge_todo(todo: &mut Todo, patch: &EntityPatch) {
    if let Some(title) = non_blank(patch.title.as_deref()) {
        todo.title = title.trim().to_owned();
    }
    if let Some(icon) = non_blank(patch.icon.as_deref()) {
        todo.icon = icon.to_owned();
    }
    if let Some(done) = patch.done {
        todo.done = done;
    }
    if let Some(priority) = patch.priority {
        todo.priority = priority;
    }
}

fn todo_from_task(task: Task, patch: &EntityPatch) -> Todo {
    let mut todo = Todo {
        id: task.id,
        title: task.title,
        done: task.done,
        icon: task.icon,
        priority: Default::default(),
    };
    merge_todo(&mut todo, patch);
    todo
}

fn task_from_todo(todo: Todo, start_time: String, patch: &EntityPatch) -> Task {
    let icon = if todo.icon == DEFAULT_TODO_ICON {
        DEFAULT_TASK_ICON.to_owned()
    } else {
        todo.icon
    };
    let mut task = Task {
        id: todo.id,
        title: todo.title,
        start_time: Some(start_time),
        duration: DEFAULT_DURATION_MINUTES,
        icon,
        color: DEFAULT_TASK_COLOR.to_owned(),
        subtasks: Vec::new(),
        done: todo.done,
    };
    merge_task(&mut task, patch);
    task
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::planner::model::Priority;

    fn task(id: &str, title: &str, at: &str) -> Task {
        let mut t = Task::new(title, at);
        t.id = EntityId::from(id);
        t
    }

    fn todo(id: &str, title: &str) -> Todo {
        let mut t = Todo::new(title);
        t.id = EntityId::from(id);
        t
    }

    fn update(id: &str, patch: serde_json::Value) -> Action {
        Action::Update {
            id: EntityId::from(id),
            updates: serde_json::from_value(patch).unwrap(),
        }
    }

    #[test]
    fn timed_create_lands_in_tasks_with_defaults() {
        let (tasks, todos) = apply(
            &[Action::Create(CreateSpec::titled("Gym").at("18:00"))],
            &[],
            &[],
        );
        assert!(todos.is_empty());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].duration, DEFAULT_DURATION_MINUTES);
        assert_eq!(tasks[0].icon, DEFAULT_TASK_ICON);
        assert_eq!(tasks[0].color, DEFAULT_TASK_COLOR);
    }

    #[test]
    fn untimed_create_lands_in_todos() {
        for start in [None, Some(String::new()), Some("  ".to_owned())] {
            let spec = CreateSpec {
                title: "Water plants".to_owned(),
                start_time: start,
                ..CreateSpec::default()
            };
            let (tasks, todos) = apply(&[Action::Create(spec)], &[], &[]);
            assert!(tasks.is_empty());
            assert_eq!(todos.len(), 1);
            assert_eq!(todos[0].priority, Priority::None);
            assert_eq!(todos[0].icon, DEFAULT_TODO_ICON);
        }
    }

    #[test]
    fn create_expands_subtasks_with_fresh_ids() {
        let spec = CreateSpec {
            subtasks: vec!["Kitchen".into(), "  ".into(), "Bathroom".into()],
            ..CreateSpec::titled("Clean").at("10:00")
        };
        let (tasks, _) = apply(&[Action::Create(spec)], &[], &[]);
        let subtasks = &tasks[0].subtasks;
        assert_eq!(subtasks.len(), 2);
        assert_ne!(subtasks[0].id, subtasks[1].id);
        assert!(subtasks.iter().all(|s| !s.done));
    }

    #[test]
    fn create_without_title_is_dropped() {
        let (tasks, todos) = apply(
            &[Action::Create(CreateSpec::titled("   ").at("09:00"))],
            &[],
            &[],
        );
        assert!(tasks.is_empty());
        assert!(todos.is_empty());
    }

    #[test]
    fn clear_all_then_create_keeps_only_new_task() {
        let tasks = vec![task("1", "Morning Routine", "08:00")];
        let todos = vec![todo("2", "Call mom")];
        let (tasks, todos) = apply(
            &[
                Action::ClearAll,
                Action::Create(CreateSpec::titled("X").at("09:00")),
            ],
            &tasks,
            &todos,
        );
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "X");
        assert!(todos.is_empty());
    }

    #[test]
    fn update_of_missing_id_changes_nothing() {
        let tasks = vec![task("1", "Deep Work", "09:00")];
        let todos = vec![todo("2", "Call mom")];
        let (t2, d2) = apply(&[update("404", serde_json::json!({"title": "x"}))], &tasks, &todos);
        assert_eq!(t2, tasks);
        assert_eq!(d2, todos);
    }

    #[test]
    fn update_merges_shallowly() {
        let tasks = vec![task("1", "Deep Work", "09:00")];
        let (tasks, _) = apply(
            &[update("1", serde_json::json!({"startTime": "10:00", "done": true}))],
            &tasks,
            &[],
        );
        assert_eq!(tasks[0].title, "Deep Work");
        assert_eq!(tasks[0].start_time.as_deref(), Some("10:00"));
        assert!(tasks[0].done);
        assert_eq!(tasks[0].duration, DEFAULT_DURATION_MINUTES);
    }

    #[test]
    fn update_reaches_todos() {
        let todos = vec![todo("2", "Call mom")];
        let (_, todos) = apply(
            &[update("2", serde_json::json!({"done": true, "priority": "high"}))],
            &[],
            &todos,
        );
        assert!(todos[0].done);
        assert_eq!(todos[0].priority, Priority::High);
    }

    #[test]
    fn giving_a_todo_a_time_moves_it_to_tasks() {
        let todos = vec![todo("2", "Call mom")];
        let (tasks, todos) = apply(
            &[update("2", serde_json::json!({"startTime": "16:00"}))],
            &[],
            &todos,
        );
        assert!(todos.is_empty());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, EntityId::from("2"));
        assert_eq!(tasks[0].start_time.as_deref(), Some("16:00"));
        assert_eq!(tasks[0].icon, DEFAULT_TASK_ICON);
    }

    #[test]
    fn clearing_a_task_time_moves_it_to_todos() {
        let tasks = vec![task("1", "Deep Work", "09:00")];
        let (tasks, todos) = apply(
            &[update("1", serde_json::json!({"startTime": null}))],
            &tasks,
            &[],
        );
        assert!(tasks.is_empty());
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, EntityId::from("1"));
        assert_eq!(todos[0].title, "Deep Work");
    }

    #[test]
    fn delete_removes_from_either_collection() {
        let tasks = vec![task("1", "Deep Work", "09:00")];
        let todos = vec![todo("2", "Call mom")];
        let (t, d) = apply(
            &[
                Action::Delete { id: EntityId::from("2") },
                Action::Delete { id: EntityId::from("1") },
                Action::Delete { id: EntityId::from("3") },
            ],
            &tasks,
            &todos,
        );
        assert!(t.is_empty());
        assert!(d.is_empty());
    }

    #[test]
    fn shared_id_update_and_delete_hit_the_same_entity() {
        let tasks = vec![task("7", "Deep Work", "09:00")];
        let todos = vec![todo("7", "Call mom")];

        let (t, d) = apply(&[update("7", serde_json::json!({"title": "Focus"}))], &tasks, &todos);
        assert_eq!(t[0].title, "Focus");
        assert_eq!(d[0].title, "Call mom");

        let (t, d) = apply(&[Action::Delete { id: EntityId::from("7") }], &tasks, &todos);
        assert!(t.is_empty());
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].title, "Call mom");

        let (t, d) = apply(
            &[
                Action::Delete { id: EntityId::from("7") },
                Action::Delete { id: EntityId::from("7") },
            ],
            &tasks,
            &todos,
        );
        assert!(t.is_empty() && d.is_empty());
    }

    #[test]
    fn batches_are_order_dependent() {
        let base = vec![task("1", "Deep Work", "09:00")];
        let rename = [update("1", serde_json::json!({"title": "Focus"}))];
        let remove = [Action::Delete { id: EntityId::from("1") }];

        let (t1, d1) = apply(&rename, &base, &[]);
        let (t1, _) = apply(&remove, &t1, &d1);
        assert!(t1.is_empty());

        let (t2, d2) = apply(&remove, &base, &[]);
        let (t2, _) = apply(&rename, &t2, &d2);
        assert!(t2.is_empty());

        let create = [Action::Create(CreateSpec::titled("A").at("08:00"))];
        let clear = [Action::ClearAll];
        let (a, b) = apply(&create, &[], &[]);
        let (after_create_then_clear, _) = apply(&clear, &a, &b);
        let (c, d) = apply(&clear, &[], &[]);
        let (after_clear_then_create, _) = apply(&create, &c, &d);
        assert!(after_create_then_clear.is_empty());
        assert_eq!(after_clear_then_create.len(), 1);
    }

    #[test]
    fn sequential_batches_equal_concatenated_batch() {
        let base_tasks = vec![task("1", "Deep Work", "09:00")];
        let base_todos = vec![todo("2", "Call mom")];
        let first = vec![update("1", serde_json::json!({"duration": 60}))];
        let second = vec![Action::Delete { id: EntityId::from("2") }];

        let (t, d) = apply(&first, &base_tasks, &base_todos);
        let (t, d) = apply(&second, &t, &d);

        let mut joined = first.clone();
        joined.extend(second);
        let (tj, dj) = apply(&joined, &base_tasks, &base_todos);
        assert_eq!(t, tj);
        assert_eq!(d, dj);
    }

    #[test]
    fn summary_counts_skips() {
        let mut schedule = Schedule::default();
        let summary = schedule.apply(&[
            Action::Create(CreateSpec::titled("A")),
            Action::Delete { id: EntityId::from("missing") },
            Action::Create(CreateSpec::titled("")),
        ]);
        assert_eq!(summary, ApplySummary { applied: 1, skipped: 2 });
    }
}
