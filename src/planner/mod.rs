//! Schedule state: tasks, todos, the action vocabulary, and how batches apply.

pub mod action;
pub mod import;
pub mod model;
pub mod reducer;
pub mod resolver;
pub mod stats;
pub mod store;

pub use action::{Action, CreateSpec, EntityPatch};
pub use model::{EntityId, Priority, Subtask, Task, Todo, TodoSection, todo_sections};
pub use reducer::{ApplySummary, Schedule, apply};
pub use resolver::{EntityPool, Resolution, resolve};
pub use stats::DayStats;
pub use store::PlannerStore;
