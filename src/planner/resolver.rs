//! Maps a spoken or typed title fragment to an entity id.
//!
//! Matching is a case-insensitive substring test against each title, tasks
//! before todos, each in collection order. The first hit wins; there is no
//! similarity ranking. Two items whose titles both contain the fragment
//! ("Call mom" / "Call mom back") always resolve to the earlier one, so
//! callers that know the exact id should pass it instead of a title.

use super::model::{EntityId, Task, Todo};

/// Borrowed view over both collections in resolution order.
#[derive(Debug, Clone, Copy)]
pub struct EntityPool<'a> {
    pub tasks: &'a [Task],
    pub todos: &'a [Todo],
}

impl<'a> EntityPool<'a> {
    pub fn new(tasks: &'a [Task], todos: &'a [Todo]) -> Self {
        Self { tasks, todos }
    }

    /// `(id, title)` pairs, tasks first.
    pub fn entries(self) -> impl Iterator<Item = (&'a EntityId, &'a str)> + 'a {
        let tasks = self.tasks.iter().map(|t| (&t.id, t.title.as_str()));
        let todos = self.todos.iter().map(|t| (&t.id, t.title.as_str()));
        tasks.chain(todos)
    }

    pub fn contains(self, id: &EntityId) -> bool {
        self.entries().any(|(candidate, _)| candidate == id)
    }
}

/// Outcome of a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(EntityId),
    NotFound,
}

impl Resolution {
    pub fn id(self) -> Option<EntityId> {
        match self {
            Self::Found(id) => Some(id),
            Self::NotFound => None,
        }
    }
}

/// Find the first entity whose title contains `fragment`, ignoring case.
///
/// A blank fragment never matches.
pub fn resolve(fragment: &str, pool: EntityPool<'_>) -> Resolution {
    let needle = fragment.trim().to_lowercase();
    if needle.is_empty() {
        return Resolution::NotFound;
    }
    pool.entries()
        .find(|(_, title)| title.to_lowercase().contains(&needle))
        .map(|(id, _)| Resolution::Found(id.clone()))
        .unwrap_or(Resolution::NotFound)
}
