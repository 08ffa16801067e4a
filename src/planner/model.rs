//! Tasks, todos, and the helpers the day view needs.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Duration applied to scheduled tasks when none is given, in minutes.
pub const DEFAULT_DURATION_MINUTES: u32 = 30;
/// Icon for tasks created without one.
pub const DEFAULT_TASK_ICON: &str = "📅";
/// Background color for tasks created without one.
pub const DEFAULT_TASK_COLOR: &str = "#dddddd";
/// Marker icon for anytime todos created without one.
pub const DEFAULT_TODO_ICON: &str = "•";

/// Opaque identifier of a task, todo, or subtask.
///
/// Freshly minted ids are UUID v4 strings. Ids that come from elsewhere
/// (imports, fixtures) are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Mint a new id, unique for the lifetime of the process.
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Priority bucket of an anytime todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
    #[default]
    None,
}

impl Priority {
    /// Sections of the anytime list, in display order.
    pub const ALL: [Priority; 4] = [Self::High, Self::Medium, Self::Low, Self::None];

    /// Case-insensitive name lookup. Unknown names give `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "none" | "" => Some(Self::None),
            _ => None,
        }
    }

    /// Heading of this priority's section.
    pub fn heading(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::None => "TO-DO",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::None => write!(f, "none"),
        }
    }
}

/// A checklist item owned by a [`Task`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub done: bool,
}

impl Subtask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: EntityId::mint(),
            title: title.into(),
            done: false,
        }
    }
}

/// A task scheduled at a time of day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    pub title: String,
    /// `HH:MM`, 24h.
    pub start_time: Option<String>,
    /// Minutes, always positive.
    pub duration: u32,
    pub icon: String,
    pub color: String,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub done: bool,
}

impl Task {
    /// A task with default duration, icon, and color.
    pub fn new(title: impl Into<String>, start_time: impl Into<String>) -> Self {
        Self {
            id: EntityId::mint(),
            title: title.into(),
            start_time: Some(start_time.into()),
            duration: DEFAULT_DURATION_MINUTES,
            icon: DEFAULT_TASK_ICON.to_owned(),
            color: DEFAULT_TASK_COLOR.to_owned(),
            subtasks: Vec::new(),
            done: false,
        }
    }

    /// Parsed start time, if the stored string is a valid `HH:MM`.
    pub fn start(&self) -> Option<NaiveTime> {
        self.start_time.as_deref().and_then(parse_clock)
    }

    /// `HH:MM` at which the task ends, wrapping past midnight.
    pub fn end_time(&self) -> Option<String> {
        let start = self.start()?;
        let end = start + chrono::Duration::minutes(i64::from(self.duration));
        Some(end.format("%H:%M").to_string())
    }

    /// Which part of the day the task falls into.
    pub fn day_part(&self) -> Option<DayPart> {
        self.start_time.as_deref().and_then(DayPart::of)
    }
}

/// An anytime item with no slot on the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default = "default_todo_icon")]
    pub icon: String,
    #[serde(default)]
    pub priority: Priority,
}

fn default_todo_icon() -> String {
    DEFAULT_TODO_ICON.to_owned()
}

impl Todo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: EntityId::mint(),
            title: title.into(),
            done: false,
            icon: default_todo_icon(),
            priority: Priority::None,
        }
    }
}

/// Whether a start time places an item on the timeline.
///
/// Absent, empty, and whitespace-only values all mean "anytime".
pub fn is_timed(start_time: Option<&str>) -> bool {
    start_time.is_some_and(|s| !s.trim().is_empty())
}

/// Parse a `HH:MM` clock string.
pub fn parse_clock(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Morning / day / evening grouping used by the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPart {
    /// Before 12:00.
    Morning,
    /// 12:00 to 17:59.
    Day,
    /// 18:00 onwards.
    Evening,
}

impl DayPart {
    /// Classify a `HH:MM` string. Comparison is lexicographic, as zero-padded
    /// 24h strings sort the same as the times they denote.
    pub fn of(start_time: &str) -> Option<Self> {
        let s = start_time.trim();
        if s.is_empty() {
            return None;
        }
        Some(if s < "12:00" {
            Self::Morning
        } else if s < "18:00" {
            Self::Day
        } else {
            Self::Evening
        })
    }
}

impl std::fmt::Display for DayPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Morning => "Morning",
            Self::Day => "Day",
            Self::Evening => "Evening",
        })
    }
}

/// Tasks ordered by start time; untimed tasks go last, ties keep their order.
pub fn sorted_by_start(tasks: &[Task]) -> Vec<Task> {
    let mut sorted = tasks.to_vec();
    sorted.sort_by(|a, b| match (&a.start_time, &b.start_time) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    sorted
}

/// Open todos of one priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoSection<'a> {
    pub priority: Priority,
    pub items: Vec<&'a Todo>,
}

/// Open todos grouped by priority (high, medium, low, then unprioritized),
/// followed by every completed todo regardless of priority. Sections are
/// always present, possibly empty; items keep their list order.
pub fn todo_sections(todos: &[Todo]) -> (Vec<TodoSection<'_>>, Vec<&Todo>) {
    let sections = Priority::ALL
        .into_iter()
        .map(|priority| TodoSection {
            priority,
            items: todos
                .iter()
                .filter(|t| !t.done && t.priority == priority)
                .collect(),
        })
        .collect();
    let completed = todos.iter().filter(|t| t.done).collect();
    (sections, completed)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn minted_ids_are_unique() {
        let a = EntityId::mint();
        let b = EntityId::mint();
        assert_ne!(a, b);
    }

    #[test]
    fn task_serializes_camel_case() {
        let task = Task::new("Deep Work", "09:00");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["startTime"], "09:00");
        assert_eq!(json["duration"], 30);
        assert!(json.get("start_time").is_none());
    }

    #[test]
    fn todo_deserializes_with_defaults() {
        let todo: Todo = serde_json::from_str(r#"{"id":"2","title":"Call mom"}"#).unwrap();
        assert_eq!(todo.id, EntityId::from("2"));
        assert!(!todo.done);
        assert_eq!(todo.priority, Priority::None);
        assert_eq!(todo.icon, DEFAULT_TODO_ICON);
    }

    #[test]
    fn is_timed_rejects_blank() {
        assert!(is_timed(Some("09:00")));
        assert!(!is_timed(Some("")));
        assert!(!is_timed(Some("   ")));
        assert!(!is_timed(None));
    }

    #[test]
    fn end_time_wraps_midnight() {
        let mut task = Task::new("Late show", "23:30");
        task.duration = 90;
        assert_eq!(task.end_time().as_deref(), Some("01:00"));
    }

    #[test]
    fn end_time_none_for_malformed_start() {
        let task = Task::new("Odd", "soon");
        assert!(task.end_time().is_none());
    }

    #[test]
    fn day_parts() {
        assert_eq!(DayPart::of("08:00"), Some(DayPart::Morning));
        assert_eq!(DayPart::of("11:59"), Some(DayPart::Morning));
        assert_eq!(DayPart::of("12:00"), Some(DayPart::Day));
        assert_eq!(DayPart::of("17:59"), Some(DayPart::Day));
        assert_eq!(DayPart::of("18:00"), Some(DayPart::Evening));
        assert_eq!(DayPart::of(""), None);
    }

    #[test]
    fn sorted_by_start_orders_by_clock() {
        let tasks = vec![
            Task::new("Lunch", "12:30"),
            Task::new("Morning", "08:00"),
            Task::new("Work", "09:00"),
        ];
        let titles: Vec<_> = sorted_by_start(&tasks)
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, ["Morning", "Work", "Lunch"]);
    }

    #[test]
    fn priority_display() {
        assert_eq!(Priority::High.to_string(), "high");
        assert_eq!(Priority::None.to_string(), "none");
    }

    #[test]
    fn priority_parse_accepts_any_case() {
        assert_eq!(Priority::parse("High"), Some(Priority::High));
        assert_eq!(Priority::parse(" low "), Some(Priority::Low));
        assert_eq!(Priority::parse(""), Some(Priority::None));
        assert_eq!(Priority::parse("urgent"), None);
    }

    #[test]
    fn todo_sections_group_open_items_then_completed() {
        let mut items = vec![
            Todo::new("Pay rent"),
            Todo::new("Call mom"),
            Todo::new("Water plants"),
            Todo::new("Book flights"),
            Todo::new("Read"),
        ];
        items[0].priority = Priority::High;
        items[1].priority = Priority::Low;
        items[3].priority = Priority::High;
        items[3].done = true;
        items[4].done = true;

        let (sections, completed) = todo_sections(&items);
        let titles: Vec<(&str, Vec<&str>)> = sections
            .iter()
            .map(|s| {
                (
                    s.priority.heading(),
                    s.items.iter().map(|t| t.title.as_str()).collect(),
                )
            })
            .collect();
        assert_eq!(
            titles,
            [
                ("HIGH", vec!["Pay rent"]),
                ("MEDIUM", vec![]),
                ("LOW", vec!["Call mom"]),
                ("TO-DO", vec!["Water plants"]),
            ]
        );
        let done: Vec<&str> = completed.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(done, ["Book flights", "Read"]);
    }
}
