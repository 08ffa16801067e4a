//! Countdown for working on one task.
//!
//! The timer does not own a clock. Callers feed elapsed seconds through
//! [`FocusTimer::tick`], which keeps it testable and lets the CLI drive it
//! from a `tokio::time::interval`.

use chrono::{Duration, NaiveTime};

use crate::planner::{EntityId, Subtask, Task};

const FIVE_MINUTES: u64 = 5 * 60;

/// One row of the focus checklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistItem {
    pub id: EntityId,
    pub title: String,
    pub done: bool,
}

impl From<&Subtask> for ChecklistItem {
    fn from(s: &Subtask) -> Self {
        Self {
            id: s.id.clone(),
            title: s.title.clone(),
            done: s.done,
        }
    }
}

fn default_checklist() -> Vec<ChecklistItem> {
    [
        ("c1", "Get comfortable", true),
        ("c2", "Focus on one task", false),
        ("c3", "Celebrate progress", false),
    ]
    .into_iter()
    .map(|(id, title, done)| ChecklistItem {
        id: EntityId::from(id),
        title: title.to_owned(),
        done,
    })
    .collect()
}

/// Outcome of a [`FocusTimer::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Paused,
    Running,
    /// The countdown reached zero on this tick.
    Finished,
}

#[derive(Debug, Clone)]
pub struct FocusTimer {
    title: String,
    start_time: Option<NaiveTime>,
    session_start: NaiveTime,
    total_secs: u64,
    remaining_secs: u64,
    running: bool,
    checklist: Vec<ChecklistItem>,
}

impl FocusTimer {
    /// A paused timer for `task`, opened at `now`.
    pub fn for_task(task: &Task, now: NaiveTime) -> Self {
        let total_secs = u64::from(task.duration) * 60;
        let checklist = if task.subtasks.is_empty() {
            default_checklist()
        } else {
            task.subtasks.iter().map(ChecklistItem::from).collect()
        };
        Self {
            title: task.title.clone(),
            start_time: task.start(),
            session_start: now,
            total_secs,
            remaining_secs: total_secs,
            running: false,
            checklist,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    /// Start or pause. A finished timer stays paused.
    pub fn toggle(&mut self) -> bool {
        self.running = !self.running && self.remaining_secs > 0;
        self.running
    }

    /// Count down by `secs` while running.
    pub fn tick(&mut self, secs: u64) -> Tick {
        if !self.running {
            return Tick::Paused;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(secs);
        if self.remaining_secs == 0 {
            self.running = false;
            Tick::Finished
        } else {
            Tick::Running
        }
    }

    pub fn add_five_minutes(&mut self) {
        self.remaining_secs += FIVE_MINUTES;
    }

    /// Back to the full duration, paused.
    pub fn reset(&mut self) {
        self.remaining_secs = self.total_secs;
        self.running = false;
    }

    /// `m:ss`, minutes unpadded.
    pub fn format_remaining(&self) -> String {
        format!("{}:{:02}", self.remaining_secs / 60, self.remaining_secs % 60)
    }

    /// Share of the planned duration already spent, in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        if self.total_secs == 0 {
            return 1.0;
        }
        let spent = self.total_secs.saturating_sub(self.remaining_secs);
        (spent as f32 / self.total_secs as f32).clamp(0.0, 1.0)
    }

    /// `HH:MM → HH:MM`.
    ///
    /// Scheduled tasks show their planned slot. Anytime items show the
    /// session start and a projected end from the time still remaining.
    pub fn time_range(&self, now: NaiveTime) -> String {
        let (start, end) = match self.start_time {
            Some(start) => (start, start + Duration::seconds(self.total_secs as i64)),
            None => (
                self.session_start,
                now + Duration::seconds(self.remaining_secs as i64),
            ),
        };
        format!("{} → {}", start.format("%H:%M"), end.format("%H:%M"))
    }

    pub fn checklist(&self) -> &[ChecklistItem] {
        &self.checklist
    }

    /// Flip one checklist item. Returns the new value.
    pub fn toggle_item(&mut self, id: &EntityId) -> Option<bool> {
        let item = self.checklist.iter_mut().find(|i| &i.id == id)?;
        item.done = !item.done;
        Some(item.done)
    }
}
