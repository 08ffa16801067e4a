//! Day totals shown next to the schedule.

use super::reducer::Schedule;

/// Counts and planned time for the current schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayStats {
    pub completed_todos: usize,
    pub open_todos: usize,
    pub completed_tasks: usize,
    /// Sum of task durations, in minutes.
    pub planned_minutes: u64,
}

impl DayStats {
    pub fn of(schedule: &Schedule) -> Self {
        let completed_todos = schedule.todos.iter().filter(|t| t.done).count();
        Self {
            completed_todos,
            open_todos: schedule.todos.len() - completed_todos,
            completed_tasks: schedule.tasks.iter().filter(|t| t.done).count(),
            planned_minutes: schedule.tasks.iter().map(|t| u64::from(t.duration)).sum(),
        }
    }

    /// Planned time in whole hours, half hours rounding up.
    pub fn planned_hours(&self) -> u64 {
        (self.planned_minutes + 30) / 60
    }
}

impl Schedule {
    pub fn stats(&self) -> DayStats {
        DayStats::of(self)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::planner::model::{Task, Todo};

    fn task(title: &str, start: &str, duration: u32) -> Task {
        let mut task = Task::new(title, start);
        task.duration = duration;
        task
    }

    #[test]
    fn empty_schedule_has_zero_totals() {
        let stats = Schedule::default().stats();
        assert_eq!(stats, DayStats::default());
        assert_eq!(stats.planned_hours(), 0);
    }

    #[test]
    fn counts_completed_items_and_sums_durations() {
        let mut done = Todo::new("Read");
        done.done = true;
        let mut finished = task("Standup", "09:00", 15);
        finished.done = true;
        let schedule = Schedule::new(
            vec![task("Deep Work", "09:30", 120), finished, task("Gym", "18:00", 45)],
            vec![done, Todo::new("Call mom")],
        );

        let stats = schedule.stats();
        assert_eq!(stats.completed_todos, 1);
        assert_eq!(stats.open_todos, 1);
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.planned_minutes, 180);
        assert_eq!(stats.planned_hours(), 3);
    }

    #[test]
    fn planned_hours_round_to_nearest() {
        let hours = |minutes: u32| {
            Schedule::new(vec![task("x", "08:00", minutes)], vec![])
                .stats()
                .planned_hours()
        };
        assert_eq!(hours(29), 0);
        assert_eq!(hours(30), 1);
        assert_eq!(hours(89), 1);
        assert_eq!(hours(90), 2);
    }
}
