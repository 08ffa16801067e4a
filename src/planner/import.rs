//! Turns reminders exported from the system Reminders app into `create` actions.
//!
//! Each record becomes one [`Action::Create`]: a record with a time of day lands
//! on the timeline, everything else becomes an anytime todo.

use chrono::{DateTime, Local, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::action::{Action, CreateSpec};
use crate::error::{PlannerError, Result};

/// One incomplete reminder as exported by the reminders bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRecord {
    pub id: String,
    pub title: String,
    /// RFC 3339 timestamp.
    #[serde(default)]
    pub due_date: Option<String>,
    /// `HH:MM`; takes precedence over `due_date`.
    #[serde(default)]
    pub start_time: Option<String>,
    /// Name of the reminders list the record came from.
    #[serde(default)]
    pub list: String,
}

impl ReminderRecord {
    /// Time of day in the local zone, if the record has one.
    pub fn clock_time(&self) -> Option<String> {
        self.clock_time_in(&Local)
    }

    /// Time of day in `tz`. A due date at exactly midnight is an all-day
    /// reminder and has no time of day.
    pub fn clock_time_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<String>
    where
        Tz::Offset: std::fmt::Display,
    {
        if let Some(start) = self.start_time.as_deref().map(str::trim)
            && !start.is_empty()
        {
            return Some(start.to_owned());
        }
        let due = self.due_date.as_deref()?.trim();
        let parsed = DateTime::parse_from_rfc3339(due)
            .map_err(|e| debug!(id = %self.id, "unreadable due date {due:?}: {e}"))
            .ok()?
            .with_timezone(tz);
        if parsed.hour() == 0 && parsed.minute() == 0 {
            return None;
        }
        Some(parsed.format("%H:%M").to_string())
    }

    /// The `create` action this record imports as, or `None` for a blank title.
    pub fn to_action(&self) -> Option<Action> {
        self.to_action_in(&Local)
    }

    fn to_action_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<Action>
    where
        Tz::Offset: std::fmt::Display,
    {
        let title = self.title.trim();
        if title.is_empty() {
            return None;
        }
        Some(Action::Create(CreateSpec {
            title: title.to_owned(),
            start_time: self.clock_time_in(tz),
            ..CreateSpec::default()
        }))
    }
}

/// Convert a batch of records into actions, skipping untitled ones.
pub fn import_reminders(records: &[ReminderRecord]) -> Vec<Action> {
    let actions: Vec<Action> = records.iter().filter_map(ReminderRecord::to_action).collect();
    info!(
        records = records.len(),
        actions = actions.len(),
        "imported reminders"
    );
    actions
}

/// Parse the JSON array produced by the reminders bridge.
///
/// # Errors
///
/// Returns [`PlannerError::Import`] if the payload is not an array of records.
pub fn parse_reminders(json: &str) -> Result<Vec<ReminderRecord>> {
    serde_json::from_str(json)
        .map_err(|e| PlannerError::Import(format!("bad reminders payload: {e}")))
}
