//! The mutation vocabulary shared by assistant sessions, imports, and the reducer.
//!
//! Exactly four shapes exist: `create`, `update`, `delete`, and `clear_all`.
//! Raw JSON batches go through [`Action::parse_batch`], which drops anything it
//! cannot read instead of failing the batch.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::model::{EntityId, Priority};

/// A single requested change to the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Add a task (when timed) or a todo (when not).
    Create(CreateSpec),
    /// Shallow-merge `updates` into the entity with `id`.
    Update {
        id: EntityId,
        #[serde(default)]
        updates: EntityPatch,
    },
    /// Remove the entity with `id`.
    Delete { id: EntityId },
    /// Empty both collections.
    ClearAll,
}

impl Action {
    /// Wire tag of this action.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::ClearAll => "clear_all",
        }
    }

    /// Read a JSON array of actions, skipping entries with unknown tags or
    /// missing required fields. A non-array value yields an empty batch.
    pub fn parse_batch(value: &serde_json::Value) -> Vec<Action> {
        let Some(items) = value.as_array() else {
            debug!("action batch is not an array, ignoring");
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| match serde_json::from_value::<Action>(item.clone()) {
                Ok(action) => Some(action),
                Err(e) => {
                    debug!("dropping unreadable action: {e}");
                    None
                }
            })
            .collect()
    }
}

/// Fields of a `create` action. Also the argument shape of the `create_task` tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSpec {
    /// Blank titles make the whole action a no-op.
    #[serde(default, deserialize_with = "deserialize_title")]
    pub title: String,
    #[serde(
        default,
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_minutes",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<u32>,
    #[serde(
        default,
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub icon: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub color: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_titles",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub subtasks: Vec<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_priority",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<Priority>,
}

impl CreateSpec {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn at(mut self, start_time: impl Into<String>) -> Self {
        self.start_time = Some(start_time.into());
        self
    }
}

/// Partial task/todo. `None` leaves the field untouched.
///
/// `start_time` is three-state: absent (untouched), `null` or `""` (clear,
/// which moves a task to the todo list), or a value (set, which moves a todo
/// onto the timeline).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    #[serde(
        default,
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_minutes",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<u32>,
    #[serde(
        default,
        deserialize_with = "deserialize_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub done: Option<bool>,
    #[serde(
        default,
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub icon: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub color: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_priority",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<Priority>,
}

impl EntityPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// Model-produced arguments are loosely typed. The helpers below read a
// mistyped optional field as "not given" so the rest of the call survives.

/// Distinguishes an explicit `null` from a missing key. Any other non-string
/// value leaves the start time untouched.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Some(None),
        serde_json::Value::String(s) => Some(Some(s)),
        other => {
            debug!(%other, "ignoring non-string startTime");
            None
        }
    })
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}

fn deserialize_title<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_text(deserializer).map(Option::unwrap_or_default)
}

/// Keeps the string items of an array. Anything else is an empty list.
fn deserialize_titles<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(serde_json::Value::Array(items)) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            serde_json::Value::String(s) => Some(s),
            _ => None,
        })
        .collect())
}

/// Booleans, plus the strings `"true"` and `"false"`.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => Some(b),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn deserialize_priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(serde_json::Value::as_str).and_then(Priority::parse))
}

/// Accepts integral or fractional minute counts, as models send `NUMBER`.
/// Non-positive or non-numeric values read as "unspecified".
fn deserialize_minutes<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(minutes_from_value))
}

fn minutes_from_value(value: &serde_json::Value) -> Option<u32> {
    let minutes = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !minutes.is_finite() || minutes < 1.0 || minutes > f64::from(u32::MAX) {
        return None;
    }
    Some(minutes.round() as u32)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn create_round_trips_through_tagged_json() {
        let action = Action::Create(CreateSpec::titled("Gym").at("18:00"));
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "create");
        assert_eq!(json["startTime"], "18:00");
        let back: Action = serde_json::from_value(json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn clear_all_has_bare_tag() {
        let json = serde_json::to_value(Action::ClearAll).unwrap();
        assert_eq!(json, json!({"type": "clear_all"}));
    }

    #[test]
    fn parse_batch_skips_unknown_and_malformed() {
        let batch = json!([
            {"type": "create", "title": "A"},
            {"type": "explode"},
            {"type": "delete"},
            {"type": "delete", "id": "7"},
            "garbage",
            {"type": "clear_all"}
        ]);
        let actions = Action::parse_batch(&batch);
        let kinds: Vec<_> = actions.iter().map(Action::kind).collect();
        assert_eq!(kinds, ["create", "delete", "clear_all"]);
    }

    #[test]
    fn parse_batch_non_array_is_empty() {
        assert!(Action::parse_batch(&json!({"type": "clear_all"})).is_empty());
    }

    #[test]
    fn create_spec_reads_tool_arguments() {
        let args = json!({
            "title": "Clean the house",
            "startTime": "10:00",
            "duration": 45.0,
            "icon": "🧹",
            "color": "#B5EADD",
            "subtasks": ["Kitchen", "Bathroom", "Vacuum"]
        });
        let spec: CreateSpec = serde_json::from_value(args).unwrap();
        assert_eq!(spec.duration, Some(45));
        assert_eq!(spec.subtasks.len(), 3);
        assert_eq!(spec.start_time.as_deref(), Some("10:00"));
    }

    #[test]
    fn create_without_title_parses_blank() {
        let spec: CreateSpec = serde_json::from_value(json!({"startTime": "09:00"})).unwrap();
        assert!(spec.title.is_empty());
    }

    #[test]
    fn bad_duration_reads_as_unspecified() {
        for raw in [json!(0), json!(-5), json!("soon"), json!(true)] {
            let spec: CreateSpec =
                serde_json::from_value(json!({"title": "x", "duration": raw})).unwrap();
            assert_eq!(spec.duration, None);
        }
        let spec: CreateSpec =
            serde_json::from_value(json!({"title": "x", "duration": "20"})).unwrap();
        assert_eq!(spec.duration, Some(20));
    }

    #[test]
    fn patch_distinguishes_null_from_missing() {
        let cleared: EntityPatch = serde_json::from_value(json!({"startTime": null})).unwrap();
        assert_eq!(cleared.start_time, Some(None));

        let untouched: EntityPatch = serde_json::from_value(json!({"title": "x"})).unwrap();
        assert_eq!(untouched.start_time, None);

        let set: EntityPatch = serde_json::from_value(json!({"startTime": "07:15"})).unwrap();
        assert_eq!(set.start_time, Some(Some("07:15".to_owned())));
    }

    #[test]
    fn update_without_updates_defaults_to_empty_patch() {
        let action: Action = serde_json::from_value(json!({"type": "update", "id": "1"})).unwrap();
        match action {
            Action::Update { updates, .. } => assert!(updates.is_empty()),
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn mistyped_create_fields_are_dropped_not_the_create() {
        let spec: CreateSpec = serde_json::from_value(json!({
            "title": "Gym",
            "startTime": "18:00",
            "subtasks": null,
            "icon": 7,
            "priority": "urgent"
        }))
        .unwrap();
        assert_eq!(spec.title, "Gym");
        assert!(spec.subtasks.is_empty());
        assert_eq!(spec.icon, None);
        assert_eq!(spec.priority, None);

        let spec: CreateSpec = serde_json::from_value(json!({
            "title": "Clean",
            "subtasks": ["Kitchen", null, 3, "Bathroom"]
        }))
        .unwrap();
        assert_eq!(spec.subtasks, ["Kitchen", "Bathroom"]);

        let spec: CreateSpec =
            serde_json::from_value(json!({"title": "x", "subtasks": "Kitchen"})).unwrap();
        assert!(spec.subtasks.is_empty());
    }

    #[test]
    fn priority_is_case_insensitive() {
        let spec: CreateSpec =
            serde_json::from_value(json!({"title": "x", "priority": "HIGH"})).unwrap();
        assert_eq!(spec.priority, Some(Priority::High));
    }

    #[test]
    fn mistyped_patch_fields_read_as_untouched() {
        let patch: EntityPatch = serde_json::from_value(json!({
            "title": "Focus",
            "done": "yes",
            "startTime": 900,
            "color": false,
            "priority": 2
        }))
        .unwrap();
        assert_eq!(patch.title.as_deref(), Some("Focus"));
        assert_eq!(patch.done, None);
        assert_eq!(patch.start_time, None);
        assert_eq!(patch.color, None);
        assert_eq!(patch.priority, None);

        let patch: EntityPatch = serde_json::from_value(json!({"done": "true"})).unwrap();
        assert_eq!(patch.done, Some(true));
    }

    #[test]
    fn parse_batch_keeps_create_with_null_subtasks() {
        let batch = Action::parse_batch(&json!([
            {"type": "create", "title": "Gym", "startTime": "18:00", "subtasks": null},
            {"type": "update", "id": "1", "updates": {"done": "yes", "title": "Run"}}
        ]));
        assert_eq!(batch.len(), 2);
        let Action::Update { updates, .. } = &batch[1] else {
            panic!("expected update, got {:?}", batch[1]);
        };
        assert_eq!(updates.title.as_deref(), Some("Run"));
        assert_eq!(updates.done, None);
    }
}
