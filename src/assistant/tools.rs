//! Tool declarations offered to the model and translation of its calls.
//!
//! Four tools exist, one per [`Action`] shape. Calls that name an existing
//! item (`update_task`, `delete_task`) carry a title fragment, which is
//! resolved against the snapshot the session was opened with.

use serde_json::{Value, json};
use tracing::debug;

use super::protocol::{Content, FunctionCall, FunctionResponse, TextPart};
use crate::planner::{Action, CreateSpec, EntityPatch, EntityPool, Resolution, Task, Todo, resolve};

/// The tools the model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerTool {
    CreateTask,
    UpdateTask,
    DeleteTask,
    ClearAllTasks,
}

impl PlannerTool {
    pub const ALL: [PlannerTool; 4] = [
        Self::CreateTask,
        Self::UpdateTask,
        Self::DeleteTask,
        Self::ClearAllTasks,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::CreateTask => "create_task",
            Self::UpdateTask => "update_task",
            Self::DeleteTask => "delete_task",
            Self::ClearAllTasks => "clear_all_tasks",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::CreateTask => {
                "Create a new scheduled task or a to-do item. Use this for 'add', 'plan', 'schedule' requests."
            }
            Self::UpdateTask => {
                "Update an existing task or todo. Use this for 'change', 'move', 'rename'."
            }
            Self::DeleteTask => "Delete or remove a task or to-do. Identify it by its title.",
            Self::ClearAllTasks => {
                "Completely clear or reset the entire schedule and all todos. Use this only when requested by user."
            }
        }
    }

    /// Parameter schema in the model's upper-case type dialect.
    pub fn parameters(self) -> Value {
        match self {
            Self::CreateTask => json!({
                "type": "OBJECT",
                "properties": {
                    "title": { "type": "STRING", "description": "The title of the task" },
                    "startTime": {
                        "type": "STRING",
                        "description": "HH:MM format (24h). Omit or null for anytime/todo items."
                    },
                    "duration": {
                        "type": "NUMBER",
                        "description": "Duration in minutes. Default to 30 if unknown."
                    },
                    "icon": { "type": "STRING", "description": "A suggested emoji icon" },
                    "color": {
                        "type": "STRING",
                        "description": "A pastel hex color (e.g. #FFC8C3)"
                    },
                    "subtasks": {
                        "type": "ARRAY",
                        "items": { "type": "STRING" },
                        "description": "List of subtasks or breakdown steps"
                    }
                },
                "required": ["title"]
            }),
            Self::UpdateTask => json!({
                "type": "OBJECT",
                "properties": {
                    "originalTitle": {
                        "type": "STRING",
                        "description": "The current title of the task to find"
                    },
                    "updates": {
                        "type": "OBJECT",
                        "properties": {
                            "title": { "type": "STRING" },
                            "startTime": { "type": "STRING" },
                            "duration": { "type": "NUMBER" },
                            "done": { "type": "BOOLEAN" }
                        }
                    }
                },
                "required": ["originalTitle", "updates"]
            }),
            Self::DeleteTask => json!({
                "type": "OBJECT",
                "properties": {
                    "title": { "type": "STRING", "description": "The title of the task to remove" }
                },
                "required": ["title"]
            }),
            Self::ClearAllTasks => json!({ "type": "OBJECT", "properties": {} }),
        }
    }

    fn declaration(self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": self.parameters(),
        })
    }
}

/// The `tools` array of a setup frame.
pub fn tool_declarations() -> Vec<Value> {
    let declarations: Vec<Value> = PlannerTool::ALL
        .into_iter()
        .map(PlannerTool::declaration)
        .collect();
    vec![json!({ "function_declarations": declarations })]
}

/// Which session flavour the instruction is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionMode {
    /// Text request answered only through tool calls.
    OneShot,
    /// Spoken conversation that also calls tools.
    Voice,
}

const RULES: &str = "Rules:\n\
1. ALWAYS suggest a highly relevant emoji 'icon' for every task and todo.\n\
2. ALWAYS suggest a soft pastel 'color' (hex) for the task and todo background.\n\
3. Break down tasks into subtasks when it makes sense.\n\
4. To delete 'all', call 'delete_task' for every single item you see in the context OR call 'clear_all_tasks'.\n\
5. If a time isn't mentioned, treat it as a to-do by omitting the startTime.";

/// Build the system instruction, embedding a snapshot of both collections.
///
/// `current_time` is only included for one-shot requests; a voice session
/// outlives the moment it was opened.
pub fn system_instruction(
    mode: InstructionMode,
    current_time: &str,
    tasks: &[Task],
    todos: &[Todo],
) -> Content {
    let task_context: Vec<Value> = tasks
        .iter()
        .map(|t| json!({ "id": t.id, "title": t.title, "time": t.start_time }))
        .collect();
    let todo_context: Vec<Value> = todos
        .iter()
        .map(|t| json!({ "id": t.id, "title": t.title }))
        .collect();

    let preamble = match mode {
        InstructionMode::OneShot => {
            "You are a day-planner agent that ONLY uses tools to fulfill requests. \
             DO NOT provide any text or audio response. ONLY call the provided tools."
        }
        InstructionMode::Voice => {
            "Always speak in English. You are a day-planner assistant that uses tools to \
             fulfill requests. Be fast and do as users intend."
        }
    };

    let mut text = format!("{preamble}\n\n{RULES}\n\n");
    if mode == InstructionMode::OneShot {
        text.push_str(&format!("Today: {current_time}.\n"));
    }
    text.push_str(&format!(
        "Scheduled Tasks Context: {}\nAnytime Todos Context: {}",
        Value::Array(task_context),
        Value::Array(todo_context)
    ));

    Content {
        parts: vec![TextPart { text }],
    }
}

/// Result of translating one function call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    /// At most one action per call.
    pub action: Option<Action>,
    /// Echoed back to the model in a `tool_response` frame.
    pub response: FunctionResponse,
}

impl CallOutcome {
    fn success(call: &FunctionCall, action: Action) -> Self {
        Self {
            action: Some(action),
            response: respond(call, json!({ "result": "success" })),
        }
    }

    fn failure(call: &FunctionCall, message: &str) -> Self {
        Self {
            action: None,
            response: respond(call, json!({ "result": "error", "message": message })),
        }
    }

    pub fn is_success(&self) -> bool {
        self.action.is_some()
    }
}

fn respond(call: &FunctionCall, response: Value) -> FunctionResponse {
    FunctionResponse {
        id: call.id.clone(),
        name: call.name.clone(),
        response,
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn resolve_target(call: &FunctionCall, key: &str, pool: EntityPool<'_>) -> Resolution {
    let fragment = str_arg(&call.args, key);
    let resolution = resolve(fragment, pool);
    if resolution == Resolution::NotFound {
        debug!(tool = %call.name, fragment, "no item matches title fragment");
    }
    resolution
}

/// Turn one function call into an action and its tool result.
pub fn translate_call(call: &FunctionCall, pool: EntityPool<'_>) -> CallOutcome {
    let Some(tool) = PlannerTool::from_name(&call.name) else {
        debug!(tool = %call.name, "model called an unknown tool");
        return CallOutcome::failure(call, "Unknown tool");
    };

    match tool {
        PlannerTool::CreateTask => match serde_json::from_value::<CreateSpec>(call.args.clone()) {
            Ok(spec) if !spec.title.trim().is_empty() => {
                CallOutcome::success(call, Action::Create(spec))
            }
            Ok(_) => CallOutcome::failure(call, "Missing title"),
            Err(e) => {
                debug!("bad create_task arguments: {e}");
                CallOutcome::failure(call, "Invalid arguments")
            }
        },
        PlannerTool::UpdateTask => match resolve_target(call, "originalTitle", pool) {
            Resolution::Found(id) => {
                let updates = call
                    .args
                    .get("updates")
                    .filter(|u| !u.is_null())
                    .cloned()
                    .map(serde_json::from_value::<EntityPatch>)
                    .transpose();
                match updates {
                    Ok(updates) => CallOutcome::success(
                        call,
                        Action::Update {
                            id,
                            updates: updates.unwrap_or_default(),
                        },
                    ),
                    Err(e) => {
                        debug!("bad update_task arguments: {e}");
                        CallOutcome::failure(call, "Invalid arguments")
                    }
                }
            }
            Resolution::NotFound => CallOutcome::failure(call, "Task not found"),
        },
        PlannerTool::DeleteTask => match resolve_target(call, "title", pool) {
            Resolution::Found(id) => CallOutcome::success(call, Action::Delete { id }),
            Resolution::NotFound => CallOutcome::failure(call, "Task not found"),
        },
        PlannerTool::ClearAllTasks => CallOutcome::success(call, Action::ClearAll),
    }
}

/// Translate a burst of calls in emission order.
pub fn translate_calls(calls: &[FunctionCall], pool: EntityPool<'_>) -> Vec<CallOutcome> {
    calls.iter().map(|call| translate_call(call, pool)).collect()
}
