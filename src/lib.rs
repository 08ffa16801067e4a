//! Dayplan: a day planner core with an AI assistant that edits the schedule.
//!
//! The schedule has two collections: timed tasks on a timeline and anytime
//! todos. An assistant turns typed or spoken requests into tool calls on a
//! remote model; those calls become a small closed set of actions that are
//! folded into the collections.
//!
//! # Architecture
//!
//! - **Planner** (`planner`): tasks, todos, the action vocabulary, the title
//!   resolver, the reducer, and the shared store
//! - **Assistant** (`assistant`): wire protocol, tool declarations, one-shot
//!   text sessions, and streaming voice sessions
//! - **Audio** (`audio`): PCM codec, gapless playback queue, and the optional
//!   `cpal` device layer behind the `audio-device` feature
//! - **Focus** (`focus`): countdown timer for one task

pub mod assistant;
pub mod audio;
pub mod config;
pub mod error;
pub mod focus;
pub mod planner;

pub use assistant::{OneShotSession, SessionState, VoiceSession, VoiceSessionHandle};
pub use config::PlannerConfig;
pub use error::{PlannerError, Result};
pub use planner::{Action, PlannerStore, Schedule, Task, Todo};
