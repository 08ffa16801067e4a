//! Wire frames of the bidirectional generate-content protocol.
//!
//! Outbound frames serialize as single-key objects (`{"setup": {...}}`) with
//! snake_case fields. Inbound frames use camelCase and may carry several keys
//! at once, so they parse into one struct and are then split into
//! [`InboundEvent`]s for dispatch.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::codec::PCM_MIME_TYPE;

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// A frame sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientFrame {
    Setup(Setup),
    ClientContent(ClientContent),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponse),
}

impl ClientFrame {
    /// JSON text of this frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// One completed user text turn.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::ClientContent(ClientContent {
            turns: vec![Turn {
                role: "user".to_owned(),
                parts: vec![TextPart { text: text.into() }],
            }],
            turn_complete: true,
        })
    }

    /// One base64 PCM chunk of microphone audio.
    pub fn audio_chunk(data: String) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: PCM_MIME_TYPE.to_owned(),
                data,
            }],
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::ClientContent(_) => "client_content",
            Self::RealtimeInput(_) => "realtime_input",
            Self::ToolResponse(_) => "tool_response",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Setup {
    pub model: String,
    pub system_instruction: Content,
    pub generation_config: GenerationConfig,
    pub tools: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

impl SpeechConfig {
    pub fn prebuilt(voice_name: impl Into<String>) -> Self {
        Self {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice_name.into(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientContent {
    pub turns: Vec<Turn>,
    pub turn_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub role: String,
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

/// Result of one function call, echoed back with the call's id and name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// A frame received from the model. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFrame {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ModelPart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

/// One thing a server frame tells us, in the order it must be handled.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    SetupComplete,
    /// The user spoke over the model; unplayed audio is stale.
    Interrupted,
    /// Base64 PCM16 audio from the model.
    Audio(String),
    Text(String),
    TurnComplete,
    ToolCall(Vec<FunctionCall>),
}

impl ServerFrame {
    /// Parse a text frame. Unparseable frames are logged and skipped.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!("ignoring unparseable server frame: {e}");
                None
            }
        }
    }

    /// Split into events.
    ///
    /// An interruption voids the rest of the same content block, so any audio
    /// riding along with it is dropped. Tool calls are always kept.
    pub fn into_events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        if self.setup_complete.is_some() {
            events.push(InboundEvent::SetupComplete);
        }
        if let Some(content) = self.server_content {
            if content.interrupted {
                events.push(InboundEvent::Interrupted);
            } else {
                let parts = content.model_turn.map(|t| t.parts).unwrap_or_default();
                for part in parts {
                    if let Some(inline) = part.inline_data
                        && inline.mime_type.starts_with(PCM_MIME_TYPE)
                    {
                        events.push(InboundEvent::Audio(inline.data));
                    }
                    if let Some(text) = part.text
                        && !text.is_empty()
                    {
                        events.push(InboundEvent::Text(text));
                    }
                }
                if content.turn_complete {
                    events.push(InboundEvent::TurnComplete);
                }
            }
        }
        if let Some(call) = self.tool_call {
            events.push(InboundEvent::ToolCall(call.function_calls));
        }
        events
    }
}
