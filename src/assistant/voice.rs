//! Persistent duplex voice session.
//!
//! The protocol lives in [`VoiceMachine`]: a state plus one transition per
//! inbound event kind, each returning the [`Effect`]s the runtime must carry
//! out. The machine never touches the network, the audio device, or the
//! schedule, so it can be driven with synthetic frames.
//!
//! [`VoiceSession::open`] connects, sends the setup frame, and spawns one task
//! that selects over server frames, microphone buffers, and a cancellation
//! token. Tool calls are resolved and applied while holding the
//! [`PlannerStore`] lock; a batch that acquires the lock after the session was
//! closed is discarded.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{
    ClientFrame, FunctionCall, GenerationConfig, InboundEvent, ServerFrame, Setup, SpeechConfig,
    ToolResponse,
};
use super::tools::{InstructionMode, system_instruction, tool_declarations, translate_calls};
use super::transport::{Connector, Transport};
use crate::audio::codec::{PcmChunker, decode_base64_pcm16};
use crate::audio::playback::PlaybackHandle;
use crate::config::PlannerConfig;
use crate::error::{PlannerError, Result};
use crate::planner::{Action, PlannerStore};

/// Observable state of a voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Listening,
    Speaking,
    /// Terminal. A new session must be opened.
    Error,
}

impl SessionState {
    /// Connected in any form.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connected | Self::Listening | Self::Speaking)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Listening => "listening",
            Self::Speaking => "speaking",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Work a transition hands back to the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Queue decoded model audio right after what is already scheduled.
    Play(Vec<f32>),
    /// Drop every not-yet-played sample and reset the playback cursor.
    Flush,
    /// Resolve, apply, and answer a burst of tool calls.
    ResolveTools(Vec<FunctionCall>),
}

/// The session protocol as a pure state machine.
#[derive(Debug)]
pub struct VoiceMachine {
    state: SessionState,
}

impl Default for VoiceMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// `disconnected → connecting`.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::Protocol`] from any other state.
    pub fn begin_connect(&mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(PlannerError::Protocol(format!(
                "cannot connect while {}",
                self.state
            )));
        }
        self.state = SessionState::Connecting;
        Ok(())
    }

    /// `connecting → connected`, once the setup frame is out.
    pub fn connected(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Connected;
        }
    }

    /// `connected → listening`, once microphone audio flows.
    pub fn capture_started(&mut self) {
        if self.state == SessionState::Connected {
            self.state = SessionState::Listening;
        }
    }

    /// Any transport failure. Terminal.
    pub fn fail(&mut self) {
        self.state = SessionState::Error;
    }

    /// Teardown. `error` stays `error`.
    pub fn close(&mut self) {
        if self.state != SessionState::Error {
            self.state = SessionState::Disconnected;
        }
    }

    /// Dispatch one inbound event to its transition.
    ///
    /// Events arriving outside a live state are ignored.
    pub fn handle(&mut self, event: InboundEvent) -> Vec<Effect> {
        if !self.state.is_live() {
            debug!(state = %self.state, ?event, "ignoring event outside a live session");
            return Vec::new();
        }
        match event {
            InboundEvent::SetupComplete => self.on_setup_complete(),
            InboundEvent::Interrupted => self.on_interrupted(),
            InboundEvent::Audio(data) => self.on_audio(&data),
            InboundEvent::Text(text) => self.on_text(&text),
            InboundEvent::TurnComplete => self.on_turn_complete(),
            InboundEvent::ToolCall(calls) => self.on_tool_call(calls),
        }
    }

    fn on_setup_complete(&mut self) -> Vec<Effect> {
        debug!("server acknowledged setup");
        Vec::new()
    }

    fn on_interrupted(&mut self) -> Vec<Effect> {
        self.state = SessionState::Listening;
        vec![Effect::Flush]
    }

    fn on_audio(&mut self, data: &str) -> Vec<Effect> {
        match decode_base64_pcm16(data) {
            Some(samples) if !samples.is_empty() => {
                self.state = SessionState::Speaking;
                vec![Effect::Play(samples)]
            }
            _ => Vec::new(),
        }
    }

    fn on_text(&mut self, text: &str) -> Vec<Effect> {
        debug!(text, "model text part");
        Vec::new()
    }

    fn on_turn_complete(&mut self) -> Vec<Effect> {
        self.state = SessionState::Listening;
        Vec::new()
    }

    fn on_tool_call(&mut self, calls: Vec<FunctionCall>) -> Vec<Effect> {
        if calls.is_empty() {
            return Vec::new();
        }
        vec![Effect::ResolveTools(calls)]
    }
}

/// Control handle for a running voice session.
///
/// Dropping the handle closes the session.
pub struct VoiceSessionHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    task: Option<JoinHandle<()>>,
}

impl VoiceSessionHandle {
    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Token that fires when the session closes or ends on its own.
    ///
    /// Hand it to the [`AudioSource`](crate::audio::AudioSource) feeding the
    /// session so capture stops with it.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop capture and close the connection. Safe to call repeatedly.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            info!("closing voice session");
        }
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the session task to finish and return its final state.
    pub async fn finished(mut self) -> SessionState {
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("voice session task ended abnormally: {e}");
        }
        *self.state.borrow()
    }
}

impl Drop for VoiceSessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Opens voice sessions.
pub struct VoiceSession;

impl VoiceSession {
    /// Connect, send the setup frame, and start streaming.
    ///
    /// `capture` delivers mono microphone buffers at the configured input
    /// rate. Model audio is scheduled on `playback`. Tool calls mutate
    /// `store`.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::Transport`] if the connection or the setup
    /// frame fails.
    pub async fn open(
        connector: Arc<dyn Connector>,
        config: &PlannerConfig,
        store: PlannerStore,
        playback: PlaybackHandle,
        capture: mpsc::Receiver<Vec<f32>>,
    ) -> Result<VoiceSessionHandle> {
        let mut machine = VoiceMachine::new();
        machine.begin_connect()?;
        let (state_tx, state_rx) = watch::channel(machine.state());

        let mut transport = match connector.connect().await {
            Ok(t) => t,
            Err(e) => {
                machine.fail();
                state_tx.send_replace(machine.state());
                warn!("voice session connect failed: {e}");
                return Err(e);
            }
        };

        let snapshot = store.snapshot().await;
        let setup = ClientFrame::Setup(Setup {
            model: config.assistant.model.clone(),
            system_instruction: system_instruction(
                InstructionMode::Voice,
                "",
                &snapshot.tasks,
                &snapshot.todos,
            ),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_owned()],
                speech_config: Some(SpeechConfig::prebuilt(config.assistant.voice_name.clone())),
            },
            tools: tool_declarations(),
        });
        if let Err(e) = transport.send(&setup).await {
            machine.fail();
            state_tx.send_replace(machine.state());
            transport.close().await;
            return Err(e);
        }
        machine.connected();
        state_tx.send_replace(machine.state());
        info!(voice = %config.assistant.voice_name, "voice session connected");

        let cancel = CancellationToken::new();
        let runtime = SessionRuntime {
            machine,
            transport,
            store,
            playback,
            chunker: PcmChunker::new(
                config.audio.input_sample_rate,
                1,
                config.audio.input_sample_rate,
                config.audio.chunk_samples,
            ),
            state_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(runtime.run(capture));

        Ok(VoiceSessionHandle {
            cancel,
            state: state_rx,
            task: Some(task),
        })
    }
}

struct SessionRuntime {
    machine: VoiceMachine,
    transport: Box<dyn Transport>,
    store: PlannerStore,
    playback: PlaybackHandle,
    chunker: PcmChunker,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
}

impl SessionRuntime {
    fn publish(&self) {
        self.state_tx.send_if_modified(|current| {
            let next = self.machine.state();
            if *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "voice session state");
            *current = next;
            true
        });
    }

    async fn run(mut self, mut capture: mpsc::Receiver<Vec<f32>>) {
        self.machine.capture_started();
        self.publish();
        let mut capture_open = true;

        let result: Result<()> = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Ok(()),
                received = self.transport.recv() => match received {
                    Ok(Some(text)) => {
                        if let Err(e) = self.on_frame(&text).await {
                            break Err(e);
                        }
                    }
                    Ok(None) => {
                        info!("server closed the voice session");
                        break Ok(());
                    }
                    Err(e) => break Err(e),
                },
                buffer = capture.recv(), if capture_open => match buffer {
                    Some(frames) => {
                        if let Err(e) = self.send_audio(&frames).await {
                            break Err(e);
                        }
                    }
                    None => {
                        debug!("capture ended");
                        capture_open = false;
                    }
                },
            }
        };

        drop(capture);
        self.transport.close().await;
        let dropped = self.playback.flush();
        if dropped > 0 {
            debug!(dropped, "discarded queued playback at teardown");
        }
        match result {
            Ok(()) => self.machine.close(),
            Err(e) => {
                warn!("voice session failed: {e}");
                self.machine.fail();
            }
        }
        self.publish();
        self.cancel.cancel();
    }

    async fn send_audio(&mut self, frames: &[f32]) -> Result<()> {
        for data in self.chunker.push(frames) {
            self.transport.send(&ClientFrame::audio_chunk(data)).await?;
        }
        Ok(())
    }

    async fn on_frame(&mut self, text: &str) -> Result<()> {
        let Some(frame) = ServerFrame::parse(text) else {
            return Ok(());
        };
        for event in frame.into_events() {
            let effects = self.machine.handle(event);
            self.publish();
            for effect in effects {
                self.perform(effect).await?;
            }
        }
        Ok(())
    }

    async fn perform(&mut self, effect: Effect) -> Result<()> {
        match effect {
            Effect::Play(samples) => {
                if let Some(slot) = self.playback.schedule(samples) {
                    debug!(start = slot.start, end = slot.end, "scheduled model audio");
                }
                Ok(())
            }
            Effect::Flush => {
                let dropped = self.playback.flush();
                debug!(dropped, "model interrupted, flushed playback");
                Ok(())
            }
            Effect::ResolveTools(calls) => self.resolve_tools(&calls).await,
        }
    }

    async fn resolve_tools(&mut self, calls: &[FunctionCall]) -> Result<()> {
        let responses = {
            let mut schedule = self.store.lock().await;
            if self.cancel.is_cancelled() {
                debug!(calls = calls.len(), "session closed, discarding tool batch");
                return Ok(());
            }
            let outcomes = translate_calls(calls, schedule.pool());
            let actions: Vec<Action> = outcomes.iter().filter_map(|o| o.action.clone()).collect();
            let summary = schedule.apply(&actions);
            info!(
                calls = calls.len(),
                applied = summary.applied,
                skipped = summary.skipped,
                "applied voice tool calls"
            );
            outcomes
                .into_iter()
                .map(|o| o.response)
                .collect::<Vec<_>>()
        };
        self.transport
            .send(&ClientFrame::ToolResponse(ToolResponse {
                function_responses: responses,
            }))
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::audio::codec::encode_pcm16;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::json;

    fn live_machine() -> VoiceMachine {
        let mut m = VoiceMachine::new();
        m.begin_connect().unwrap();
        m.connected();
        m.capture_started();
        m
    }

    fn audio(samples: &[f32]) -> InboundEvent {
        InboundEvent::Audio(STANDARD.encode(encode_pcm16(samples)))
    }

    #[test]
    fn lifecycle_states() {
        let mut m = VoiceMachine::new();
        assert_eq!(m.state(), SessionState::Disconnected);
        m.begin_connect().unwrap();
        assert_eq!(m.state(), SessionState::Connecting);
        assert!(m.begin_connect().is_err());
        m.connected();
        assert_eq!(m.state(), SessionState::Connected);
        m.capture_started();
        assert_eq!(m.state(), SessionState::Listening);
        m.close();
        assert_eq!(m.state(), SessionState::Disconnected);
    }

    #[test]
    fn audio_moves_to_speaking_and_plays() {
        let mut m = live_machine();
        let effects = m.handle(audio(&[0.5, -0.5]));
        assert_eq!(m.state(), SessionState::Speaking);
        assert_eq!(effects.len(), 1);
        assert!(matches!(&effects[0], Effect::Play(s) if s.len() == 2));
    }

    #[test]
    fn corrupt_audio_is_dropped_without_state_change() {
        let mut m = live_machine();
        assert!(m.handle(InboundEvent::Audio("@@@".into())).is_empty());
        assert_eq!(m.state(), SessionState::Listening);
    }

    #[test]
    fn interruption_flushes_and_listens() {
        let mut m = live_machine();
        m.handle(audio(&[0.1; 4]));
        let effects = m.handle(InboundEvent::Interrupted);
        assert_eq!(effects, vec![Effect::Flush]);
        assert_eq!(m.state(), SessionState::Listening);
    }

    #[test]
    fn turn_complete_returns_to_listening() {
        let mut m = live_machine();
        m.handle(audio(&[0.1; 4]));
        assert!(m.handle(InboundEvent::TurnComplete).is_empty());
        assert_eq!(m.state(), SessionState::Listening);
    }

    #[test]
    fn tool_calls_request_resolution() {
        let mut m = live_machine();
        let calls = vec![FunctionCall {
            id: "1".into(),
            name: "clear_all_tasks".into(),
            args: json!({}),
        }];
        assert_eq!(
            m.handle(InboundEvent::ToolCall(calls.clone())),
            vec![Effect::ResolveTools(calls)]
        );
        assert!(m.handle(InboundEvent::ToolCall(Vec::new())).is_empty());
    }

    #[test]
    fn error_is_terminal() {
        let mut m = live_machine();
        m.fail();
        m.close();
        assert_eq!(m.state(), SessionState::Error);
        assert!(m.handle(audio(&[0.1])).is_empty());
        assert!(m.begin_connect().is_err());
    }

    #[test]
    fn events_ignored_when_not_live() {
        let mut m = VoiceMachine::new();
        assert!(m.handle(InboundEvent::Interrupted).is_empty());
        assert_eq!(m.state(), SessionState::Disconnected);
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(SessionState::Speaking).unwrap(),
            json!("speaking")
        );
    }
}
