//! Single request/response exchange with the model.
//!
//! One call opens one connection, sends the setup frame and the user's text,
//! collects tool calls, and closes the connection again. Tool calls are only
//! translated into actions here; applying them is the caller's job.

use std::sync::Arc;

use tokio::time::{Instant, sleep, sleep_until, timeout_at};
use tracing::{debug, info, warn};

use super::protocol::{ClientFrame, GenerationConfig, InboundEvent, ServerFrame, Setup};
use super::tools::{InstructionMode, system_instruction, tool_declarations, translate_calls};
use super::transport::{Connector, Transport};
use crate::config::AssistantConfig;
use crate::error::{PlannerError, Result};
use crate::planner::{Action, EntityPool, Task, Todo};

/// Text-in, actions-out assistant session.
pub struct OneShotSession {
    connector: Arc<dyn Connector>,
    config: AssistantConfig,
}

impl OneShotSession {
    pub fn new(connector: Arc<dyn Connector>, config: AssistantConfig) -> Self {
        Self { connector, config }
    }

    fn setup_frame(&self, current_time: &str, tasks: &[Task], todos: &[Todo]) -> ClientFrame {
        ClientFrame::Setup(Setup {
            model: self.config.model.clone(),
            system_instruction: system_instruction(
                InstructionMode::OneShot,
                current_time,
                tasks,
                todos,
            ),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_owned()],
                speech_config: None,
            },
            tools: tool_declarations(),
        })
    }

    /// Ask the model to turn `prompt` into schedule actions.
    ///
    /// `tasks` and `todos` are the snapshot the model sees; title fragments in
    /// its calls are resolved against it. Calls that match nothing are
    /// dropped. A turn that ends without any tool call, or a connection the
    /// server closes before answering, yields an empty batch.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::Transport`] if the connection fails and
    /// [`PlannerError::Timeout`] if no answer arrives within the request
    /// timeout.
    pub async fn generate_schedule(
        &self,
        prompt: &str,
        current_time: &str,
        tasks: &[Task],
        todos: &[Todo],
    ) -> Result<Vec<Action>> {
        let deadline = Instant::now() + self.config.request_timeout();
        let timed_out = || PlannerError::Timeout(self.config.request_timeout_ms);

        let mut transport = timeout_at(deadline, self.connector.connect())
            .await
            .map_err(|_| timed_out())??;

        let setup = self.setup_frame(current_time, tasks, todos);
        let outcome = self
            .exchange(transport.as_mut(), &setup, prompt, EntityPool::new(tasks, todos), deadline)
            .await;
        transport.close().await;

        match &outcome {
            Ok(actions) => info!(actions = actions.len(), "assistant request finished"),
            Err(e) => warn!("assistant request failed: {e}"),
        }
        outcome
    }

    async fn exchange(
        &self,
        transport: &mut dyn Transport,
        setup: &ClientFrame,
        prompt: &str,
        pool: EntityPool<'_>,
        deadline: Instant,
    ) -> Result<Vec<Action>> {
        let timed_out = || PlannerError::Timeout(self.config.request_timeout_ms);

        transport.send(setup).await?;

        tokio::select! {
            _ = sleep(self.config.prompt_delay()) => {}
            _ = sleep_until(deadline) => return Err(timed_out()),
        }
        if let Err(e) = transport.send(&ClientFrame::user_text(prompt)).await {
            // A server that already hung up shows up on the next receive.
            debug!("prompt not sent: {e}");
        }

        let mut actions = Vec::new();
        let mut settle_at: Option<Instant> = None;

        loop {
            let received = tokio::select! {
                received = transport.recv() => received?,
                _ = sleep_until(deadline), if settle_at.is_none() => return Err(timed_out()),
                _ = sleep_until(settle_at.unwrap_or(deadline)), if settle_at.is_some() => {
                    return Ok(actions);
                }
            };

            let Some(text) = received else {
                debug!("server closed the connection");
                return Ok(actions);
            };
            let Some(frame) = ServerFrame::parse(&text) else {
                continue;
            };

            let mut turn_complete = false;
            for event in frame.into_events() {
                match event {
                    InboundEvent::ToolCall(calls) => {
                        for outcome in translate_calls(&calls, pool) {
                            match outcome.action {
                                Some(action) => actions.push(action),
                                None => debug!(
                                    tool = %outcome.response.name,
                                    "dropping unresolvable tool call"
                                ),
                            }
                        }
                        if settle_at.is_none() {
                            settle_at = Some(Instant::now() + self.config.settle_delay());
                        }
                    }
                    InboundEvent::TurnComplete => turn_complete = true,
                    InboundEvent::Interrupted => warn!("model turn interrupted"),
                    InboundEvent::SetupComplete
                    | InboundEvent::Audio(_)
                    | InboundEvent::Text(_) => {}
                }
            }
            if turn_complete {
                return Ok(actions);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::assistant::transport::ChannelConnector;
    use serde_json::json;

    fn fast_config() -> AssistantConfig {
        AssistantConfig {
            request_timeout_ms: 400,
            settle_delay_ms: 20,
            prompt_delay_ms: 5,
            ..AssistantConfig::default()
        }
    }

    #[tokio::test]
    async fn sends_setup_then_prompt() {
        let (connector, mut peer) = ChannelConnector::pair();
        let session = OneShotSession::new(Arc::new(connector), fast_config());

        let server = tokio::spawn(async move {
            let setup = peer.next_frame().await.unwrap();
            let prompt = peer.next_frame().await.unwrap();
            peer.send(json!({"serverContent": {"turnComplete": true}}));
            (setup, prompt)
        });

        let actions = session
            .generate_schedule("plan my day", "Monday 08:00", &[], &[])
            .await
            .unwrap();
        assert!(actions.is_empty());

        let (setup, prompt) = server.await.unwrap();
        assert_eq!(
            setup["setup"]["generation_config"]["response_modalities"],
            json!(["AUDIO"])
        );
        assert!(setup["setup"]["generation_config"].get("speech_config").is_none());
        assert_eq!(prompt["client_content"]["turn_complete"], true);
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let session = OneShotSession::new(Arc::new(ChannelConnector::refusing()), fast_config());
        let err = session.generate_schedule("x", "now", &[], &[]).await.unwrap_err();
        assert!(matches!(err, PlannerError::Transport(_)));
    }

    #[tokio::test]
    async fn burst_of_calls_is_collected_within_settle_window() {
        let (connector, mut peer) = ChannelConnector::pair();
        let session = OneShotSession::new(Arc::new(connector), fast_config());

        let server = tokio::spawn(async move {
            peer.next_frame().await;
            peer.next_frame().await;
            peer.send(json!({"toolCall": {"functionCalls": [
                {"id": "1", "name": "create_task", "args": {"title": "A", "startTime": "09:00"}}
            ]}}));
            peer.send(json!({"toolCall": {"functionCalls": [
                {"id": "2", "name": "create_task", "args": {"title": "B"}}
            ]}}));
            peer
        });

        let actions = session.generate_schedule("x", "now", &[], &[]).await.unwrap();
        let peer = server.await.unwrap();
        assert_eq!(actions.len(), 2);
        assert!(peer.client_closed());
    }
}
