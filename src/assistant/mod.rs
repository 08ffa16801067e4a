//! Assistant sessions: natural language or speech in, schedule actions out.
//!
//! Both session kinds speak the same tool-calling protocol to the remote
//! model. [`OneShotSession`] answers one typed request and leaves applying the
//! result to the caller; [`VoiceSession`] stays connected, streams microphone
//! audio, plays the model's replies, and applies tool calls as they arrive.

pub mod oneshot;
pub mod protocol;
pub mod tools;
pub mod transport;
pub mod voice;

pub use oneshot::OneShotSession;
pub use transport::{ChannelConnector, ChannelPeer, Connector, Transport, WsConnector};
pub use voice::{SessionState, VoiceMachine, VoiceSession, VoiceSessionHandle};
