//! Virtual channels: one logical byte stream multiplexed over a session.
//!
//! # Lifecycle
//!
//! ```text
//!            ┌──────────> OPEN_FAILED
//!   INIT ────┤
//!            └──────────> OPEN ──┬──> CLOSING ──────> CLOSED
//!                                └──> PEER_CLOSING ─> PEER_CLOSED
//! ```
//!
//! `OPEN_FAILED`, `CLOSED` and `PEER_CLOSED` are terminal.  The session layer
//! is the only party that moves a channel along this graph, by feeding it
//! [`ChannelEvent`]s.  Application code holding a channel only *requests*
//! things (`send`, `close`) and learns the outcome through its callbacks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::mux::error::MuxError;
use crate::mux::session::{ChannelId, ChannelSession, SessionId};

/// Lifecycle state of a [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Init,
    Open,
    OpenFailed,
    Closing,
    Closed,
    PeerClosing,
    PeerClosed,
}

impl ChannelState {
    /// `true` for states no transition leaves.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChannelState::OpenFailed | ChannelState::Closed | ChannelState::PeerClosed
        )
    }

    /// `true` if the state graph has an edge from `self` to `next`.
    pub fn can_transition_to(self, next: ChannelState) -> bool {
        use ChannelState::*;
        matches!(
            (self, next),
            (Init, Open)
                | (Init, OpenFailed)
                | (Open, Closing)
                | (Closing, Closed)
                | (Open, PeerClosing)
                | (PeerClosing, PeerClosed)
        )
    }

    /// Data is still delivered while either side is winding the channel down.
    pub fn accepts_messages(self) -> bool {
        matches!(
            self,
            ChannelState::Open | ChannelState::Closing | ChannelState::PeerClosing
        )
    }
}

/// Payload encoding carried by a channel.  Only binary channels exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelProtocol {
    #[default]
    Binary,
}

/// Parameters a channel is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOptions {
    /// Channel name; several channels may share one.
    pub name: String,
    /// Scheduling priority hint for the transport (higher is more urgent).
    #[serde(default)]
    pub priority: u8,
    /// Opaque flag bits passed through to the peer.
    #[serde(default)]
    pub flags: u32,
    /// How long the peer has to accept the open request.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub protocol: ChannelProtocol,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl ChannelOptions {
    /// Options with the given name and default priority, flags and timeout.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            flags: 0,
            connect_timeout_ms: default_connect_timeout_ms(),
            protocol: ChannelProtocol::Binary,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Why a channel closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Transport-defined close code; 0 is a normal close.
    pub code: u16,
    pub reason: String,
    /// `true` when the peer initiated the close.
    pub by_peer: bool,
}

impl CloseInfo {
    pub fn local(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            by_peer: false,
        }
    }

    pub fn peer(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            by_peer: true,
        }
    }
}

/// An error reported for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelErrorInfo {
    pub code: u16,
    pub message: String,
}

impl ChannelErrorInfo {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Something the session layer tells a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The peer accepted the open request.
    Opened,
    /// The open request failed or timed out.
    OpenFailed(ChannelErrorInfo),
    /// A locally requested close is in progress.
    Closing,
    /// The locally requested close completed.
    Closed(CloseInfo),
    /// The peer started closing the channel.
    PeerClosing,
    /// The peer finished closing the channel.
    PeerClosed(CloseInfo),
    /// Inbound data.
    Message(Vec<u8>),
    /// A non-fatal error on an otherwise live channel.
    Error(ChannelErrorInfo),
}

pub type OpenCallback = Box<dyn FnMut() + Send>;
pub type CloseCallback = Box<dyn FnMut(&CloseInfo) + Send>;
pub type ErrorCallback = Box<dyn FnMut(&ChannelErrorInfo) + Send>;
pub type MessageCallback = Box<dyn FnMut(&[u8]) + Send>;

#[derive(Default)]
struct ChannelCallbacks {
    on_open: Option<OpenCallback>,
    on_close: Option<CloseCallback>,
    on_error: Option<ErrorCallback>,
    on_message: Option<MessageCallback>,
}

/// One logical channel inside a session.
///
/// The channel is a thin relay: `send` and `close` go straight to the owning
/// session and return its accept flag.  It does no buffering, framing or
/// retrying of its own.
///
/// State only moves when the owning [`Dispatcher`](crate::mux::Dispatcher)
/// applies a session event; code holding a `&mut Channel` can install
/// callbacks but cannot drive the lifecycle itself:
///
/// ```compile_fail
/// use console_core::mux::{Channel, ChannelEvent};
///
/// fn force_open(channel: &mut Channel) {
///     let _ = channel.handle_event(ChannelEvent::Opened);
/// }
/// ```
pub struct Channel {
    id: ChannelId,
    session_id: SessionId,
    options: ChannelOptions,
    state: ChannelState,
    callbacks: ChannelCallbacks,
    session: Arc<dyn ChannelSession>,
}

impl Channel {
    /// Creates a channel in [`ChannelState::Init`].
    pub fn new(
        id: ChannelId,
        session_id: SessionId,
        options: ChannelOptions,
        session: Arc<dyn ChannelSession>,
    ) -> Self {
        Self {
            id,
            session_id,
            options,
            state: ChannelState::Init,
            callbacks: ChannelCallbacks::default(),
            session,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Forwards `data` to the session and returns whether it was accepted.
    ///
    /// The state is not checked here; whether a non-open channel
    /// may send is the session's decision.
    pub fn send(&self, data: &[u8]) -> bool {
        let accepted = self.session.send(self.id, data);
        if !accepted {
            debug!(channel = self.id, len = data.len(), "send rejected by session");
        }
        accepted
    }

    /// Asks the session to start closing this channel.
    ///
    /// Returns `false` without contacting the session once the channel has
    /// reached a terminal state.  The state itself only changes when the
    /// session reports back.
    pub fn close(&self) -> bool {
        if self.state.is_terminal() {
            debug!(channel = self.id, state = ?self.state, "close on finished channel ignored");
            return false;
        }
        self.session.close_channel(self.id)
    }

    pub fn on_open(&mut self, f: impl FnMut() + Send + 'static) {
        self.callbacks.on_open = Some(Box::new(f));
    }

    pub fn on_close(&mut self, f: impl FnMut(&CloseInfo) + Send + 'static) {
        self.callbacks.on_close = Some(Box::new(f));
    }

    pub fn on_error(&mut self, f: impl FnMut(&ChannelErrorInfo) + Send + 'static) {
        self.callbacks.on_error = Some(Box::new(f));
    }

    pub fn on_message(&mut self, f: impl FnMut(&[u8]) + Send + 'static) {
        self.callbacks.on_message = Some(Box::new(f));
    }

    /// Applies one event from the session layer: moves the state and invokes
    /// the matching callback.
    ///
    /// # Errors
    ///
    /// - [`MuxError::InvalidChannelTransition`] if the event implies a move
    ///   the state graph does not have (the state is left untouched).
    /// - [`MuxError::NotAcceptingMessages`] for data on a channel that is not
    ///   open or winding down.
    pub(crate) fn handle_event(&mut self, event: ChannelEvent) -> Result<(), MuxError> {
        match event {
            ChannelEvent::Opened => {
                self.transition(ChannelState::Open)?;
                if let Some(cb) = self.callbacks.on_open.as_mut() {
                    cb();
                }
            }
            ChannelEvent::OpenFailed(info) => {
                self.transition(ChannelState::OpenFailed)?;
                if let Some(cb) = self.callbacks.on_error.as_mut() {
                    cb(&info);
                }
            }
            ChannelEvent::Closing => self.transition(ChannelState::Closing)?,
            ChannelEvent::PeerClosing => self.transition(ChannelState::PeerClosing)?,
            ChannelEvent::Closed(info) => {
                self.transition(ChannelState::Closed)?;
                if let Some(cb) = self.callbacks.on_close.as_mut() {
                    cb(&info);
                }
            }
            ChannelEvent::PeerClosed(info) => {
                self.transition(ChannelState::PeerClosed)?;
                if let Some(cb) = self.callbacks.on_close.as_mut() {
                    cb(&info);
                }
            }
            ChannelEvent::Message(data) => {
                if !self.state.accepts_messages() {
                    return Err(MuxError::NotAcceptingMessages {
                        channel: self.id,
                        state: self.state,
                    });
                }
                if let Some(cb) = self.callbacks.on_message.as_mut() {
                    cb(&data);
                }
            }
            ChannelEvent::Error(info) => {
                if self.state.is_terminal() {
                    debug!(channel = self.id, "error on finished channel dropped: {}", info.message);
                    return Ok(());
                }
                if let Some(cb) = self.callbacks.on_error.as_mut() {
                    cb(&info);
                }
            }
        }
        Ok(())
    }

    fn transition(&mut self, next: ChannelState) -> Result<(), MuxError> {
        if !self.state.can_transition_to(next) {
            warn!(channel = self.id, from = ?self.state, to = ?next, "rejected channel transition");
            return Err(MuxError::InvalidChannelTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(channel = self.id, from = ?self.state, to = ?next, "channel transition");
        self.state = next;
        Ok(())
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("options", &self.options)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
