//! Errors raised by the multiplexing layer.
//!
//! None of these are fatal: a rejected transition or an event for a channel
//! that is already gone is logged by the dispatcher and otherwise ignored.

use thiserror::Error;

use crate::mux::channel::ChannelState;
use crate::mux::listener::ListenerState;
use crate::mux::session::{ChannelId, ListenerId, SessionId};

/// Errors that can occur while managing channels and listeners.
#[derive(Debug, Error, PartialEq)]
pub enum MuxError {
    /// No session with this id is attached to the dispatcher.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    /// The session has no live channel with this id.
    #[error("unknown channel {channel} in session {session}")]
    UnknownChannel { session: SessionId, channel: ChannelId },

    /// No listener with this id is registered.
    #[error("unknown listener: {0}")]
    UnknownListener(ListenerId),

    /// The peer announced a channel id that is already in use.
    #[error("channel {channel} already exists in session {session}")]
    DuplicateChannel { session: SessionId, channel: ChannelId },

    /// The channel state machine does not allow this move.
    #[error("invalid channel transition: {from:?} -> {to:?}")]
    InvalidChannelTransition { from: ChannelState, to: ChannelState },

    /// The listener state machine does not allow this move.
    #[error("invalid listener transition: {from:?} -> {to:?}")]
    InvalidListenerTransition { from: ListenerState, to: ListenerState },

    /// A message arrived for a channel that is not accepting data.
    #[error("channel {channel} is {state:?}; message dropped")]
    NotAcceptingMessages { channel: ChannelId, state: ChannelState },

    /// The transport refused to start opening the channel.
    #[error("transport rejected opening channel {0}")]
    OpenRejected(ChannelId),
}
