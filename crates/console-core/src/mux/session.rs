//! The seam between the multiplexing layer and the transport that actually
//! moves bytes.
//!
//! The transport (framing, sockets, reconnects) lives outside this crate.  The
//! core only needs a handful of non-blocking requests from it, each answered
//! with an immediate accept/reject flag.  The real outcome of a request
//! arrives later as a [`SessionEvent`](crate::mux::SessionEvent) fed into the
//! [`Dispatcher`](crate::mux::Dispatcher).

use uuid::Uuid;

use crate::mux::channel::ChannelOptions;

/// Identifies one transport session.
pub type SessionId = Uuid;

/// Identifies a channel within a session.
pub type ChannelId = u32;

/// Identifies a registered listener.
pub type ListenerId = u32;

/// Requests a [`Channel`](crate::mux::Channel) makes of its owning session.
///
/// Implementations must not block; queue the work and return whether it was
/// accepted.
#[cfg_attr(test, mockall::automock)]
pub trait ChannelSession: Send + Sync {
    /// Asks the peer to open `channel` with the given options.
    fn open_channel(&self, channel: ChannelId, options: &ChannelOptions) -> bool;

    /// Queues `data` for delivery on `channel`.
    fn send(&self, channel: ChannelId, data: &[u8]) -> bool;

    /// Starts closing `channel`.
    fn close_channel(&self, channel: ChannelId) -> bool;
}

/// Requests a [`Listener`](crate::mux::Listener) makes of its dispatcher.
#[cfg_attr(test, mockall::automock)]
pub trait ListenerDispatcher: Send + Sync {
    /// Deregisters `listener` from future dispatch.
    fn close_listener(&self, listener: ListenerId) -> bool;
}
