//! Loopback transport: the peer is the dispatcher's own queue.
//!
//! Each accepted request is answered by posting the [`SessionEvent`]s a real
//! peer would eventually produce.  Nothing is applied synchronously; the
//! replies take effect the next time the dispatcher drains its queue.

use std::sync::OnceLock;

use console_core::mux::{
    ChannelEvent, ChannelId, ChannelOptions, ChannelSession, CloseInfo, DispatcherHandle,
    SessionEvent, SessionId,
};
use tracing::{debug, warn};

/// Close code the loopback peer reports for a normal close.
pub const NORMAL_CLOSE: u16 = 1000;

/// A transport that answers its own requests.
///
/// The session id is only known after the transport has been attached to a
/// dispatcher, so it is supplied afterwards with [`LoopbackTransport::bind`].
/// Requests made before binding are refused.
#[derive(Debug)]
pub struct LoopbackTransport {
    handle: DispatcherHandle,
    session: OnceLock<SessionId>,
}

impl LoopbackTransport {
    pub fn new(handle: DispatcherHandle) -> Self {
        Self {
            handle,
            session: OnceLock::new(),
        }
    }

    /// Sets the session id used in posted events.  Returns `false` if the
    /// transport was already bound.
    pub fn bind(&self, session: SessionId) -> bool {
        self.session.set(session).is_ok()
    }

    /// Reports the session as connected.
    pub fn connect(&self) -> bool {
        self.with_session(|session| SessionEvent::Connected { session })
    }

    /// Reports the session as lost.
    pub fn disconnect(&self) -> bool {
        self.with_session(|session| SessionEvent::Disconnected { session })
    }

    /// Simulates the peer opening `channel`.
    pub fn peer_open(&self, channel: ChannelId, options: ChannelOptions) -> bool {
        self.with_session(|session| SessionEvent::PeerOpened {
            session,
            channel,
            options,
        })
    }

    fn with_session(&self, event: impl FnOnce(SessionId) -> SessionEvent) -> bool {
        match self.session.get() {
            Some(&session) => self.handle.post(event(session)),
            None => {
                warn!("loopback transport used before bind");
                false
            }
        }
    }

    fn post_channel(&self, channel: ChannelId, events: Vec<ChannelEvent>) -> bool {
        let Some(&session) = self.session.get() else {
            warn!(channel, "loopback transport used before bind");
            return false;
        };
        events.into_iter().all(|event| {
            self.handle.post(SessionEvent::Channel {
                session,
                channel,
                event,
            })
        })
    }
}

impl ChannelSession for LoopbackTransport {
    fn open_channel(&self, channel: ChannelId, options: &ChannelOptions) -> bool {
        debug!(channel, name = %options.name, "loopback accepting open");
        self.post_channel(channel, vec![ChannelEvent::Opened])
    }

    fn send(&self, channel: ChannelId, data: &[u8]) -> bool {
        self.post_channel(channel, vec![ChannelEvent::Message(data.to_vec())])
    }

    fn close_channel(&self, channel: ChannelId) -> bool {
        debug!(channel, "loopback closing");
        self.post_channel(
            channel,
            vec![
                ChannelEvent::Closing,
                ChannelEvent::Closed(CloseInfo::local(NORMAL_CLOSE, "closed")),
            ],
        )
    }
}
