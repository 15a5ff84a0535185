//! Virtual-channel multiplexing: channels, listeners and the dispatcher that
//! owns them.

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod id;
pub mod listener;
pub mod pattern;
pub mod session;

pub use channel::{
    Channel, ChannelErrorInfo, ChannelEvent, ChannelOptions, ChannelProtocol, ChannelState,
    CloseInfo,
};
pub use dispatcher::{
    DispatchCommand, Dispatcher, DispatcherHandle, SessionEvent, SESSION_LOST_CODE,
};
pub use error::MuxError;
pub use id::IdAllocator;
pub use listener::{Listener, ListenerCallbacks, ListenerScope, ListenerState};
pub use pattern::NamePattern;
pub use session::{ChannelId, ChannelSession, ListenerDispatcher, ListenerId, SessionId};
