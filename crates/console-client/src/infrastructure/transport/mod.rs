//! In-process transports implementing [`ChannelSession`].
//!
//! A real client drives channels over its network session; these two stand
//! in for it.
//!
//! - **`recording`** – Records every request and answers with a configurable
//!   accept/reject flag.  Used by tests.
//! - **`loopback`** – Acknowledges requests by posting the matching
//!   [`SessionEvent`]s back through a [`DispatcherHandle`], and echoes sent
//!   data as inbound messages.  Used by the `demo` command.
//!
//! [`ChannelSession`]: console_core::mux::ChannelSession
//! [`SessionEvent`]: console_core::mux::SessionEvent
//! [`DispatcherHandle`]: console_core::mux::DispatcherHandle

pub mod loopback;
pub mod recording;

pub use loopback::LoopbackTransport;
pub use recording::{RecordingTransport, TransportCall};
