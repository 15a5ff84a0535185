//! Infrastructure layer for the client application.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `console_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`storage`** – TOML configuration file persistence.
//!
//! - **`transport`** – In-process implementations of
//!   `console_core::mux::ChannelSession`: a recorder for tests and a loopback
//!   transport that acknowledges requests through the dispatcher queue.

pub mod storage;
pub mod transport;
