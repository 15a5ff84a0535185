//! console-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does console-client do? (for beginners)
//!
//! The client is the viewer side of a remote console.  It receives the
//! screen as a stream of bit-packed updates and, next to it, any number of
//! named virtual channels (clipboard, printing, audio, ...).
//!
//! The client application:
//!
//! 1. Loads its configuration: which channels to open and which channel
//!    names to listen for.
//! 2. Attaches a transport session to the `console_core` dispatcher and
//!    registers the configured listeners.
//! 3. Opens the configured channels once the session connects.
//! 4. Decodes update frames, aborting any frame whose data is truncated.

/// Application layer: use cases for the client.
pub mod application;

/// Infrastructure layer: configuration storage and transports.
pub mod infrastructure;
