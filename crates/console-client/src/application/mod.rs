//! Application layer use cases for the client application.
//!
//! - **`update_stream`** – Decodes Elias-gamma coded update frames and keeps
//!   counters of complete and aborted frames.
//!
//! - **`channel_setup`** – Turns the `[[channels]]` and `[[listeners]]`
//!   sections of the configuration into registered listeners and open
//!   requests on a dispatcher.

pub mod channel_setup;
pub mod update_stream;
