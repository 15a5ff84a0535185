//! # console-core
//!
//! Shared library for the remote-console client containing the bit-level
//! decoder for the screen-update stream and the virtual-channel layer that
//! multiplexes side streams (clipboard, audio, printing, ...) over one
//! session.
//!
//! It has no dependencies on sockets, rendering or OS APIs.  The transport
//! plugs in through the [`mux::ChannelSession`] trait.
//!
//! # Architecture overview (for beginners)
//!
//! A remote-console server sends the screen as a stream of compressed
//! updates.  Many fields in that stream are not byte-aligned: they are packed
//! bit by bit, and small integers are written with Elias-gamma codes so that
//! common small values take only a few bits.  Next to the screen stream, the
//! same connection carries any number of named *virtual channels*.
//!
//! This crate defines:
//!
//! - **`codec`** – A most-significant-bit-first [`BitReader`] over a byte
//!   slice, and an Elias-gamma decoder built on top of it.  Running off the
//!   end of the buffer is reported as a sticky [`Overflow`] instead of a
//!   panic, so a truncated frame is detected once at the end.
//!
//! - **`mux`** – [`Channel`]s with a strict open/close state machine,
//!   [`Listener`]s that subscribe to channel names (with a trailing `*`
//!   wildcard), and the [`Dispatcher`] that applies session events to both in
//!   order.
//!
//! ```rust
//! use console_core::codec::{read_elias_gamma, BitReader};
//!
//! // `1` then `011` then `00100`: the values 1, 3 and 4.
//! let bytes = [0b1011_0010, 0b0000_0000];
//! let mut reader = BitReader::new(&bytes);
//!
//! assert_eq!(read_elias_gamma(&mut reader), Ok(1));
//! assert_eq!(read_elias_gamma(&mut reader), Ok(3));
//! assert_eq!(read_elias_gamma(&mut reader), Ok(4));
//! ```

pub mod codec;
pub mod mux;

// Re-export the most-used types at the crate root so callers can write
// `console_core::Dispatcher` instead of `console_core::mux::dispatcher::Dispatcher`.
pub use codec::{read_elias_gamma, BitReader, Overflow};
pub use mux::{
    Channel, ChannelEvent, ChannelOptions, ChannelSession, ChannelState, Dispatcher,
    DispatcherHandle, Listener, ListenerCallbacks, ListenerScope, MuxError, SessionEvent,
};
