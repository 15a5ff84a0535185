//! Recording transport for tests.
//!
//! Every request is pushed into a `Mutex<Vec<TransportCall>>` so assertions
//! can inspect exactly what the channel layer asked for, and in what order.
//!
//! # `set_reject`
//!
//! While rejecting, every request is still recorded but answered with
//! `false`, which lets callers exercise their refusal paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use console_core::mux::{ChannelId, ChannelOptions, ChannelSession};

/// One request received by a [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Open { channel: ChannelId, name: String },
    Send { channel: ChannelId, data: Vec<u8> },
    Close { channel: ChannelId },
}

/// A transport that records all requests and never moves any bytes.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    reject: AtomicBool,
}

impl RecordingTransport {
    /// Creates a transport that accepts every request.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Snapshot of all requests so far.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.records().clone()
    }

    /// Names of the channels an open was requested for, in order.
    pub fn opened_names(&self) -> Vec<String> {
        self.records()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Open { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Payloads sent on `channel`, in order.
    pub fn sent_on(&self, channel: ChannelId) -> Vec<Vec<u8>> {
        self.records()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Send { channel: c, data } if *c == channel => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: TransportCall) -> bool {
        self.records().push(call);
        !self.reject.load(Ordering::SeqCst)
    }

    fn records(&self) -> MutexGuard<'_, Vec<TransportCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChannelSession for RecordingTransport {
    fn open_channel(&self, channel: ChannelId, options: &ChannelOptions) -> bool {
        self.record(TransportCall::Open {
            channel,
            name: options.name.clone(),
        })
    }

    fn send(&self, channel: ChannelId, data: &[u8]) -> bool {
        self.record(TransportCall::Send {
            channel,
            data: data.to_vec(),
        })
    }

    fn close_channel(&self, channel: ChannelId) -> bool {
        self.record(TransportCall::Close { channel })
    }
}
