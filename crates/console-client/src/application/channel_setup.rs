//! ChannelSetupUseCase: registers configured listeners and opens configured
//! channels on a [`Dispatcher`].
//!
//! What a listener *does* when it fires is not configuration; it is supplied
//! by a [`ListenerHooks`] implementation injected at construction time.

use std::sync::Arc;

use console_core::mux::{
    ChannelId, ChannelOptions, Dispatcher, ListenerCallbacks, ListenerId, ListenerScope, MuxError,
    SessionId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Error type for channel setup.
#[derive(Debug, Error, PartialEq)]
pub enum SetupError {
    /// A listener is scoped to a session name no attached session carries.
    #[error("listener '{listener}' is scoped to unknown session '{session}'")]
    UnknownSessionName { listener: String, session: String },

    #[error(transparent)]
    Mux(#[from] MuxError),
}

/// A listener as described in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenerSpec {
    /// Channel/session name to match; a `*` makes it a prefix match.
    pub name: String,
    /// Restricts the listener to the session with this name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl ListenerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            session: None,
        }
    }

    pub fn scoped(name: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            session: Some(session.into()),
        }
    }
}

/// Supplies the callbacks for each configured listener.
#[cfg_attr(test, mockall::automock)]
pub trait ListenerHooks: Send + Sync {
    fn callbacks_for(&self, spec: &ListenerSpec) -> ListenerCallbacks;
}

/// What [`ChannelSetupUseCase::open_channels`] managed to do.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OpenReport {
    /// Ids of channels whose open request the transport accepted.
    pub requested: Vec<ChannelId>,
    /// Names of channels the transport refused.
    pub rejected: Vec<String>,
}

/// The Channel Setup use case.
pub struct ChannelSetupUseCase {
    channels: Vec<ChannelOptions>,
    listeners: Vec<ListenerSpec>,
    hooks: Arc<dyn ListenerHooks>,
}

impl ChannelSetupUseCase {
    pub fn new(
        channels: Vec<ChannelOptions>,
        listeners: Vec<ListenerSpec>,
        hooks: Arc<dyn ListenerHooks>,
    ) -> Self {
        Self {
            channels,
            listeners,
            hooks,
        }
    }

    /// Registers every configured listener, in configuration order.
    ///
    /// Session-scoped listeners need their session attached first.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::UnknownSessionName`] for the first listener whose
    /// session is not attached.  Listeners before it stay registered.
    pub fn register_listeners(
        &self,
        dispatcher: &mut Dispatcher,
    ) -> Result<Vec<ListenerId>, SetupError> {
        let mut ids = Vec::with_capacity(self.listeners.len());
        for spec in &self.listeners {
            let scope = match &spec.session {
                None => ListenerScope::AllSessions,
                Some(session) => dispatcher
                    .session_by_name(session)
                    .map(ListenerScope::Session)
                    .ok_or_else(|| SetupError::UnknownSessionName {
                        listener: spec.name.clone(),
                        session: session.clone(),
                    })?,
            };
            let id = dispatcher.create_listener(&spec.name, scope, self.hooks.callbacks_for(spec));
            ids.push(id);
        }
        info!(count = ids.len(), "listeners registered from configuration");
        Ok(ids)
    }

    /// Requests every configured channel on `session`.
    ///
    /// A refused channel is recorded in the report and does not stop the rest.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Mux`] if the session is not attached.
    pub fn open_channels(
        &self,
        dispatcher: &mut Dispatcher,
        session: SessionId,
    ) -> Result<OpenReport, SetupError> {
        let mut report = OpenReport::default();
        for options in &self.channels {
            match dispatcher.open_channel(session, options.clone()) {
                Ok(id) => report.requested.push(id),
                Err(MuxError::OpenRejected(_)) => {
                    warn!(name = %options.name, "configured channel refused by transport");
                    report.rejected.push(options.name.clone());
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!(
            session = %session,
            requested = report.requested.len(),
            rejected = report.rejected.len(),
            "configured channels requested"
        );
        Ok(report)
    }
}
