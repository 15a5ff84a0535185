//! Listeners: named subscriptions to channel lifecycle events.
//!
//! A listener is created through the dispatcher, which activates it and then
//! calls it whenever a session connects or the peer opens a channel whose
//! name the listener matches (see [`NamePattern`]).  Closing a listener
//! takes it out of dispatch at once and *requests* deregistration; the
//! dispatcher moves it through `Closing` to `Closed` and fires `on_close`
//! once it is gone.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::mux::channel::Channel;
use crate::mux::error::MuxError;
use crate::mux::pattern::NamePattern;
use crate::mux::session::{ListenerDispatcher, ListenerId, SessionId};

/// Lifecycle state of a [`Listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerState {
    Init,
    Active,
    Closing,
    Closed,
}

impl ListenerState {
    pub fn can_transition_to(self, next: ListenerState) -> bool {
        use ListenerState::*;
        matches!(
            (self, next),
            (Init, Active) | (Init, Closing) | (Active, Closing) | (Closing, Closed)
        )
    }
}

/// Which sessions a listener hears about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerScope {
    AllSessions,
    Session(SessionId),
}

impl ListenerScope {
    pub fn covers(&self, session: SessionId) -> bool {
        match self {
            ListenerScope::AllSessions => true,
            ListenerScope::Session(id) => *id == session,
        }
    }
}

pub type ConnectCallback = Box<dyn FnMut(SessionId) + Send>;
pub type PeerOpenCallback = Box<dyn FnMut(SessionId, &mut Channel) + Send>;
pub type ListenerCloseCallback = Box<dyn FnMut() + Send>;

/// The three optional listener callbacks, assembled builder style.
///
/// ```rust
/// use console_core::mux::ListenerCallbacks;
///
/// let callbacks = ListenerCallbacks::new()
///     .on_connect(|session| println!("session {session} connected"))
///     .on_close(|| println!("listener gone"));
/// ```
#[derive(Default)]
pub struct ListenerCallbacks {
    on_connect: Option<ConnectCallback>,
    on_peer_open: Option<PeerOpenCallback>,
    on_close: Option<ListenerCloseCallback>,
}

impl ListenerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(mut self, f: impl FnMut(SessionId) + Send + 'static) -> Self {
        self.on_connect = Some(Box::new(f));
        self
    }

    /// The callback receives the freshly created channel before it is opened,
    /// so it can install the channel's own callbacks.
    pub fn on_peer_open(mut self, f: impl FnMut(SessionId, &mut Channel) + Send + 'static) -> Self {
        self.on_peer_open = Some(Box::new(f));
        self
    }

    pub fn on_close(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }
}

/// A registered subscription.
pub struct Listener {
    id: ListenerId,
    name: String,
    pattern: NamePattern,
    scope: ListenerScope,
    state: ListenerState,
    /// Set once a close request has been accepted by the dispatcher.
    close_requested: AtomicBool,
    callbacks: ListenerCallbacks,
    dispatcher: Arc<dyn ListenerDispatcher>,
}

impl Listener {
    /// Creates a listener in [`ListenerState::Init`].
    pub fn new(
        id: ListenerId,
        name: impl Into<String>,
        scope: ListenerScope,
        callbacks: ListenerCallbacks,
        dispatcher: Arc<dyn ListenerDispatcher>,
    ) -> Self {
        let name = name.into();
        Self {
            id,
            pattern: NamePattern::parse(&name),
            name,
            scope,
            state: ListenerState::Init,
            close_requested: AtomicBool::new(false),
            callbacks,
            dispatcher,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> ListenerScope {
        self.scope
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Asks the dispatcher to deregister this listener.
    ///
    /// Once the request is accepted the listener receives no further events,
    /// even before the dispatcher gets round to removing it.  Returns `false`
    /// without asking when a close is already under way.
    pub fn close(&self) -> bool {
        if self.is_closing() {
            return false;
        }
        let accepted = self.dispatcher.close_listener(self.id);
        if accepted {
            self.close_requested.store(true, Ordering::SeqCst);
        }
        accepted
    }

    /// `true` once `close` has been accepted or the listener left `Active`
    /// for `Closing`/`Closed`.
    pub fn is_closing(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
            || matches!(self.state, ListenerState::Closing | ListenerState::Closed)
    }

    /// `true` if `candidate` matches this listener's name.
    pub fn match_name(&self, candidate: &str) -> bool {
        self.pattern.matches(candidate)
    }

    /// `true` if the listener is active with no close pending, scoped to
    /// `session`, and its name matches `candidate`.
    pub fn wants(&self, session: SessionId, candidate: &str) -> bool {
        self.state == ListenerState::Active
            && !self.close_requested.load(Ordering::SeqCst)
            && self.scope.covers(session)
            && self.match_name(candidate)
    }

    /// Moves the listener to `next`.  Entering `Closed` fires `on_close`.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::InvalidListenerTransition`] for moves the state
    /// graph does not have.
    pub(crate) fn transition(&mut self, next: ListenerState) -> Result<(), MuxError> {
        if !self.state.can_transition_to(next) {
            return Err(MuxError::InvalidListenerTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(listener = self.id, name = %self.name, from = ?self.state, to = ?next, "listener transition");
        self.state = next;
        if next == ListenerState::Closed {
            if let Some(cb) = self.callbacks.on_close.as_mut() {
                cb();
            }
        }
        Ok(())
    }

    pub(crate) fn notify_connect(&mut self, session: SessionId) {
        if let Some(cb) = self.callbacks.on_connect.as_mut() {
            cb(session);
        }
    }

    pub(crate) fn notify_peer_open(&mut self, session: SessionId, channel: &mut Channel) {
        if let Some(cb) = self.callbacks.on_peer_open.as_mut() {
            cb(session, channel);
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("state", &self.state)
            .field("close_requested", &self.close_requested.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
