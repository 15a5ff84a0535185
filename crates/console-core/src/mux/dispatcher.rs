//! The dispatcher: authoritative table of sessions, channels and listeners.
//!
//! # Event loop (for beginners)
//!
//! Everything that changes channel or listener state goes through one place.
//! The transport reports what happened as [`SessionEvent`]s; listeners ask to
//! be closed through a [`DispatcherHandle`].  Both end up as
//! [`DispatchCommand`]s on an unbounded `tokio` channel, and the dispatcher
//! applies them strictly one at a time, in arrival order:
//!
//! ```text
//! transport ──post(SessionEvent)──┐
//!                                 ├──> mpsc ──> Dispatcher::run / run_pending
//! Listener::close ──CloseListener─┘                 │
//!                                                   ├─> Channel::handle_event
//!                                                   └─> Listener callbacks
//! ```
//!
//! Because a single owner applies every command, callbacks never race each
//! other and no locking is needed inside the table.
//!
//! Events can also be applied synchronously with [`Dispatcher::dispatch`],
//! which is what a transport running on the same thread as the application
//! would normally do.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::mux::channel::{
    Channel, ChannelErrorInfo, ChannelEvent, ChannelOptions, ChannelState, CloseInfo,
};
use crate::mux::error::MuxError;
use crate::mux::id::IdAllocator;
use crate::mux::listener::{Listener, ListenerCallbacks, ListenerScope, ListenerState};
use crate::mux::session::{ChannelId, ChannelSession, ListenerDispatcher, ListenerId, SessionId};

/// Close/error code reported to channels that were still alive when their
/// session went away.
pub const SESSION_LOST_CODE: u16 = 1006;

/// Something the transport reports about a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session's connection is established.
    Connected { session: SessionId },
    /// The connection dropped; every live channel of the session ends.
    Disconnected { session: SessionId },
    /// The peer opened a channel.
    PeerOpened {
        session: SessionId,
        channel: ChannelId,
        options: ChannelOptions,
    },
    /// A lifecycle step or data for an existing channel.
    Channel {
        session: SessionId,
        channel: ChannelId,
        event: ChannelEvent,
    },
}

/// Unit of work for the dispatcher loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchCommand {
    Event(SessionEvent),
    CloseListener(ListenerId),
    Shutdown,
}

/// Cheap, cloneable sender side of the dispatcher loop.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: UnboundedSender<DispatchCommand>,
}

impl DispatcherHandle {
    /// Queues a session event.  Returns `false` if the dispatcher is gone.
    pub fn post(&self, event: SessionEvent) -> bool {
        self.tx.send(DispatchCommand::Event(event)).is_ok()
    }

    /// Asks [`Dispatcher::run`] to return after the commands queued so far.
    pub fn shutdown(&self) -> bool {
        self.tx.send(DispatchCommand::Shutdown).is_ok()
    }
}

impl ListenerDispatcher for DispatcherHandle {
    fn close_listener(&self, listener: ListenerId) -> bool {
        self.tx.send(DispatchCommand::CloseListener(listener)).is_ok()
    }
}

struct SessionEntry {
    name: String,
    connected: bool,
    transport: Arc<dyn ChannelSession>,
    channels: BTreeMap<ChannelId, Channel>,
}

/// Owns every channel and listener and serializes all changes to them.
pub struct Dispatcher {
    sessions: HashMap<SessionId, SessionEntry>,
    /// Ordered by id, i.e. by registration order.
    listeners: BTreeMap<ListenerId, Listener>,
    channel_ids: IdAllocator,
    listener_ids: IdAllocator,
    handle: DispatcherHandle,
    commands: UnboundedReceiver<DispatchCommand>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sessions: HashMap::new(),
            listeners: BTreeMap::new(),
            channel_ids: IdAllocator::new(),
            listener_ids: IdAllocator::new(),
            handle: DispatcherHandle { tx },
            commands: rx,
        }
    }

    /// A sender for events and listener-close requests.
    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    /// Registers a transport session.  It counts as connected only after a
    /// [`SessionEvent::Connected`] for it has been applied.
    pub fn attach_session(
        &mut self,
        name: impl Into<String>,
        transport: Arc<dyn ChannelSession>,
    ) -> SessionId {
        let id = Uuid::new_v4();
        let name = name.into();
        info!(session = %id, name = %name, "session attached");
        self.sessions.insert(
            id,
            SessionEntry {
                name,
                connected: false,
                transport,
                channels: BTreeMap::new(),
            },
        );
        id
    }

    /// Ends every channel of the session and forgets it.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::UnknownSession`] if the session is not attached.
    pub fn detach_session(&mut self, session: SessionId) -> Result<(), MuxError> {
        let mut entry = self
            .sessions
            .remove(&session)
            .ok_or(MuxError::UnknownSession(session))?;
        wind_down_channels(&mut entry);
        info!(session = %session, "session detached");
        Ok(())
    }

    pub fn session_name(&self, session: SessionId) -> Option<&str> {
        self.sessions.get(&session).map(|e| e.name.as_str())
    }

    /// First attached session carrying `name`, if any.
    pub fn session_by_name(&self, name: &str) -> Option<SessionId> {
        self.sessions
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, _)| *id)
    }

    pub fn is_connected(&self, session: SessionId) -> bool {
        self.sessions.get(&session).is_some_and(|e| e.connected)
    }

    // ── Listeners ─────────────────────────────────────────────────────────────

    /// Creates, registers and activates a listener.
    pub fn create_listener(
        &mut self,
        name: impl Into<String>,
        scope: ListenerScope,
        callbacks: ListenerCallbacks,
    ) -> ListenerId {
        let id = self.listener_ids.next();
        let dispatcher: Arc<dyn ListenerDispatcher> = Arc::new(self.handle.clone());
        let mut listener = Listener::new(id, name, scope, callbacks, dispatcher);
        if let Err(e) = listener.transition(ListenerState::Active) {
            warn!(listener = id, "could not activate listener: {e}");
        }
        info!(listener = id, name = %listener.name(), scope = ?scope, "listener registered");
        self.listeners.insert(id, listener);
        id
    }

    pub fn listener(&self, id: ListenerId) -> Option<&Listener> {
        self.listeners.get(&id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // ── Channels ──────────────────────────────────────────────────────────────

    /// Creates a channel in `Init` and asks the transport to open it.
    ///
    /// # Errors
    ///
    /// - [`MuxError::UnknownSession`] if the session is not attached.
    /// - [`MuxError::OpenRejected`] if the transport refused the request; no
    ///   channel is created in that case.
    pub fn open_channel(
        &mut self,
        session: SessionId,
        options: ChannelOptions,
    ) -> Result<ChannelId, MuxError> {
        let entry = self
            .sessions
            .get_mut(&session)
            .ok_or(MuxError::UnknownSession(session))?;

        let mut id = self.channel_ids.next();
        // Peer-announced ids share the space; skip any already taken.
        while entry.channels.contains_key(&id) {
            id = self.channel_ids.next();
        }

        if !entry.transport.open_channel(id, &options) {
            warn!(session = %session, channel = id, name = %options.name, "transport rejected channel open");
            return Err(MuxError::OpenRejected(id));
        }

        debug!(session = %session, channel = id, name = %options.name, "channel requested");
        let channel = Channel::new(id, session, options, Arc::clone(&entry.transport));
        entry.channels.insert(id, channel);
        Ok(id)
    }

    pub fn channel(&self, session: SessionId, id: ChannelId) -> Option<&Channel> {
        self.sessions.get(&session)?.channels.get(&id)
    }

    pub fn channel_mut(&mut self, session: SessionId, id: ChannelId) -> Option<&mut Channel> {
        self.sessions.get_mut(&session)?.channels.get_mut(&id)
    }

    /// Number of live (non-terminal) channels in the session.
    pub fn channel_count(&self, session: SessionId) -> usize {
        self.sessions.get(&session).map_or(0, |e| e.channels.len())
    }

    // ── Event application ─────────────────────────────────────────────────────

    /// Applies one session event immediately.
    ///
    /// # Errors
    ///
    /// Returns a [`MuxError`] if the event refers to an unknown session or
    /// channel, or implies an invalid channel transition.  The table is left
    /// consistent in every case.
    pub fn dispatch(&mut self, event: SessionEvent) -> Result<(), MuxError> {
        match event {
            SessionEvent::Connected { session } => self.on_connected(session),
            SessionEvent::Disconnected { session } => self.on_disconnected(session),
            SessionEvent::PeerOpened {
                session,
                channel,
                options,
            } => self.on_peer_opened(session, channel, options),
            SessionEvent::Channel {
                session,
                channel,
                event,
            } => self.on_channel_event(session, channel, event),
        }
    }

    /// Applies every command queued so far, in order.  Returns how many were
    /// taken off the queue.  Stops early at a `Shutdown` command.
    pub fn run_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(command) = self.commands.try_recv() {
            processed += 1;
            if !self.apply(command) {
                break;
            }
        }
        processed
    }

    /// Applies commands as they arrive until a `Shutdown` command is seen.
    pub async fn run(&mut self) {
        while let Some(command) = self.commands.recv().await {
            if !self.apply(command) {
                break;
            }
        }
    }

    /// Returns `false` when the loop should stop.
    fn apply(&mut self, command: DispatchCommand) -> bool {
        match command {
            DispatchCommand::Event(event) => {
                if let Err(e) = self.dispatch(event) {
                    warn!("session event not applied: {e}");
                }
                true
            }
            DispatchCommand::CloseListener(id) => {
                if let Err(e) = self.close_listener_now(id) {
                    debug!("listener close not applied: {e}");
                }
                true
            }
            DispatchCommand::Shutdown => {
                info!("dispatcher shutting down");
                false
            }
        }
    }

    fn close_listener_now(&mut self, id: ListenerId) -> Result<(), MuxError> {
        let mut listener = self
            .listeners
            .remove(&id)
            .ok_or(MuxError::UnknownListener(id))?;
        listener.transition(ListenerState::Closing)?;
        listener.transition(ListenerState::Closed)?;
        info!(listener = id, name = %listener.name(), "listener deregistered");
        Ok(())
    }

    fn on_connected(&mut self, session: SessionId) -> Result<(), MuxError> {
        let entry = self
            .sessions
            .get_mut(&session)
            .ok_or(MuxError::UnknownSession(session))?;
        entry.connected = true;
        info!(session = %session, name = %entry.name, "session connected");

        for listener in self.listeners.values_mut() {
            if listener.wants(session, &entry.name) {
                listener.notify_connect(session);
            }
        }
        Ok(())
    }

    fn on_disconnected(&mut self, session: SessionId) -> Result<(), MuxError> {
        let entry = self
            .sessions
            .get_mut(&session)
            .ok_or(MuxError::UnknownSession(session))?;
        entry.connected = false;
        wind_down_channels(entry);
        info!(session = %session, "session disconnected");
        Ok(())
    }

    fn on_peer_opened(
        &mut self,
        session: SessionId,
        id: ChannelId,
        options: ChannelOptions,
    ) -> Result<(), MuxError> {
        let entry = self
            .sessions
            .get_mut(&session)
            .ok_or(MuxError::UnknownSession(session))?;
        if entry.channels.contains_key(&id) {
            return Err(MuxError::DuplicateChannel {
                session,
                channel: id,
            });
        }

        let mut channel = Channel::new(id, session, options, Arc::clone(&entry.transport));
        // Listeners see the channel before it opens so they can hook it up.
        for listener in self.listeners.values_mut() {
            if listener.wants(session, channel.name()) {
                listener.notify_peer_open(session, &mut channel);
            }
        }
        channel.handle_event(ChannelEvent::Opened)?;
        info!(session = %session, channel = id, name = %channel.name(), "peer opened channel");
        entry.channels.insert(id, channel);
        Ok(())
    }

    fn on_channel_event(
        &mut self,
        session: SessionId,
        id: ChannelId,
        event: ChannelEvent,
    ) -> Result<(), MuxError> {
        let entry = self
            .sessions
            .get_mut(&session)
            .ok_or(MuxError::UnknownSession(session))?;
        let channel = entry
            .channels
            .get_mut(&id)
            .ok_or(MuxError::UnknownChannel {
                session,
                channel: id,
            })?;

        // A transport may report completion without the intermediate step.
        match (&event, channel.state()) {
            (ChannelEvent::Closed(_), ChannelState::Open) => {
                channel.handle_event(ChannelEvent::Closing)?
            }
            (ChannelEvent::PeerClosed(_), ChannelState::Open) => {
                channel.handle_event(ChannelEvent::PeerClosing)?
            }
            _ => {}
        }

        let result = channel.handle_event(event);
        if channel.state().is_terminal() {
            debug!(session = %session, channel = id, state = ?channel.state(), "channel dropped");
            entry.channels.remove(&id);
        }
        result
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives every live channel of `entry` into a terminal state and clears the
/// table.
fn wind_down_channels(entry: &mut SessionEntry) {
    for channel in entry.channels.values_mut() {
        let lost = || CloseInfo::peer(SESSION_LOST_CODE, "session lost");
        let steps = match channel.state() {
            ChannelState::Init => vec![ChannelEvent::OpenFailed(ChannelErrorInfo::new(
                SESSION_LOST_CODE,
                "session lost",
            ))],
            ChannelState::Open => vec![ChannelEvent::PeerClosing, ChannelEvent::PeerClosed(lost())],
            ChannelState::PeerClosing => vec![ChannelEvent::PeerClosed(lost())],
            ChannelState::Closing => vec![ChannelEvent::Closed(CloseInfo::local(
                SESSION_LOST_CODE,
                "session lost",
            ))],
            ChannelState::OpenFailed | ChannelState::Closed | ChannelState::PeerClosed => vec![],
        };
        for step in steps {
            if let Err(e) = channel.handle_event(step) {
                warn!(channel = channel.id(), "wind-down step failed: {e}");
            }
        }
    }
    entry.channels.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::session::MockChannelSession;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn accepting_transport() -> Arc<dyn ChannelSession> {
        let mut transport = MockChannelSession::new();
        transport.expect_open_channel().returning(|_, _| true);
        transport.expect_send().returning(|_, _| true);
        transport.expect_close_channel().returning(|_| true);
        Arc::new(transport)
    }

    fn opened_channel(dispatcher: &mut Dispatcher, session: SessionId, name: &str) -> ChannelId {
        let id = dispatcher
            .open_channel(session, ChannelOptions::named(name))
            .unwrap();
        dispatcher
            .dispatch(SessionEvent::Channel {
                session,
                channel: id,
                event: ChannelEvent::Opened,
            })
            .unwrap();
        id
    }

    // ── Channel table ─────────────────────────────────────────────────────────

    #[test]
    fn test_open_channel_creates_channel_in_init() {
        // Arrange
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());

        // Act
        let id = dispatcher
            .open_channel(session, ChannelOptions::named("clipboard"))
            .unwrap();

        // Assert
        let channel = dispatcher.channel(session, id).unwrap();
        assert_eq!(channel.state(), ChannelState::Init);
        assert_eq!(channel.name(), "clipboard");
        assert_eq!(dispatcher.channel_count(session), 1);
    }

    #[test]
    fn test_open_channel_rejected_by_transport_creates_nothing() {
        // Arrange
        let mut transport = MockChannelSession::new();
        transport.expect_open_channel().returning(|_, _| false);
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", Arc::new(transport));

        // Act
        let result = dispatcher.open_channel(session, ChannelOptions::named("audio"));

        // Assert
        assert!(matches!(result, Err(MuxError::OpenRejected(_))));
        assert_eq!(dispatcher.channel_count(session), 0);
    }

    #[test]
    fn test_open_channel_on_unknown_session_fails() {
        let mut dispatcher = Dispatcher::new();
        let ghost = Uuid::new_v4();

        assert_eq!(
            dispatcher.open_channel(ghost, ChannelOptions::named("x")),
            Err(MuxError::UnknownSession(ghost))
        );
    }

    #[test]
    fn test_channel_ids_are_unique_within_session() {
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());

        let a = dispatcher.open_channel(session, ChannelOptions::named("same")).unwrap();
        let b = dispatcher.open_channel(session, ChannelOptions::named("same")).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_local_channel_skips_id_taken_by_peer() {
        // Arrange – the peer grabs id 1 before we open anything
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        dispatcher
            .dispatch(SessionEvent::PeerOpened {
                session,
                channel: 1,
                options: ChannelOptions::named("peer"),
            })
            .unwrap();

        // Act
        let id = dispatcher.open_channel(session, ChannelOptions::named("mine")).unwrap();

        // Assert
        assert_ne!(id, 1);
        assert_eq!(dispatcher.channel(session, 1).unwrap().name(), "peer");
    }

    #[test]
    fn test_terminal_channel_is_dropped_from_table() {
        // Arrange
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        let id = opened_channel(&mut dispatcher, session, "clipboard");

        // Act
        for event in [
            ChannelEvent::Closing,
            ChannelEvent::Closed(CloseInfo::local(0, "done")),
        ] {
            dispatcher
                .dispatch(SessionEvent::Channel {
                    session,
                    channel: id,
                    event,
                })
                .unwrap();
        }

        // Assert
        assert!(dispatcher.channel(session, id).is_none());
        let late = dispatcher.dispatch(SessionEvent::Channel {
            session,
            channel: id,
            event: ChannelEvent::Opened,
        });
        assert_eq!(
            late,
            Err(MuxError::UnknownChannel {
                session,
                channel: id
            })
        );
    }

    #[test]
    fn test_peer_closed_without_peer_closing_step_is_completed() {
        // Arrange
        let closes = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        let id = opened_channel(&mut dispatcher, session, "clipboard");
        let c = Arc::clone(&closes);
        dispatcher
            .channel_mut(session, id)
            .unwrap()
            .on_close(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });

        // Act
        let result = dispatcher.dispatch(SessionEvent::Channel {
            session,
            channel: id,
            event: ChannelEvent::PeerClosed(CloseInfo::peer(0, "exit")),
        });

        // Assert
        assert!(result.is_ok());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.channel_count(session), 0);
    }

    #[test]
    fn test_channel_mut_leaves_lifecycle_to_dispatch() {
        // Arrange
        let closes = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        let id = opened_channel(&mut dispatcher, session, "clipboard");

        // Act – callers may hook and request, the state stays put
        let channel = dispatcher.channel_mut(session, id).unwrap();
        let c = Arc::clone(&closes);
        channel.on_close(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(channel.close());
        assert_eq!(channel.state(), ChannelState::Open);
        assert_eq!(dispatcher.channel_count(session), 1);

        dispatcher
            .dispatch(SessionEvent::Channel {
                session,
                channel: id,
                event: ChannelEvent::Closed(CloseInfo::local(0, "done")),
            })
            .unwrap();

        // Assert – reaching the terminal state drops it from the table
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.channel_count(session), 0);
        assert!(dispatcher.channel(session, id).is_none());
    }

    #[test]
    fn test_open_failed_channel_is_dropped() {
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        let id = dispatcher.open_channel(session, ChannelOptions::named("usb")).unwrap();

        dispatcher
            .dispatch(SessionEvent::Channel {
                session,
                channel: id,
                event: ChannelEvent::OpenFailed(ChannelErrorInfo::new(2, "denied")),
            })
            .unwrap();

        assert!(dispatcher.channel(session, id).is_none());
    }

    #[test]
    fn test_invalid_transition_is_reported_and_channel_kept() {
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        let id = dispatcher.open_channel(session, ChannelOptions::named("usb")).unwrap();

        let result = dispatcher.dispatch(SessionEvent::Channel {
            session,
            channel: id,
            event: ChannelEvent::Closing,
        });

        assert!(matches!(result, Err(MuxError::InvalidChannelTransition { .. })));
        assert_eq!(dispatcher.channel(session, id).unwrap().state(), ChannelState::Init);
    }

    #[test]
    fn test_disconnect_winds_down_every_channel() {
        // Arrange
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        dispatcher.dispatch(SessionEvent::Connected { session }).unwrap();
        let open = opened_channel(&mut dispatcher, session, "open");
        let pending = dispatcher.open_channel(session, ChannelOptions::named("pending")).unwrap();
        let l = Arc::clone(&log);
        dispatcher
            .channel_mut(session, open)
            .unwrap()
            .on_close(move |info| l.lock().unwrap().push(format!("close:{}", info.code)));
        let l = Arc::clone(&log);
        dispatcher
            .channel_mut(session, pending)
            .unwrap()
            .on_error(move |info| l.lock().unwrap().push(format!("error:{}", info.code)));

        // Act
        dispatcher.dispatch(SessionEvent::Disconnected { session }).unwrap();

        // Assert
        let mut seen = log.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["close:1006", "error:1006"]);
        assert_eq!(dispatcher.channel_count(session), 0);
        assert!(!dispatcher.is_connected(session));
    }

    #[test]
    fn test_detach_session_forgets_it() {
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        opened_channel(&mut dispatcher, session, "a");

        assert_eq!(dispatcher.session_by_name("desktop"), Some(session));
        dispatcher.detach_session(session).unwrap();

        assert!(dispatcher.session_name(session).is_none());
        assert!(dispatcher.session_by_name("desktop").is_none());
        assert_eq!(
            dispatcher.detach_session(session),
            Err(MuxError::UnknownSession(session))
        );
    }

    // ── Listener routing ──────────────────────────────────────────────────────

    #[test]
    fn test_connect_is_routed_by_session_name_and_scope() {
        // Arrange
        let hits = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let desk = dispatcher.attach_session("desk-01", accepting_transport());
        let lab = dispatcher.attach_session("lab-01", accepting_transport());
        for (label, name, scope) in [
            ("desk*", "desk*", ListenerScope::AllSessions),
            ("all", "*", ListenerScope::AllSessions),
            ("lab-only", "*", ListenerScope::Session(lab)),
        ] {
            let h = Arc::clone(&hits);
            dispatcher.create_listener(
                name,
                scope,
                ListenerCallbacks::new().on_connect(move |_| h.lock().unwrap().push(label)),
            );
        }

        // Act
        dispatcher.dispatch(SessionEvent::Connected { session: desk }).unwrap();

        // Assert – registration order, lab-only filtered by scope
        assert_eq!(*hits.lock().unwrap(), vec!["desk*", "all"]);
        assert!(dispatcher.is_connected(desk));
    }

    #[test]
    fn test_peer_open_lets_listener_hook_channel_before_open() {
        // Arrange
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        let e = Arc::clone(&events);
        dispatcher.create_listener(
            "print*",
            ListenerScope::AllSessions,
            ListenerCallbacks::new().on_peer_open(move |_, channel| {
                assert_eq!(channel.state(), ChannelState::Init);
                let e = Arc::clone(&e);
                channel.on_open(move || e.lock().unwrap().push("opened"));
            }),
        );

        // Act
        dispatcher
            .dispatch(SessionEvent::PeerOpened {
                session,
                channel: 40,
                options: ChannelOptions::named("printer-1"),
            })
            .unwrap();

        // Assert
        assert_eq!(*events.lock().unwrap(), vec!["opened"]);
        assert_eq!(
            dispatcher.channel(session, 40).unwrap().state(),
            ChannelState::Open
        );
    }

    #[test]
    fn test_peer_open_with_unmatched_name_skips_listener() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        let h = Arc::clone(&hits);
        dispatcher.create_listener(
            "audio",
            ListenerScope::AllSessions,
            ListenerCallbacks::new().on_peer_open(move |_, _| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );

        dispatcher
            .dispatch(SessionEvent::PeerOpened {
                session,
                channel: 5,
                options: ChannelOptions::named("audio-in"),
            })
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        // The channel still exists without a subscriber.
        assert!(dispatcher.channel(session, 5).is_some());
    }

    #[test]
    fn test_duplicate_peer_channel_is_rejected() {
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        let event = SessionEvent::PeerOpened {
            session,
            channel: 9,
            options: ChannelOptions::named("dup"),
        };
        dispatcher.dispatch(event.clone()).unwrap();

        assert_eq!(
            dispatcher.dispatch(event),
            Err(MuxError::DuplicateChannel {
                session,
                channel: 9
            })
        );
    }

    #[test]
    fn test_listener_close_goes_through_queue() {
        // Arrange
        let closed = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new();
        let c = Arc::clone(&closed);
        let id = dispatcher.create_listener(
            "*",
            ListenerScope::AllSessions,
            ListenerCallbacks::new().on_close(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(dispatcher.listener(id).unwrap().state(), ListenerState::Active);

        // Act
        assert!(dispatcher.listener(id).unwrap().close());
        assert_eq!(closed.load(Ordering::SeqCst), 0, "close is asynchronous");
        let processed = dispatcher.run_pending();

        // Assert
        assert_eq!(processed, 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(dispatcher.listener(id).is_none());
    }

    #[test]
    fn test_closed_listener_no_longer_receives_events() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        let h = Arc::clone(&hits);
        let id = dispatcher.create_listener(
            "*",
            ListenerScope::AllSessions,
            ListenerCallbacks::new().on_connect(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        dispatcher.listener(id).unwrap().close();
        dispatcher.run_pending();

        dispatcher.dispatch(SessionEvent::Connected { session }).unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn test_double_close_request_is_tolerated() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new();
        let c = Arc::clone(&closed);
        let id = dispatcher.create_listener(
            "*",
            ListenerScope::AllSessions,
            ListenerCallbacks::new().on_close(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let listener = dispatcher.listener(id).unwrap();
        assert!(listener.close());
        assert!(!listener.close());
        // A stale duplicate posted straight through the handle.
        assert!(dispatcher.handle().close_listener(id));

        assert_eq!(dispatcher.run_pending(), 2);

        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_closed_but_not_yet_drained_gets_no_events() {
        // Arrange
        let hits = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        let (on_connect, on_peer_open) = (Arc::clone(&hits), Arc::clone(&hits));
        let id = dispatcher.create_listener(
            "*",
            ListenerScope::AllSessions,
            ListenerCallbacks::new()
                .on_connect(move |_| on_connect.lock().unwrap().push("connect"))
                .on_peer_open(move |_, _| on_peer_open.lock().unwrap().push("peer-open")),
        );

        // Act – the close request is still queued when these are applied
        assert!(dispatcher.listener(id).unwrap().close());
        dispatcher.dispatch(SessionEvent::Connected { session }).unwrap();
        dispatcher
            .dispatch(SessionEvent::PeerOpened {
                session,
                channel: 12,
                options: ChannelOptions::named("printer"),
            })
            .unwrap();

        // Assert
        assert!(hits.lock().unwrap().is_empty());
        assert_eq!(dispatcher.listener(id).unwrap().state(), ListenerState::Active);
        assert_eq!(dispatcher.run_pending(), 1);
        assert!(dispatcher.listener(id).is_none());
    }

    // ── Queue ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_posted_events_apply_in_order() {
        // Arrange
        let received = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        let id = opened_channel(&mut dispatcher, session, "stream");
        let r = Arc::clone(&received);
        dispatcher
            .channel_mut(session, id)
            .unwrap()
            .on_message(move |data| r.lock().unwrap().push(data[0]));
        let handle = dispatcher.handle();

        // Act
        for byte in 0..5u8 {
            assert!(handle.post(SessionEvent::Channel {
                session,
                channel: id,
                event: ChannelEvent::Message(vec![byte]),
            }));
        }
        dispatcher.run_pending();

        // Assert
        assert_eq!(*received.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_run_pending_stops_at_shutdown() {
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        let handle = dispatcher.handle();
        handle.shutdown();
        handle.post(SessionEvent::Connected { session });

        assert_eq!(dispatcher.run_pending(), 1);
        assert!(!dispatcher.is_connected(session));
        assert_eq!(dispatcher.run_pending(), 1);
        assert!(dispatcher.is_connected(session));
    }

    #[tokio::test]
    async fn test_run_applies_commands_until_shutdown() {
        // Arrange
        let mut dispatcher = Dispatcher::new();
        let session = dispatcher.attach_session("desktop", accepting_transport());
        let handle = dispatcher.handle();

        // Act – post from another task, then stop the loop
        let producer = tokio::spawn(async move {
            handle.post(SessionEvent::Connected { session });
            handle.post(SessionEvent::PeerOpened {
                session,
                channel: 3,
                options: ChannelOptions::named("shell"),
            });
            handle.shutdown();
        });
        dispatcher.run().await;
        producer.await.unwrap();

        // Assert
        assert!(dispatcher.is_connected(session));
        assert!(dispatcher.channel(session, 3).is_some());
    }
}
