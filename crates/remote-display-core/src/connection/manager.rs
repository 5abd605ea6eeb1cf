//! Connection manager actor.
//!
//! One task owns the session. Signaling handlers, transport callbacks and
//! negotiation continuations only push `Command`s into its queue, so every
//! mutation of a session is serialized and no handler blocks on negotiation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use remote_display_common::{
    Error, IceCandidate, MessageKind, Result, SdpKind, SessionDescription, SignalingMessage,
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::session::{Session, SessionInfo};
use super::state::{ConnectionState, Role};
use super::transport::{Connectivity, PeerTransport, TransportEvent, TransportFactory};
use crate::registry::{MediaStream, StreamRegistry};
use crate::signaling::SignalingChannel;
use crate::subscription::SubscriptionId;
use crate::surface::presentation::{require_presentation, PresentationContext};

/// Candidates kept while no session exists to receive them.
const MAX_ORPHAN_CANDIDATES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub role: Role,
    /// Refuse to create a transport unless a presentation session and
    /// reference space exist.
    pub require_presentation: bool,
}

impl ConnectionConfig {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            require_presentation: false,
        }
    }
}

enum Command {
    Signal(SignalingMessage),
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    TransportReady {
        generation: u64,
        transport: Arc<dyn PeerTransport>,
    },
    RemoteApplied {
        generation: u64,
    },
    LocalDescription {
        generation: u64,
        description: SessionDescription,
    },
    NegotiationError {
        generation: u64,
        error: Error,
    },
    CandidateRejected {
        generation: u64,
        error: Error,
    },
    SessionInfo(oneshot::Sender<Option<SessionInfo>>),
    Shutdown(oneshot::Sender<()>),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Caller-side handle to a running connection manager.
pub struct ConnectionHandle {
    role: Role,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    last_error: Arc<Mutex<Option<String>>>,
    running: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Most recent failure, if any.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    /// Snapshot of the current session; `None` when idle, torn down or stopped.
    pub async fn session_info(&self) -> Option<SessionInfo> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::SessionInfo(tx)).ok()?;
        rx.await.ok().flatten()
    }

    /// Stop emitting immediately, then tear down the session and close its
    /// transport. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let (tx, _rx) = oneshot::channel();
        let _ = self.commands.send(Command::Shutdown(tx));
    }
}

pub struct ConnectionManager {
    config: ConnectionConfig,
    signaling: Arc<dyn SignalingChannel>,
    transports: Arc<dyn TransportFactory>,
    registry: Arc<StreamRegistry>,
    presentation: Option<Arc<dyn PresentationContext>>,
    commands: mpsc::UnboundedSender<Command>,
    state_tx: watch::Sender<ConnectionState>,
    state: ConnectionState,
    last_error: Arc<Mutex<Option<String>>>,
    running: Arc<AtomicBool>,
    session: Option<Session>,
    generation: u64,
    orphan_candidates: VecDeque<IceCandidate>,
    /// Cleared when a session ends; set again once the peer announces itself,
    /// so trickle from the ended session never reaches the next one.
    accept_orphans: bool,
    subscriptions: Vec<SubscriptionId>,
}

impl ConnectionManager {
    /// Subscribe to signaling, announce this party and run the actor on the
    /// current tokio runtime.
    pub fn spawn(
        config: ConnectionConfig,
        signaling: Arc<dyn SignalingChannel>,
        transports: Arc<dyn TransportFactory>,
        registry: Arc<StreamRegistry>,
        presentation: Option<Arc<dyn PresentationContext>>,
    ) -> ConnectionHandle {
        let (commands, inbox) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let last_error = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let role = config.role;
        let subscriptions = [
            MessageKind::ConnectRequest,
            role.inbound_description_kind(),
            role.inbound_candidate_kind(),
        ]
        .into_iter()
        .map(|kind| {
            let commands = commands.clone();
            signaling.subscribe(
                kind,
                Arc::new(move |message: SignalingMessage| {
                    let _ = commands.send(Command::Signal(message));
                }),
            )
        })
        .collect();

        let manager = Self {
            config,
            signaling,
            transports,
            registry,
            presentation,
            commands: commands.clone(),
            state_tx,
            state: ConnectionState::Idle,
            last_error: Arc::clone(&last_error),
            running: Arc::clone(&running),
            session: None,
            generation: 0,
            orphan_candidates: VecDeque::new(),
            accept_orphans: true,
            subscriptions,
        };
        tokio::spawn(manager.run(inbox));

        ConnectionHandle {
            role,
            commands,
            state: state_rx,
            last_error,
            running,
        }
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Command>) {
        info!(role = %self.config.role, "connection manager started");
        self.announce();

        while let Some(command) = inbox.recv().await {
            match command {
                Command::Signal(message) => self.on_signal(message),
                Command::Transport { generation, event } => {
                    self.on_transport_event(generation, event)
                }
                Command::TransportReady {
                    generation,
                    transport,
                } => self.on_transport_ready(generation, transport),
                Command::RemoteApplied { generation } => self.on_remote_applied(generation),
                Command::LocalDescription {
                    generation,
                    description,
                } => self.on_local_description(generation, description),
                Command::NegotiationError { generation, error } => {
                    if self.current(generation).is_some() {
                        self.fail(error);
                    }
                }
                Command::CandidateRejected { generation, error } => {
                    if self.current(generation).is_some() {
                        warn!("remote candidate rejected by transport: {}", error);
                    }
                }
                Command::SessionInfo(reply) => {
                    let _ = reply.send(self.session.as_ref().map(Session::info));
                }
                Command::Shutdown(reply) => {
                    self.stop().await;
                    let _ = reply.send(());
                    break;
                }
            }
        }
    }

    fn announce(&self) {
        match self.signaling.send(MessageKind::ConnectRequest, None) {
            Ok(()) => debug!(role = %self.config.role, "sent connect-request"),
            Err(Error::SignalingUnavailable) => {
                debug!("no peer on the signaling channel yet; connect-request dropped")
            }
            Err(e) => warn!("failed to send connect-request: {}", e),
        }
    }

    fn send(&self, kind: MessageKind, payload: String) {
        match self.signaling.send(kind, Some(payload)) {
            Ok(()) => debug!(%kind, "sent signaling message"),
            Err(Error::SignalingUnavailable) => {
                debug!(%kind, "no peer on the signaling channel; message dropped")
            }
            Err(e) => warn!(%kind, "failed to send signaling message: {}", e),
        }
    }

    /// The live session, if `generation` still names it.
    fn current(&mut self, generation: u64) -> Option<&mut Session> {
        self.session
            .as_mut()
            .filter(|s| s.generation == generation && s.is_live())
    }

    fn transition(&mut self, next: ConnectionState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "ignoring invalid connection state transition");
            return false;
        }
        info!(role = %self.config.role, from = %self.state, to = %next, "connection state changed");
        self.state = next;
        if let Some(session) = self.session.as_mut() {
            session.state = next;
        }
        self.state_tx.send_replace(next);
        true
    }

    fn record_error(&self, error: &Error) {
        *lock(&self.last_error) = Some(error.to_string());
    }

    fn on_signal(&mut self, message: SignalingMessage) {
        let role = self.config.role;
        match message.kind {
            MessageKind::ConnectRequest => self.on_connect_request(),
            kind if kind == role.inbound_description_kind() => self.on_description(message),
            kind if kind == role.inbound_candidate_kind() => self.on_remote_candidate(message),
            kind => debug!(%kind, "ignoring signaling message"),
        }
    }

    fn on_connect_request(&mut self) {
        self.accept_orphans = true;
        let negotiating = self
            .session
            .as_ref()
            .filter(|s| s.state == ConnectionState::Negotiating);
        match self.config.role {
            Role::Offerer => {
                // The answerer echoes our own announcement; an offer is already
                // on its way to it.
                if negotiating.is_some_and(|s| !s.remote_description_requested) {
                    debug!("peer announced again while awaiting an answer; ignored");
                    return;
                }
                info!("peer announced itself; starting negotiation");
                self.begin_session(None);
            }
            Role::Answerer => {
                if negotiating.is_some() {
                    debug!("peer announced itself mid-negotiation; not echoing");
                    return;
                }
                debug!("peer announced itself; requesting an offer");
                self.announce();
            }
        }
    }

    fn on_description(&mut self, message: SignalingMessage) {
        let expected = match self.config.role {
            Role::Answerer => SdpKind::Offer,
            Role::Offerer => SdpKind::Answer,
        };
        let description = match message
            .require_payload()
            .and_then(|payload| SessionDescription::parse(payload, expected))
        {
            Ok(description) => description,
            Err(e) => {
                warn!(kind = %message.kind, "dropping signaling message: {}", e);
                return;
            }
        };

        match self.config.role {
            Role::Answerer => {
                info!("received offer");
                self.begin_session(Some(description));
            }
            Role::Offerer => self.apply_answer(description),
        }
    }

    fn on_remote_candidate(&mut self, message: SignalingMessage) {
        let candidate = match message.require_payload().and_then(IceCandidate::parse) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(kind = %message.kind, "dropping signaling message: {}", e);
                return;
            }
        };

        match self.session.as_mut() {
            Some(session) => session.receive_remote_candidate(candidate),
            None if !self.accept_orphans => {
                debug!("dropping candidate from an ended session");
            }
            None => {
                if self.orphan_candidates.len() >= MAX_ORPHAN_CANDIDATES {
                    self.orphan_candidates.pop_front();
                }
                debug!("holding remote candidate until a session starts");
                self.orphan_candidates.push_back(candidate);
            }
        }
    }

    /// Replace any existing session with a fresh one. The answerer passes the
    /// received offer; the offerer passes `None` and produces an offer.
    fn begin_session(&mut self, offer: Option<SessionDescription>) {
        if self.session.is_some() {
            info!("replacing existing session");
            if let Some(transport) = self.end_session(ConnectionState::Closed) {
                close_in_background(transport);
            }
        }

        self.generation += 1;
        let generation = self.generation;
        let mut session = Session::new(generation, self.config.role);
        for candidate in self.orphan_candidates.drain(..) {
            session.receive_remote_candidate(candidate);
        }
        let session_id = session.id;
        self.session = Some(session);
        self.transition(ConnectionState::Negotiating);
        info!(session = %session_id, generation, "negotiation started");

        if let Err(error) = self.check_presentation() {
            self.fail(error);
            return;
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let forward = tokio::spawn(forward_events(
            generation,
            events_rx,
            Arc::clone(&session.live),
            Arc::clone(&self.running),
            self.commands.clone(),
        ));
        let negotiate = tokio::spawn(negotiate(
            generation,
            Arc::clone(&self.transports),
            events_tx,
            offer,
            self.commands.clone(),
        ));
        session.tasks.push(forward);
        session.tasks.push(negotiate);
    }

    fn check_presentation(&self) -> Result<()> {
        if !self.config.require_presentation {
            return Ok(());
        }
        let context = self
            .presentation
            .as_deref()
            .ok_or(Error::NoPresentationContext)?;
        require_presentation(context).map(|_| ())
    }

    fn apply_answer(&mut self, answer: SessionDescription) {
        let commands = self.commands.clone();
        let Some(session) = self.session.as_mut() else {
            debug!("answer without a session; dropped");
            return;
        };
        if !session.local_description_sent || session.remote_description_requested {
            warn!(session = %session.id, "unexpected answer; dropped");
            return;
        }
        let Some(transport) = session.transport.clone() else {
            warn!(session = %session.id, "answer before transport was ready; dropped");
            return;
        };

        info!(session = %session.id, "received answer");
        session.remote_description_requested = true;
        let generation = session.generation;
        session.tasks.push(tokio::spawn(async move {
            let command = match transport.set_remote_description(answer).await {
                Ok(()) => Command::RemoteApplied { generation },
                Err(error) => Command::NegotiationError { generation, error },
            };
            let _ = commands.send(command);
        }));
    }

    fn on_transport_ready(&mut self, generation: u64, transport: Arc<dyn PeerTransport>) {
        let commands = self.commands.clone();
        let Some(session) = self.current(generation) else {
            debug!(generation, "transport for a discarded session; closing");
            close_in_background(transport);
            return;
        };

        let (candidate_tx, mut candidate_rx) = mpsc::unbounded_channel::<IceCandidate>();
        let applier = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                while let Some(candidate) = candidate_rx.recv().await {
                    if let Err(error) = transport.add_remote_candidate(candidate).await {
                        let _ = commands.send(Command::CandidateRejected { generation, error });
                    }
                }
            })
        };
        session.candidate_tx = Some(candidate_tx);
        session.transport = Some(transport);
        session.tasks.push(applier);
        debug!(session = %session.id, "transport ready");
    }

    fn on_remote_applied(&mut self, generation: u64) {
        if let Some(session) = self.current(generation) {
            session.remote_description_requested = true;
            let released = session.remote_description_applied();
            debug!(session = %session.id, released, "remote description applied");
        }
    }

    fn on_local_description(&mut self, generation: u64, description: SessionDescription) {
        let Some(session) = self.current(generation) else {
            return;
        };
        session.local_description_sent = true;
        let kind = match description.kind {
            SdpKind::Offer => MessageKind::Offer,
            SdpKind::Answer => MessageKind::Answer,
        };
        match description.to_payload() {
            Ok(payload) => self.send(kind, payload),
            Err(e) => self.fail(e),
        }
    }

    fn on_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let outbound = self.config.role.outbound_candidate_kind();
        let Some(session) = self.current(generation) else {
            return;
        };

        match event {
            TransportEvent::LocalCandidate(candidate) => {
                let payload = candidate.to_payload();
                session.local_candidates.push(candidate);
                match payload {
                    Ok(payload) => self.send(outbound, payload),
                    Err(e) => warn!("failed to encode local candidate: {}", e),
                }
            }
            TransportEvent::Track(track) => {
                if session.stream.is_some() {
                    debug!(session = %session.id, track = %track.id(), "additional remote track");
                    return;
                }
                let stream = MediaStream::with_track(track);
                session.stream = Some(stream.clone());
                info!(session = %session.id, stream = %stream.id(), "remote stream available");
                self.registry.publish(Some(stream));
                self.transition(ConnectionState::Connected);
            }
            TransportEvent::Connectivity(connectivity) => {
                debug!(session = %session.id, %connectivity, "connectivity changed");
                if !connectivity.is_terminal() {
                    return;
                }
                let next = match connectivity {
                    Connectivity::Closed => ConnectionState::Closed,
                    _ => ConnectionState::Failed,
                };
                if next == ConnectionState::Failed {
                    let error = Error::negotiation(format!("connectivity {connectivity}"));
                    warn!("transport lost connectivity: {}", error);
                    self.record_error(&error);
                }
                if let Some(transport) = self.end_session(next) {
                    close_in_background(transport);
                }
            }
        }
    }

    fn fail(&mut self, error: Error) {
        warn!(role = %self.config.role, "negotiation failed: {}", error);
        self.record_error(&error);
        if let Some(transport) = self.end_session(ConnectionState::Failed) {
            close_in_background(transport);
        }
    }

    /// Tear down the session: stop emitting, withdraw its stream and hand
    /// back the transport for closing.
    /// The stream is withdrawn before the state change is observable.
    fn end_session(&mut self, next: ConnectionState) -> Option<Arc<dyn PeerTransport>> {
        let mut session = self.session.take()?;
        self.orphan_candidates.clear();
        self.accept_orphans = false;
        let published = session.stream.is_some();
        let transport = session.dismantle();
        if published {
            self.registry.publish(None);
            info!(session = %session.id, "remote stream withdrawn");
        }
        self.transition(next);
        transport
    }

    async fn stop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.signaling.unsubscribe(id);
        }
        if let Some(transport) = self.end_session(ConnectionState::Closed) {
            if let Err(e) = transport.close().await {
                debug!("transport close failed: {}", e);
            }
        }
        info!(role = %self.config.role, "connection manager stopped");
    }
}

fn close_in_background(transport: Arc<dyn PeerTransport>) {
    tokio::spawn(async move {
        if let Err(e) = transport.close().await {
            debug!("transport close failed: {}", e);
        }
    });
}

async fn forward_events(
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    live: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    commands: mpsc::UnboundedSender<Command>,
) {
    while let Some(event) = events.recv().await {
        if !live.load(Ordering::SeqCst) || !running.load(Ordering::SeqCst) {
            break;
        }
        if commands.send(Command::Transport { generation, event }).is_err() {
            break;
        }
    }
}

async fn negotiate(
    generation: u64,
    transports: Arc<dyn TransportFactory>,
    events: mpsc::UnboundedSender<TransportEvent>,
    offer: Option<SessionDescription>,
    commands: mpsc::UnboundedSender<Command>,
) {
    let transport = match transports.create(events).await {
        Ok(transport) => transport,
        Err(error) => {
            let _ = commands.send(Command::NegotiationError { generation, error });
            return;
        }
    };
    let _ = commands.send(Command::TransportReady {
        generation,
        transport: Arc::clone(&transport),
    });

    let local = match offer {
        Some(offer) => match transport.set_remote_description(offer).await {
            Ok(()) => {
                let _ = commands.send(Command::RemoteApplied { generation });
                transport.create_answer().await
            }
            Err(error) => Err(error),
        },
        None => transport.create_offer().await,
    };

    let command = match local {
        Ok(description) => Command::LocalDescription {
            generation,
            description,
        },
        Err(error) => Command::NegotiationError { generation, error },
    };
    let _ = commands.send(command);
}
