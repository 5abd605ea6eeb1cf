#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use remote_display_common::{
    Error, IceCandidate, MessageKind, Result, SdpKind, SessionDescription, SignalingMessage,
};
use remote_display_core::connection::{
    PeerTransport, TransportEvent, TransportEvents, TransportFactory,
};
use remote_display_core::registry::{MediaStream, RemoteTrack, TrackKind};
use remote_display_core::surface::{
    LayerInit, MediaLayer, PresentationContext, PresentationSessionId, ReferenceSpaceId,
    RigidTransform, VideoEvent, VideoEventHandler, VideoSource, VideoTexture,
};
use remote_display_core::signaling::{SignalHandler, SignalingChannel};
use remote_display_core::{ConnectionHandle, ConnectionState, SubscriptionId, SubscriptionIds};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

pub async fn eventually_async<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Receive `T` or fail the test after five seconds.
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

/// Collect every message of `kind` arriving on `channel`.
pub fn listen(
    channel: &dyn SignalingChannel,
    kind: MessageKind,
) -> mpsc::UnboundedReceiver<SignalingMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    channel.subscribe(
        kind,
        Arc::new(move |message: SignalingMessage| {
            let _ = tx.send(message);
        }),
    );
    rx
}

pub async fn wait_state(handle: &ConnectionHandle, state: ConnectionState) {
    let mut rx = handle.watch_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {state}"))
        .expect("connection manager alive");
}

pub fn candidate(n: usize) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000 typ host"),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

pub struct FakeTrack {
    pub id: String,
    pub kind: TrackKind,
}

impl RemoteTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }
}

pub fn video_track(id: &str) -> Arc<dyn RemoteTrack> {
    Arc::new(FakeTrack {
        id: id.to_string(),
        kind: TrackKind::Video,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateOffer,
    CreateAnswer,
    SetRemote(SdpKind),
    AddCandidate(String),
    Close,
}

static TRANSPORT_LABELS: AtomicUsize = AtomicUsize::new(1);

/// Transport that records calls and lets the test raise events.
///
/// Offers name the transport that made them; answers quote the offer they
/// answer, so a test can match each answer to its offer.
pub struct ScriptedTransport {
    pub label: usize,
    events: TransportEvents,
    calls: Mutex<Vec<Call>>,
    remote: Mutex<Vec<SessionDescription>>,
}

impl ScriptedTransport {
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Every description applied with `set_remote_description`, in order.
    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }

    pub fn offer_line(&self) -> String {
        format!("s=scripted-offer-{}", self.label)
    }

    pub fn is_closed(&self) -> bool {
        self.calls().contains(&Call::Close)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PeerTransport for ScriptedTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record(Call::CreateOffer);
        Ok(SessionDescription::offer(format!(
            "v=0\r\n{}\r\n",
            self.offer_line()
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record(Call::CreateAnswer);
        let answering = self
            .remote
            .lock()
            .unwrap()
            .last()
            .and_then(|offer| offer.sdp.lines().find(|l| l.starts_with("s=")).map(str::to_owned))
            .unwrap_or_default();
        Ok(SessionDescription::answer(format!(
            "v=0\r\ns=scripted-answer\r\na=answering:{answering}\r\n"
        )))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.record(Call::SetRemote(description.kind));
        self.remote.lock().unwrap().push(description);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(Call::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(Call::Close);
        Ok(())
    }
}

/// Hands every created transport to the test through a channel.
pub struct ScriptedFactory {
    created: mpsc::UnboundedSender<Arc<ScriptedTransport>>,
    pub fail: AtomicBool,
}

impl ScriptedFactory {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<ScriptedTransport>>) {
        let (created, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                created,
                fail: AtomicBool::new(false),
            }),
            rx,
        )
    }
}

#[async_trait]
impl TransportFactory for ScriptedFactory {
    async fn create(&self, events: TransportEvents) -> Result<Arc<dyn PeerTransport>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::transport("scripted failure"));
        }
        let transport = Arc::new(ScriptedTransport {
            label: TRANSPORT_LABELS.fetch_add(1, Ordering::SeqCst),
            events,
            calls: Mutex::new(Vec::new()),
            remote: Mutex::new(Vec::new()),
        });
        let _ = self.created.send(Arc::clone(&transport));
        Ok(transport)
    }
}

pub async fn next_transport(
    created: &mut mpsc::UnboundedReceiver<Arc<ScriptedTransport>>,
) -> Arc<ScriptedTransport> {
    tokio::time::timeout(Duration::from_secs(5), created.recv())
        .await
        .expect("transport created")
        .expect("factory alive")
}

/// Signaling channel whose inbound messages each arrive `delay` after the
/// underlying channel received them, still in receipt order.
pub struct DelayedChannel<C> {
    inner: C,
    delay: Duration,
}

impl<C: SignalingChannel> DelayedChannel<C> {
    pub fn new(inner: C, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl<C: SignalingChannel> SignalingChannel for DelayedChannel<C> {
    fn send(&self, kind: MessageKind, payload: Option<String>) -> Result<()> {
        self.inner.send(kind, payload)
    }

    fn subscribe(&self, kind: MessageKind, handler: SignalHandler) -> SubscriptionId {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Instant, SignalingMessage)>();
        let delay = self.delay;
        tokio::spawn(async move {
            while let Some((arrived, message)) = rx.recv().await {
                tokio::time::sleep_until(arrived + delay).await;
                handler(message);
            }
        });
        self.inner.subscribe(
            kind,
            Arc::new(move |message: SignalingMessage| {
                let _ = tx.send((Instant::now(), message));
            }),
        )
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }
}

/// Shared acquire/release ledger for surface resources.
#[derive(Default)]
pub struct ResourceLedger {
    pub events: Mutex<Vec<String>>,
    outstanding: AtomicI32,
    pub overlaps: AtomicI32,
}

impl ResourceLedger {
    fn acquire(&self, what: &str) {
        if self.outstanding.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.events.lock().unwrap().push(format!("{what}-acquire"));
    }

    fn release(&self, what: &str) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(format!("{what}-release"));
    }

    pub fn outstanding(&self) -> i32 {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == event)
            .count()
    }
}

struct MockLayer {
    ledger: Arc<ResourceLedger>,
    angle: f32,
    radius: f32,
    transform: RigidTransform,
}

impl MediaLayer for MockLayer {
    fn central_angle(&self) -> f32 {
        self.angle
    }
    fn set_central_angle(&mut self, angle: f32) {
        self.angle = angle;
    }
    fn radius(&self) -> f32 {
        self.radius
    }
    fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
    }
    fn transform(&self) -> RigidTransform {
        self.transform
    }
    fn set_transform(&mut self, transform: RigidTransform) {
        self.transform = transform;
    }
    fn release(&mut self) {
        self.ledger.release("layer");
    }
}

struct MockTexture {
    ledger: Arc<ResourceLedger>,
}

impl VideoTexture for MockTexture {
    fn release(&mut self) {
        self.ledger.release("texture");
    }
}

pub struct MockPresentation {
    pub ledger: Arc<ResourceLedger>,
    pub session: Mutex<Option<PresentationSessionId>>,
    pub space: Mutex<Option<ReferenceSpaceId>>,
    pub layers: AtomicBool,
}

impl MockPresentation {
    pub fn new(layers: bool) -> Arc<Self> {
        Arc::new(Self {
            ledger: Arc::new(ResourceLedger::default()),
            session: Mutex::new(Some(PresentationSessionId(7))),
            space: Mutex::new(Some(ReferenceSpaceId(3))),
            layers: AtomicBool::new(layers),
        })
    }

    pub fn set_session(&self, active: bool) {
        *self.session.lock().unwrap() = active.then_some(PresentationSessionId(7));
    }
}

impl PresentationContext for MockPresentation {
    fn active_session(&self) -> Option<PresentationSessionId> {
        *self.session.lock().unwrap()
    }

    fn reference_space(&self) -> Option<ReferenceSpaceId> {
        *self.space.lock().unwrap()
    }

    fn supports_media_layers(&self) -> bool {
        self.layers.load(Ordering::SeqCst)
    }

    fn create_media_layer(&self, init: &LayerInit) -> Result<Box<dyn MediaLayer>> {
        self.ledger.acquire("layer");
        Ok(Box::new(MockLayer {
            ledger: Arc::clone(&self.ledger),
            angle: init.central_angle,
            radius: init.radius,
            transform: init.transform,
        }))
    }

    fn create_video_texture(&self) -> Result<Box<dyn VideoTexture>> {
        self.ledger.acquire("texture");
        Ok(Box::new(MockTexture {
            ledger: Arc::clone(&self.ledger),
        }))
    }
}

#[derive(Default)]
pub struct MockVideo {
    ready: AtomicBool,
    dimensions: Mutex<Option<(u32, u32)>>,
    handlers: Mutex<Vec<(SubscriptionId, VideoEventHandler)>>,
    pub attached: Mutex<Vec<Option<MediaStream>>>,
    ids: SubscriptionIds,
}

impl MockVideo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver frames of the given size and raise `DataAvailable`.
    pub fn frames(&self, width: u32, height: u32) {
        *self.dimensions.lock().unwrap() = Some((width, height));
        self.emit(VideoEvent::DataAvailable, true);
    }

    pub fn emit(&self, event: VideoEvent, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
        let handlers: Vec<VideoEventHandler> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }
}

impl VideoSource for MockVideo {
    fn dimensions(&self) -> Option<(u32, u32)> {
        *self.dimensions.lock().unwrap()
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn subscribe(&self, handler: VideoEventHandler) -> SubscriptionId {
        let id = self.ids.next();
        self.handlers.lock().unwrap().push((id, handler));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap();
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != before
    }

    fn attach_stream(&self, stream: Option<MediaStream>) {
        if stream.is_none() {
            self.ready.store(false, Ordering::SeqCst);
            *self.dimensions.lock().unwrap() = None;
        }
        self.attached.lock().unwrap().push(stream);
    }
}
