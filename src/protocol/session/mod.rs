mod handshake;
mod state;

pub use state::{SessionConfig, SessionEvent, SessionLifecycleState};

use super::{
    codec::Codec,
    error::{Error, Result},
    frame::{
        encap::{command, EipFrame},
        identity::{parse_list_identity, Identity},
        CommonPacket, WireDecode, WireEncode,
    },
};
use arc_swap::ArcSwapOption;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{pin_mut, Stream};
use futures_util::{stream::SplitStream, SinkExt, StreamExt};
use std::{
    collections::{BTreeMap, HashMap},
    result::Result as StdResult,
    sync::{
        atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::{
    net::TcpStream,
    select,
    sync::{broadcast, mpsc, oneshot, watch, OwnedSemaphorePermit, Semaphore},
    time::sleep,
};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, info, warn};

/// Request message for the session
#[derive(Debug)]
struct SessionRequest {
    /// Encapsulation command code
    command: u16,
    /// Command-specific data
    payload: Bytes,
    /// Sender context pre-assigned by the API layer; echoed by the device
    context: u64,
    /// Whether the command elicits a reply (NOP does not)
    expects_reply: bool,
    /// Operation timeout
    timeout: Duration,
    /// Response channel
    response_tx: oneshot::Sender<Result<EipFrame>>,
    /// Concurrency permit carried across the lifetime of this request
    permit: OwnedSemaphorePermit,
}

/// Entry stored for each inflight request.
///
/// Holding an instance of this struct implies one concurrency slot acquired
/// from the session-level `Semaphore`; the slot is released by RAII when the
/// entry is dropped (response, timeout, IO error, or teardown).
#[derive(Debug)]
struct InflightEntry {
    tx: oneshot::Sender<Result<EipFrame>>,
    _permit: OwnedSemaphorePermit,
}

/// EIP session runtime state and IO.
///
/// The session owns the TCP endpoint, the 32-bit session handle issued by
/// RegisterSession, and the sender-context counter used to correlate replies
/// with in-flight requests.
#[derive(Debug)]
pub struct Session {
    /// Session configuration
    config: Arc<SessionConfig>,
    /// Request channel for incoming requests
    request_tx: Arc<ArcSwapOption<mpsc::Sender<SessionRequest>>>,
    /// Cancellation token for cooperative shutdown
    cancel: CancellationToken,
    /// Events broadcaster
    events_tx: broadcast::Sender<SessionEvent>,
    /// Lifecycle watch channel (tx side)
    lifecycle_tx: watch::Sender<SessionLifecycleState>,
    /// Lifecycle watch channel (rx side)
    lifecycle_rx: watch::Receiver<SessionLifecycleState>,
    /// Semaphore gating concurrent requests (set after handshake)
    request_semaphore: Arc<ArcSwapOption<Semaphore>>,
    /// Session handle assigned by RegisterSession (0 when unregistered)
    session_handle: Arc<AtomicU32>,
    /// Metrics: current inflight requests gauge
    inflight_gauge: Arc<AtomicUsize>,
    /// Metrics: total request timeouts observed
    timeouts_total: Arc<AtomicU64>,
    /// Monotonic sender-context generator
    context_counter: AtomicU64,
}

/// Session event loop facade providing a stream of `SessionEvent` and helpers
#[derive(Debug)]
pub struct SessionEventLoop {
    session: Arc<Session>,
    inner_cancel: CancellationToken,
    config: Arc<SessionConfig>,
    pre_connected: Option<TcpStream>,
}

impl SessionEventLoop {
    /// Enter and get a stream of session events
    pub fn enter(self) -> impl Stream<Item = SessionEvent> {
        let session = Arc::clone(&self.session);
        let events_rx = session.subscribe_events();

        // spawn IO driver
        let cancel = self.inner_cancel.child_token();
        let config = Arc::clone(&self.config);
        let pre = self.pre_connected;
        tokio::spawn(async move {
            if let Some(stream) = pre {
                run_connection_with_stream(session, stream, config, cancel).await;
            } else {
                run_connection(session, config, cancel).await;
            }
        });

        futures::stream::unfold(events_rx, |mut rx| async move {
            match rx.recv().await {
                Ok(ev) => Some((ev, rx)),
                Err(_) => None,
            }
        })
    }

    /// Drain the event stream (utility)
    pub async fn run(self) {
        let s = self.enter();
        pin_mut!(s);
        while let Some(_ev) = s.next().await {}
    }

    /// Spawn a background task to drain the event stream
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Cancel the connection
    pub fn cancel(&self) {
        self.inner_cancel.cancel();
    }
}

impl Session {
    fn new(config: Arc<SessionConfig>, cancel: CancellationToken) -> Arc<Self> {
        let request_tx: Arc<ArcSwapOption<mpsc::Sender<SessionRequest>>> =
            Arc::new(ArcSwapOption::from(None));
        let (events_tx, _rx_unused) = broadcast::channel::<SessionEvent>(64);
        let (lifecycle_tx, lifecycle_rx) = watch::channel(SessionLifecycleState::Idle);

        Arc::new(Session {
            config,
            request_tx,
            cancel: cancel.clone(),
            events_tx,
            lifecycle_tx,
            lifecycle_rx,
            request_semaphore: Arc::new(ArcSwapOption::from(None)),
            session_handle: Arc::new(AtomicU32::new(0)),
            inflight_gauge: Arc::new(AtomicUsize::new(0)),
            timeouts_total: Arc::new(AtomicU64::new(0)),
            context_counter: AtomicU64::new(0),
        })
    }

    /// Subscribe to session events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Get a lifecycle watch receiver clone.
    pub fn lifecycle(&self) -> watch::Receiver<SessionLifecycleState> {
        self.lifecycle_rx.clone()
    }

    /// Get current lifecycle state.
    #[inline]
    pub fn current_lifecycle(&self) -> SessionLifecycleState {
        *self.lifecycle_rx.borrow()
    }

    /// Whether lifecycle is currently Active (fast path, no await).
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.current_lifecycle(), SessionLifecycleState::Active)
    }

    /// Session handle assigned by the device, 0 when unregistered.
    #[inline]
    pub fn handle(&self) -> u32 {
        self.session_handle.load(Ordering::Acquire)
    }

    /// Graceful shutdown
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(sem) = self.request_semaphore.load_full() {
            sem.close();
        }
    }

    /// Wait until the session becomes Active. Returns false if the lifecycle
    /// reaches Closed/Failed first.
    pub async fn wait_for_active(&self) -> bool {
        if self.is_active() {
            return true;
        }
        let mut rx = self.lifecycle();
        rx.wait_for(|s| {
            matches!(
                *s,
                SessionLifecycleState::Active
                    | SessionLifecycleState::Closed
                    | SessionLifecycleState::Failed
            )
        })
        .await
        .map(|s| matches!(*s, SessionLifecycleState::Active))
        .unwrap_or(false)
    }

    /// Generate the next sender context (wrapping, never zero).
    #[inline]
    fn next_context(&self) -> u64 {
        loop {
            let ctx = self.context_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if ctx != 0 {
                return ctx;
            }
        }
    }

    /// Send an encapsulation command and await its reply frame.
    ///
    /// This API will:
    /// - ensure lifecycle is Active
    /// - acquire the request semaphore (one-in-flight back pressure)
    /// - enqueue the request through `request_tx`
    /// - await the paired response correlated by sender context
    async fn send_command(
        &self,
        cmd: u16,
        payload: Bytes,
        expects_reply: bool,
    ) -> Result<EipFrame> {
        if !self.is_active() {
            return Err(Error::ErrNotActive);
        }

        let permit = if let Some(sem) = self.request_semaphore.load_full() {
            match sem.acquire_owned().await {
                Ok(p) => p,
                Err(_e) => return Err(Error::ErrUseClosedConnection),
            }
        } else {
            return Err(Error::ErrUseClosedConnection);
        };

        let (tx, rx) = oneshot::channel();
        let req = SessionRequest {
            command: cmd,
            payload,
            context: self.next_context(),
            expects_reply,
            timeout: self.config.request_timeout,
            response_tx: tx,
            permit,
        };

        if let Some(sender) = self.request_tx.load_full() {
            sender.send(req).await.map_err(|_| Error::ErrUseClosedConnection)?;
        } else {
            return Err(Error::ErrUseClosedConnection);
        }

        match rx.await {
            Ok(res) => res,
            Err(_) => Err(Error::ErrUseClosedConnection),
        }
    }

    /// Send a CIP request via SendRRData and return the CIP reply bytes
    /// (the data of the second CPF item).
    ///
    /// The body is `{interface_handle=0, timeout, CPF}`; the interface
    /// handle and timeout are echoed back ahead of the response CPF.
    pub async fn send_rr_data(&self, cip_request: Bytes) -> Result<Bytes> {
        let cpf = CommonPacket::unconnected(cip_request);
        let mut body = BytesMut::with_capacity(6 + cpf.encoded_len(&()));
        body.put_u32_le(0); // interface handle: CIP
        body.put_u16_le((self.config.request_timeout.as_secs()).min(u16::MAX as u64) as u16);
        cpf.encode_to(&mut body, &())?;

        let reply = self.send_command(command::SEND_RR_DATA, body.freeze(), true).await?;

        let mut payload = reply.payload.clone();
        if payload.len() < 6 {
            return Err(Error::InsufficientData { needed: 6, available: payload.len() });
        }
        payload.advance(6); // interface handle + timeout echo
        let (_rest, cpf) = CommonPacket::parse(&payload, &payload, &())?;
        Ok(cpf.cip_payload()?.clone())
    }

    /// Emit a NOP (0x0017) to hold the TCP path open through middleboxes.
    /// Fire-and-forget: the device never replies to NOP.
    pub async fn keepalive(&self) -> Result<()> {
        self.send_command(command::NOP, Bytes::new(), false).await.map(|_| ())
    }

    /// Query device identity via ListIdentity over the TCP session.
    pub async fn list_identity(&self) -> Result<Vec<Identity>> {
        let reply = self.send_command(command::LIST_IDENTITY, Bytes::new(), true).await?;
        let payload = reply.payload;
        let (_rest, cpf) = CommonPacket::parse(&payload, &payload, &())?;
        parse_list_identity(&cpf)
    }
}

/// Create a new EIP session and event loop.
pub fn create(config: SessionConfig) -> (Arc<Session>, SessionEventLoop) {
    let cancel = CancellationToken::new();
    let config = Arc::new(config);
    let session = Session::new(Arc::clone(&config), cancel.clone());
    let ev = SessionEventLoop {
        session: Arc::clone(&session),
        inner_cancel: cancel,
        config,
        pre_connected: None,
    };
    (session, ev)
}

/// Create a new EIP session and event loop over a pre-connected TcpStream.
pub fn create_with_stream(
    config: SessionConfig,
    stream: TcpStream,
) -> (Arc<Session>, SessionEventLoop) {
    let cancel = CancellationToken::new();
    let config = Arc::new(config);
    let session = Session::new(Arc::clone(&config), cancel.clone());
    let ev = SessionEventLoop {
        session: Arc::clone(&session),
        inner_cancel: cancel,
        config,
        pre_connected: Some(stream),
    };
    (session, ev)
}

/// Main connection driver: establish transport, then run the session.
async fn run_connection(
    session: Arc<Session>,
    config: Arc<SessionConfig>,
    cancel: CancellationToken,
) {
    publish_lifecycle(
        &session.events_tx,
        &session.lifecycle_tx,
        SessionLifecycleState::Connecting,
    );
    let stream = match tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect(config.socket_addr),
    )
    .await
    {
        Ok(Ok(s)) => s,
        _ => {
            publish_lifecycle(
                &session.events_tx,
                &session.lifecycle_tx,
                SessionLifecycleState::Failed,
            );
            return;
        }
    };
    let _ = stream.set_nodelay(config.tcp_nodelay);
    run_connection_with_stream(session, stream, config, cancel).await;
}

/// Main connection driver over a pre-connected TcpStream.
async fn run_connection_with_stream(
    session: Arc<Session>,
    stream: TcpStream,
    config: Arc<SessionConfig>,
    cancel: CancellationToken,
) {
    let (request_tx, mut request_rx) = mpsc::channel(config.send_queue_capacity);
    session.request_tx.store(Some(Arc::new(request_tx)));

    let events_tx = session.events_tx.clone();
    let lifecycle_tx = session.lifecycle_tx.clone();
    let inflight_gauge = Arc::clone(&session.inflight_gauge);
    let timeouts_total = Arc::clone(&session.timeouts_total);
    let session_handle = Arc::clone(&session.session_handle);

    publish_lifecycle(&events_tx, &lifecycle_tx, SessionLifecycleState::Handshaking);

    let mut framed = Framed::new(stream, Codec);
    let handle = match handshake::register_session(&mut framed, Arc::clone(&config)).await {
        Ok(h) => h,
        Err(e) => {
            warn!("RegisterSession failed: {e}");
            let _ = events_tx.send(SessionEvent::TransportError);
            publish_lifecycle(&events_tx, &lifecycle_tx, SessionLifecycleState::Failed);
            return;
        }
    };
    session_handle.store(handle, Ordering::Release);
    info!("EIP session registered: 0x{handle:08X}");

    session
        .request_semaphore
        .store(Some(Arc::new(Semaphore::new(config.max_concurrent_requests))));

    let (sink, stream) = framed.split();
    let mut sink_opt = Some(sink);
    let mut stream_opt = Some(stream);
    let mut inflight: HashMap<u64, InflightEntry> = HashMap::with_capacity(8);
    let mut timeouts = BTreeMap::<Instant, Vec<u64>>::new();
    // Reusable sleep future to avoid per-iteration allocation and jitter
    let mut deadline_sleep = Box::pin(sleep(Duration::from_millis(3_600_000)));

    publish_lifecycle(&events_tx, &lifecycle_tx, SessionLifecycleState::Active);

    loop {
        // Reset reusable sleep to the nearest deadline (or a far future)
        if let Some(dl) = timeouts.keys().next().cloned() {
            deadline_sleep.as_mut().reset(tokio::time::Instant::from_std(dl));
        } else {
            let far = tokio::time::Instant::now() + Duration::from_millis(3_600_000);
            deadline_sleep.as_mut().reset(far);
        }
        select! {
            _ = cancel.cancelled() => {
                publish_lifecycle(&events_tx, &lifecycle_tx, SessionLifecycleState::Closing);
                // Best-effort UnRegisterSession; the device closes the TCP side
                if let Some(s) = sink_opt.as_mut() {
                    let unreg = EipFrame::new(
                        command::UNREGISTER_SESSION,
                        session_handle.load(Ordering::Acquire),
                        0,
                        Bytes::new(),
                    );
                    let _ = tokio::time::timeout(Duration::from_millis(500), s.send(unreg)).await;
                }
                break;
            }
            req = request_rx.recv() => {
                match req {
                    Some(request) => {
                        let handle = session_handle.load(Ordering::Acquire);
                        let (ctx, frame) = register_inflight_request(
                            request,
                            handle,
                            &mut inflight,
                            &inflight_gauge,
                            &mut timeouts,
                        );
                        if let Some(s) = sink_opt.as_mut() {
                            if let Err(_e) = s.send(frame).await {
                                handle_send_failure(ctx, &mut inflight, &inflight_gauge);
                            }
                        }
                    }
                    None => break,
                }
            }
            frame_res = poll_next_frame(&mut stream_opt) => {
                match frame_res {
                    Some(Ok(frame)) => {
                        handle_incoming_frame(
                            frame,
                            &mut inflight,
                            &inflight_gauge,
                            &events_tx,
                        );
                    }
                    Some(Err(_e)) => {
                        let _ = events_tx.send(SessionEvent::TransportError);
                    }
                    None => {
                        let _ = events_tx.send(SessionEvent::TransportError);
                        break;
                    }
                }
            }
            _ = &mut deadline_sleep => {
                handle_request_timeouts(
                    &mut timeouts,
                    &mut inflight,
                    &inflight_gauge,
                    &timeouts_total,
                );
            }
        }
    }

    // Transport is gone: fail whatever is still pending and clear the handle
    session_handle.store(0, Ordering::Release);
    for (_ctx, entry) in inflight.drain() {
        let _ = entry.tx.send(Err(Error::ErrUseClosedConnection));
        inflight_gauge.fetch_sub(1, Ordering::Relaxed);
    }
    publish_lifecycle(&events_tx, &lifecycle_tx, SessionLifecycleState::Closed);
}

/// Register a new incoming request as inflight and build its wire frame.
///
/// Fire-and-forget commands (NOP) are not tracked: the response channel is
/// completed immediately after the frame is handed to the sink.
#[inline]
fn register_inflight_request(
    request: SessionRequest,
    session_handle: u32,
    inflight: &mut HashMap<u64, InflightEntry>,
    inflight_gauge: &AtomicUsize,
    timeouts: &mut BTreeMap<Instant, Vec<u64>>,
) -> (u64, EipFrame) {
    let ctx = request.context;
    let frame = EipFrame::new(request.command, session_handle, ctx, request.payload);

    if !request.expects_reply {
        // Permit drops here, releasing the slot immediately
        let _ = request
            .response_tx
            .send(Ok(EipFrame::new(request.command, session_handle, ctx, Bytes::new())));
        return (ctx, frame);
    }

    if inflight
        .insert(ctx, InflightEntry { tx: request.response_tx, _permit: request.permit })
        .is_none()
    {
        inflight_gauge.fetch_add(1, Ordering::Relaxed);
    }

    let deadline = Instant::now() + request.timeout;
    timeouts.entry(deadline).or_default().push(ctx);

    (ctx, frame)
}

/// Complete an inflight request with an IO error after a sink failure.
#[inline]
fn handle_send_failure(
    ctx: u64,
    inflight: &mut HashMap<u64, InflightEntry>,
    inflight_gauge: &AtomicUsize,
) {
    if let Some(entry) = inflight.remove(&ctx) {
        let _ = entry.tx.send(Err(Error::ErrUseClosedConnection));
        inflight_gauge.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Route a received frame to its inflight request by sender context.
///
/// A non-zero encapsulation status completes the request with an error; a
/// frame matching no inflight entry is dropped with an event.
#[inline]
fn handle_incoming_frame(
    frame: EipFrame,
    inflight: &mut HashMap<u64, InflightEntry>,
    inflight_gauge: &AtomicUsize,
    events_tx: &broadcast::Sender<SessionEvent>,
) {
    let ctx = frame.header.sender_context;
    match inflight.remove(&ctx) {
        Some(entry) => {
            let result = if frame.header.status != 0 {
                Err(Error::EncapStatus(frame.header.status))
            } else {
                Ok(frame)
            };
            let _ = entry.tx.send(result);
            inflight_gauge.fetch_sub(1, Ordering::Relaxed);
        }
        None => {
            debug!(context = ctx, command = frame.header.command, "reply matched no inflight request");
            let _ = events_tx.send(SessionEvent::UnmatchedReply);
        }
    }
}

/// Scan the timeout wheel and fail any expired inflight requests.
#[inline]
fn handle_request_timeouts(
    timeouts: &mut BTreeMap<Instant, Vec<u64>>,
    inflight: &mut HashMap<u64, InflightEntry>,
    inflight_gauge: &AtomicUsize,
    timeouts_total: &AtomicU64,
) {
    let now = Instant::now();
    let expired: Vec<Instant> = timeouts.keys().take_while(|d| **d <= now).cloned().collect();

    for dl in expired {
        if let Some(keys) = timeouts.remove(&dl) {
            for key in keys {
                if let Some(entry) = inflight.remove(&key) {
                    let _ = entry.tx.send(Err(Error::ErrRequestTimeout));
                    inflight_gauge.fetch_sub(1, Ordering::Relaxed);
                    timeouts_total.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

#[inline]
fn publish_lifecycle(
    events_tx: &broadcast::Sender<SessionEvent>,
    lifecycle_tx: &watch::Sender<SessionLifecycleState>,
    state: SessionLifecycleState,
) {
    let _ = events_tx.send(SessionEvent::LifecycleChanged(state));
    let _ = lifecycle_tx.send(state);
}

#[inline]
async fn poll_next_frame(
    stream: &mut Option<SplitStream<Framed<TcpStream, Codec>>>,
) -> Option<StdResult<EipFrame, Error>> {
    if let Some(st) = stream.as_mut() {
        match st.next().await {
            Some(Ok(frame)) => Some(Ok(frame)),
            Some(Err(_e)) => Some(Err(Error::ErrUseClosedConnection)),
            None => None,
        }
    } else {
        None
    }
}
