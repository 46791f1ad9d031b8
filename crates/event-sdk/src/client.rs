//! Connection orchestrator: negotiation, socket lifecycle, heartbeat,
//! reconnect cycle and the read loop that feeds the dispatcher.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::stream::SplitStream;
use futures_util::{FutureExt, Sink, SinkExt, StreamExt};
use lk_domain::error::{Error, Result};
use lk_protocol::{headers, ClientTunables, EventResponse, Frame, FrameKind, MessageType};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::EventDispatcher;
use crate::envelope::event_type_of;
use crate::http::HttpRequester;
use crate::negotiate::negotiate;
use crate::reassembly::{Fragment, LogicalMessage, ReassemblyCache};
use crate::reconnect::{ReconnectPolicy, ReconnectState};
use crate::session::SessionParameters;
use crate::types::{ClientState, ConnectionConfig, ReconnectInfo};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the per-session outbound frame queue.
const OUTBOUND_QUEUE: usize = 64;

/// Client-side options that are not server-tunable.
#[derive(Debug, Clone)]
pub(crate) struct ClientOptions {
    pub auto_reconnect: bool,
    pub negotiate_timeout: Duration,
    pub locale: String,
    pub fragment_expiry: Duration,
}

/// A long-connection event client.
///
/// Create via [`EventClientBuilder`](crate::builder::EventClientBuilder).
/// Dropping the client stops it.
pub struct EventClient {
    inner: Arc<Inner>,
}

struct Session {
    id: u64,
    cancel: CancellationToken,
}

struct Inner {
    conn: ConnectionConfig,
    options: ClientOptions,
    http: Arc<dyn HttpRequester>,
    params: RwLock<SessionParameters>,
    reconnect: Mutex<ReconnectState>,
    cache: Mutex<ReassemblyCache>,
    dispatcher: RwLock<Option<Arc<EventDispatcher>>>,
    state: watch::Sender<ClientState>,
    /// Cancelled by `stop()`; replaced by `start()`.
    lifecycle: Mutex<CancellationToken>,
    session: Mutex<Option<Session>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    next_session_id: AtomicU64,
    attempts: AtomicU64,
}

impl EventClient {
    /// Start a new builder.
    pub fn builder() -> crate::builder::EventClientBuilder {
        crate::builder::EventClientBuilder::new()
    }

    pub(crate) fn new(
        conn: ConnectionConfig,
        options: ClientOptions,
        params: SessionParameters,
        http: Arc<dyn HttpRequester>,
    ) -> Self {
        let (state, _) = watch::channel(ClientState::Idle);
        let cache = ReassemblyCache::new(options.fragment_expiry);
        Self {
            inner: Arc::new(Inner {
                conn,
                options,
                http,
                params: RwLock::new(params),
                reconnect: Mutex::new(ReconnectState::default()),
                cache: Mutex::new(cache),
                dispatcher: RwLock::new(None),
                state,
                lifecycle: Mutex::new(CancellationToken::new()),
                session: Mutex::new(None),
                scheduler: Mutex::new(None),
                next_session_id: AtomicU64::new(0),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    /// Attach `dispatcher` and make the first connection attempt.
    ///
    /// Only valid from `Idle` or `Stopped`; otherwise a warning is logged and
    /// nothing happens.  When the first attempt fails, the reconnect cycle
    /// is armed in the background (if auto-reconnect is on) and
    /// [`Error::Startup`] is returned.  Later failures are never surfaced.
    pub async fn start(&self, dispatcher: EventDispatcher) -> Result<()> {
        let inner = &self.inner;
        let accepted = inner.state.send_if_modified(|s| {
            if matches!(*s, ClientState::Idle | ClientState::Stopped) {
                *s = ClientState::Negotiating;
                true
            } else {
                false
            }
        });
        if !accepted {
            tracing::warn!(state = ?self.state(), "start called on a running client, ignoring");
            return Ok(());
        }

        std::mem::replace(&mut *inner.lifecycle.lock(), CancellationToken::new()).cancel();
        *inner.dispatcher.write() = Some(Arc::new(dispatcher));
        tracing::info!(app_id = %inner.conn.app_id, domain = %inner.conn.domain.base_url(), "starting event client");

        match inner.connect_once().await {
            Ok(ws) => {
                inner.attach_session(ws);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "initial connection failed");
                inner.schedule_reconnect();
                Err(Error::Startup(e.to_string()))
            }
        }
    }

    /// Tear everything down.  Safe in any state; a second call is a no-op.
    pub fn stop(&self) {
        let inner = &self.inner;
        let token = inner.lifecycle.lock().clone();
        if token.is_cancelled() && self.state() == ClientState::Stopped {
            return;
        }
        token.cancel();
        if let Some(handle) = inner.scheduler.lock().take() {
            handle.abort();
        }
        inner.teardown_session();
        inner.cache.lock().clear();
        *inner.dispatcher.write() = None;
        {
            let mut rs = inner.reconnect.lock();
            rs.in_flight = false;
            rs.next_connect_ms = 0;
        }
        inner.set_state(ClientState::Stopped);
        tracing::info!(app_id = %inner.conn.app_id, "event client stopped");
    }

    pub fn state(&self) -> ClientState {
        *self.inner.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ClientState> {
        self.inner.state.subscribe()
    }

    pub fn reconnect_info(&self) -> ReconnectInfo {
        self.inner.reconnect.lock().info()
    }

    /// Connection attempts made since the client was built.
    pub fn connect_attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn session_parameters(&self) -> SessionParameters {
        self.inner.params.read().clone()
    }

    /// Latest `app_ticket` pushed for this client's app id.
    pub fn app_ticket(&self) -> Option<String> {
        crate::ticket::app_ticket(&self.inner.conn.app_id)
    }

    /// Logical messages still waiting for fragments.
    pub fn pending_fragments(&self) -> usize {
        self.inner.cache.lock().pending_len()
    }
}

impl Drop for EventClient {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn is_stopped(&self) -> bool {
        self.lifecycle.lock().is_cancelled()
    }

    /// Publish `next`.  Once stopped, only `Stopped` may be published.
    fn set_state(&self, next: ClientState) {
        if next != ClientState::Stopped && self.is_stopped() {
            return;
        }
        self.state.send_if_modified(|s| {
            if *s == next {
                false
            } else {
                tracing::debug!(from = ?*s, to = ?next, "client state changed");
                *s = next;
                true
            }
        });
    }

    fn mark_next_connect(&self, delay: Duration) {
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let at = Utc::now().timestamp_millis().saturating_add(delay_ms);
        self.reconnect.lock().next_connect_ms = at;
    }

    /// One negotiate + open attempt.
    async fn connect_once(&self) -> Result<WsStream> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.reconnect.lock().last_connect_ms = Utc::now().timestamp_millis();
        self.set_state(ClientState::Negotiating);

        let negotiated = negotiate(
            self.http.as_ref(),
            &self.conn,
            &self.options.locale,
            self.options.negotiate_timeout,
        )
        .await?;
        self.params.write().apply_negotiated(&negotiated);

        tracing::info!(
            attempt,
            device_id = negotiated.device_id.as_deref().unwrap_or_default(),
            service_id = negotiated.service_id,
            "opening event stream"
        );
        match tokio_tungstenite::connect_async(negotiated.url.as_str()).await {
            Ok((ws, _response)) => Ok(ws),
            Err(e) => {
                log_rejected_handshake(&e);
                Err(Error::Transport(e.to_string()))
            }
        }
    }

    /// Install a freshly opened socket and spawn its writer, heartbeat and
    /// read tasks.
    fn attach_session(self: &Arc<Self>, ws: WsStream) {
        let lifecycle = self.lifecycle.lock().clone();
        if lifecycle.is_cancelled() {
            tracing::debug!("client stopped while connecting, dropping socket");
            return;
        }

        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = lifecycle.child_token();
        {
            let mut slot = self.session.lock();
            if let Some(old) = slot.replace(Session {
                id,
                cancel: cancel.clone(),
            }) {
                old.cancel.cancel();
            }
        }

        let (sink, stream) = ws.split();
        let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(OUTBOUND_QUEUE);

        self.set_state(ClientState::Connected);
        tracing::info!(session_id = id, app_id = %self.conn.app_id, "event stream connected");

        tokio::spawn(self.clone().write_loop(id, sink, outbound_rx, cancel.clone()));
        tokio::spawn(self.clone().heartbeat_loop(outbound_tx.clone(), cancel.clone()));
        tokio::spawn(self.clone().read_loop(id, stream, outbound_tx, cancel));
    }

    /// Ping immediately, then every ping interval.  The interval is re-read
    /// each tick so a pong can retune it.
    async fn heartbeat_loop(self: Arc<Self>, tx: mpsc::Sender<Frame>, cancel: CancellationToken) {
        loop {
            let (service_id, interval) = {
                let p = self.params.read();
                (p.service_id, p.ping_interval)
            };
            if tx.send(Frame::ping(service_id)).await.is_err() {
                break;
            }
            tracing::trace!(service_id, "ping sent");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn read_loop(
        self: Arc<Self>,
        session_id: u64,
        mut stream: SplitStream<WsStream>,
        tx: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) {
        loop {
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                msg = stream.next() => msg,
            };
            match msg {
                Some(Ok(Message::Binary(bytes))) => self.handle_binary(&bytes, &tx).await,
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(session_id, close = ?frame, "server closed the event stream");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(session_id, error = %e, "event stream error");
                    break;
                }
                None => break,
            }
        }
        self.on_disconnect(session_id);
    }

    async fn handle_binary(&self, bytes: &[u8], tx: &mpsc::Sender<Frame>) {
        let frame = match Frame::decode(bytes) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, len = bytes.len(), "dropping undecodable frame");
                return;
            }
        };
        match frame.kind() {
            Some(FrameKind::Control) => self.handle_control(&frame),
            Some(FrameKind::Data) => self.handle_data(frame, tx).await,
            None => tracing::debug!(method = frame.method, "dropping frame with unknown method"),
        }
    }

    fn handle_control(&self, frame: &Frame) {
        match frame.message_type() {
            Some(MessageType::Pong) => {
                if frame.payload().is_empty() {
                    return;
                }
                match ClientTunables::from_json(frame.payload()) {
                    Ok(tunables) => {
                        self.params.write().apply_tunables(&tunables);
                        tracing::debug!(?tunables, "session parameters updated by pong");
                    }
                    Err(e) => tracing::warn!(error = %e, "unreadable pong payload"),
                }
            }
            // Only the client pings in this protocol.
            Some(MessageType::Ping) => tracing::trace!("ping from server ignored"),
            _ => tracing::debug!(
                msg_type = frame.header(headers::TYPE).unwrap_or_default(),
                "unhandled control frame"
            ),
        }
    }

    async fn handle_data(&self, frame: Frame, tx: &mpsc::Sender<Frame>) {
        if !matches!(frame.message_type(), Some(MessageType::Event | MessageType::Card)) {
            tracing::debug!(
                msg_type = frame.header(headers::TYPE).unwrap_or_default(),
                "ignoring data frame"
            );
            return;
        }
        let Some(fragment) = Fragment::from_frame(&frame) else {
            tracing::warn!("data frame without message_id, dropping");
            return;
        };
        let merged = {
            let mut cache = self.cache.lock();
            cache.merge(fragment)
        };
        let Some(message) = merged else {
            return;
        };

        let started = Instant::now();
        let response = self.dispatch(&message).await;
        let biz_rt = started.elapsed().as_millis() as u64;

        let reply = frame.reply(response.to_bytes(), biz_rt);
        if tx.send(reply).await.is_err() {
            tracing::debug!(message_id = %message.message_id, "socket closed before response was sent");
        }
    }

    /// Run the handler for one logical message and build the response body.
    async fn dispatch(&self, message: &LogicalMessage) -> EventResponse {
        let dispatcher = self.dispatcher.read().clone();
        let Some(dispatcher) = dispatcher else {
            tracing::warn!(message_id = %message.message_id, "no dispatcher attached");
            return EventResponse::internal_error();
        };

        let raw: serde_json::Value = match serde_json::from_slice(&message.payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(
                    message_id = %message.message_id,
                    trace_id = %message.trace_id,
                    error = %e,
                    "event payload is not JSON"
                );
                return EventResponse::internal_error();
            }
        };
        let event_type = event_type_of(&raw).unwrap_or_default().to_string();

        match AssertUnwindSafe(dispatcher.invoke(&raw)).catch_unwind().await {
            Ok(Ok(result)) => EventResponse::ok(result.as_ref()).unwrap_or_else(|e| {
                tracing::error!(event_type = %event_type, error = %e, "handler result not serializable");
                EventResponse::internal_error()
            }),
            Ok(Err(e)) => {
                tracing::error!(
                    event_type = %event_type,
                    message_id = %message.message_id,
                    trace_id = %message.trace_id,
                    error = %e,
                    "event handler failed"
                );
                EventResponse::internal_error()
            }
            Err(_panic) => {
                tracing::error!(
                    event_type = %event_type,
                    message_id = %message.message_id,
                    trace_id = %message.trace_id,
                    "event handler panicked"
                );
                EventResponse::internal_error()
            }
        }
    }

    /// Called when a session's reader or writer ends on its own.  Stale sessions
    /// (already replaced or torn down) are ignored.
    fn on_disconnect(self: &Arc<Self>, session_id: u64) {
        {
            let mut slot = self.session.lock();
            match slot.take() {
                Some(s) if s.id == session_id => s.cancel.cancel(),
                other => {
                    *slot = other;
                    return;
                }
            }
        }
        self.cache.lock().clear();
        if self.is_stopped() {
            return;
        }
        tracing::warn!(session_id, "event stream disconnected");
        self.schedule_reconnect();
    }

    fn teardown_session(&self) {
        if let Some(session) = self.session.lock().take() {
            session.cancel.cancel();
        }
    }

    /// Arm the reconnect cycle unless one is already running.
    fn schedule_reconnect(self: &Arc<Self>) {
        if self.is_stopped() {
            return;
        }
        if !self.options.auto_reconnect {
            tracing::info!("auto reconnect disabled, staying disconnected");
            self.teardown_session();
            self.cache.lock().clear();
            self.set_state(ClientState::Idle);
            return;
        }
        {
            let mut rs = self.reconnect.lock();
            if rs.in_flight {
                tracing::debug!("reconnect already in flight, ignoring request");
                return;
            }
            rs.in_flight = true;
        }

        self.set_state(ClientState::Reconnecting);
        self.teardown_session();
        self.cache.lock().clear();

        let policy = ReconnectPolicy::from_params(&self.params.read());
        let cancel = self.lifecycle.lock().clone();
        let mut slot = self.scheduler.lock();
        *slot = Some(tokio::spawn(self.clone().reconnect_cycle(policy, cancel)));
    }

    async fn reconnect_cycle(self: Arc<Self>, policy: ReconnectPolicy, cancel: CancellationToken) {
        let delay = policy.initial_delay();
        self.mark_next_connect(delay);
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            max_attempts = ?policy.max_attempts,
            "reconnect scheduled"
        );
        tokio::select! {
            _ = cancel.cancelled() => return self.abandon_cycle(),
            _ = tokio::time::sleep(delay) => {}
        }

        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            let result = tokio::select! {
                _ = cancel.cancelled() => return self.abandon_cycle(),
                r = self.connect_once() => r,
            };
            match result {
                Ok(ws) => {
                    tracing::info!(attempt, "reconnected");
                    self.finish_cycle();
                    self.attach_session(ws);
                    return;
                }
                Err(e) => tracing::warn!(attempt, error = %e, "reconnect attempt failed"),
            }

            if policy.should_give_up(attempt) {
                tracing::error!(attempts = attempt, "reconnect attempts exhausted, giving up");
                self.finish_cycle();
                self.set_state(ClientState::Idle);
                return;
            }

            self.set_state(ClientState::Reconnecting);
            self.mark_next_connect(policy.interval);
            tracing::info!(
                attempt,
                delay_ms = policy.interval.as_millis() as u64,
                "retrying connection"
            );
            tokio::select! {
                _ = cancel.cancelled() => return self.abandon_cycle(),
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    fn finish_cycle(&self) {
        let mut rs = self.reconnect.lock();
        rs.in_flight = false;
        rs.next_connect_ms = 0;
    }

    /// Exit of a cancelled cycle.  A `start()` that already replaced the
    /// lifecycle token owns the reconnect state, so it is left alone.
    fn abandon_cycle(&self) {
        if self.is_stopped() {
            self.finish_cycle();
        }
    }

    /// Single writer per session: frames from the heartbeat and the read
    /// loop are serialized through one channel.  A failed write ends the
    /// session the same way a reader error does.
    async fn write_loop<S>(
        self: Arc<Self>,
        session_id: u64,
        mut sink: S,
        mut rx: mpsc::Receiver<Frame>,
        cancel: CancellationToken,
    ) where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
                frame = rx.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = sink.send(Message::Binary(frame.encode())).await {
                            tracing::warn!(session_id, error = %e, "event stream write failed");
                            break;
                        }
                    }
                    None => return,
                },
            }
        }
        self.on_disconnect(session_id);
    }
}

/// A rejected upgrade carries the gateway's reason in response headers.
fn log_rejected_handshake(err: &tungstenite::Error) {
    let tungstenite::Error::Http(resp) = err else {
        return;
    };
    let header = |key: &str| {
        resp.headers()
            .get(key)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    tracing::error!(
        status = %resp.status(),
        handshake_status = %header(headers::HANDSHAKE_STATUS),
        handshake_msg = %header(headers::HANDSHAKE_MSG),
        auth_err_code = %header(headers::HANDSHAKE_AUTH_ERR_CODE),
        "event stream handshake rejected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use async_trait::async_trait;
    use lk_domain::config::Domain;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Negotiation always fails; counts calls.
    struct Unreachable {
        calls: AtomicU64,
    }

    #[async_trait]
    impl HttpRequester for Unreachable {
        async fn request(&self, _req: HttpRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Http("connection refused".into()))
        }
    }

    /// Negotiation succeeds but hands out a port nothing listens on.
    struct DeadGateway {
        calls: AtomicU64,
    }

    #[async_trait]
    impl HttpRequester for DeadGateway {
        async fn request(&self, _req: HttpRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(r#"{"code":0,"msg":"ok","data":{"URL":"ws://127.0.0.1:1/ws?device_id=d&service_id=1"}}"#.into())
        }
    }

    /// A socket whose every write fails.
    struct BrokenSink;

    impl Sink<Message> for BrokenSink {
        type Error = tungstenite::Error;

        fn poll_ready(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Err(tungstenite::Error::ConnectionClosed))
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> std::result::Result<(), Self::Error> {
            Err(tungstenite::Error::ConnectionClosed)
        }

        fn poll_flush(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    fn client(auto_reconnect: bool, reconnect_count: i64) -> (EventClient, Arc<Unreachable>) {
        let http = Arc::new(Unreachable {
            calls: AtomicU64::new(0),
        });
        let client = client_with(auto_reconnect, reconnect_count, http.clone());
        (client, http)
    }

    fn client_with(
        auto_reconnect: bool,
        reconnect_count: i64,
        http: Arc<dyn HttpRequester>,
    ) -> EventClient {
        let params = SessionParameters {
            reconnect_count,
            reconnect_interval: Duration::from_millis(10),
            reconnect_nonce: Duration::ZERO,
            ..Default::default()
        };
        EventClient::new(
            ConnectionConfig {
                app_id: "client-test-app".into(),
                app_secret: "secret".into(),
                domain: Domain::Custom("http://127.0.0.1:9".into()),
            },
            ClientOptions {
                auto_reconnect,
                negotiate_timeout: Duration::from_secs(1),
                locale: "zh".into(),
                fragment_expiry: Duration::from_secs(10),
            },
            params,
            http,
        )
    }

    async fn wait_for_state(client: &EventClient, want: ClientState) {
        let mut rx = client.subscribe_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == want))
            .await
            .expect("state not reached in time")
            .expect("state channel closed");
    }

    fn pending_fragment(id: &str) -> Fragment {
        Fragment {
            message_id: id.into(),
            sum: 2,
            seq: 0,
            trace_id: String::new(),
            payload: b"A".to_vec(),
        }
    }

    #[tokio::test]
    async fn bounded_retry_makes_initial_plus_count_attempts() {
        let (client, http) = client(true, 3);
        let err = client.start(EventDispatcher::new()).await.unwrap_err();
        assert!(matches!(err, Error::Startup(_)));

        wait_for_state(&client, ClientState::Idle).await;
        assert_eq!(client.connect_attempts(), 4);
        assert_eq!(http.calls.load(Ordering::SeqCst), 4);
        assert!(!client.reconnect_info().in_flight);

        // No further attempts once the cycle has given up.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.connect_attempts(), 4);
    }

    #[tokio::test]
    async fn second_reconnect_request_is_a_no_op() {
        let (client, _http) = client(true, 2);
        client.inner.schedule_reconnect();
        client.inner.schedule_reconnect();
        assert!(client.reconnect_info().in_flight);

        wait_for_state(&client, ClientState::Idle).await;
        // One sequence of two attempts, not two overlapping sequences.
        assert_eq!(client.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn disconnect_clears_pending_fragments() {
        let (client, _http) = client(false, -1);
        client.inner.cache.lock().merge(pending_fragment("m1"));
        *client.inner.session.lock() = Some(Session {
            id: 7,
            cancel: CancellationToken::new(),
        });
        assert_eq!(client.pending_fragments(), 1);

        client.inner.on_disconnect(7);
        assert_eq!(client.pending_fragments(), 0);
        assert!(client.inner.session.lock().is_none());
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[tokio::test]
    async fn stale_session_disconnect_is_ignored() {
        let (client, _http) = client(false, -1);
        client.inner.cache.lock().merge(pending_fragment("m2"));
        *client.inner.session.lock() = Some(Session {
            id: 8,
            cancel: CancellationToken::new(),
        });

        client.inner.on_disconnect(3);
        assert_eq!(client.pending_fragments(), 1);
        assert!(client.inner.session.lock().is_some());
    }

    #[tokio::test]
    async fn startup_failure_without_auto_reconnect_goes_idle() {
        let (client, http) = client(false, -1);
        assert!(client.start(EventDispatcher::new()).await.is_err());
        assert_eq!(client.state(), ClientState::Idle);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_cancels_reconnect() {
        let (client, http) = client(true, -1);
        let _ = client.start(EventDispatcher::new()).await;
        client.stop();
        assert_eq!(client.state(), ClientState::Stopped);
        assert!(!client.reconnect_info().in_flight);

        let calls = http.calls.load(Ordering::SeqCst);
        client.stop();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.state(), ClientState::Stopped);
        assert_eq!(http.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn start_on_running_client_is_ignored() {
        let (client, _http) = client(true, -1);
        let _ = client.start(EventDispatcher::new()).await;
        assert_ne!(client.state(), ClientState::Idle);
        assert!(client.start(EventDispatcher::new()).await.is_ok());
        client.stop();
    }

    #[tokio::test]
    async fn stop_before_start_then_restart() {
        let (client, http) = client(false, -1);
        client.stop();
        assert_eq!(client.state(), ClientState::Stopped);
        assert!(client.start(EventDispatcher::new()).await.is_err());
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_socket_is_retried_then_abandoned() {
        let http = Arc::new(DeadGateway {
            calls: AtomicU64::new(0),
        });
        let client = client_with(true, 3, http.clone());
        let err = client.start(EventDispatcher::new()).await.unwrap_err();
        assert!(
            matches!(&err, Error::Startup(msg) if msg.starts_with("transport")),
            "unexpected error: {err:?}"
        );

        wait_for_state(&client, ClientState::Idle).await;
        assert_eq!(client.connect_attempts(), 4);
        assert_eq!(http.calls.load(Ordering::SeqCst), 4);
        assert!(!client.reconnect_info().in_flight);
    }

    #[tokio::test]
    async fn write_failure_ends_the_session() {
        let (client, _http) = client(false, -1);
        let cancel = CancellationToken::new();
        *client.inner.session.lock() = Some(Session {
            id: 4,
            cancel: cancel.clone(),
        });
        client.inner.set_state(ClientState::Connected);

        let (tx, rx) = mpsc::channel(1);
        tx.send(Frame::ping(1)).await.unwrap();
        client.inner.clone().write_loop(4, BrokenSink, rx, cancel.clone()).await;

        assert!(cancel.is_cancelled());
        assert!(client.inner.session.lock().is_none());
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[tokio::test]
    async fn write_failure_arms_the_reconnect_cycle() {
        let (client, http) = client(true, 0);
        let cancel = CancellationToken::new();
        *client.inner.session.lock() = Some(Session {
            id: 5,
            cancel: cancel.clone(),
        });
        client.inner.set_state(ClientState::Connected);

        let (tx, rx) = mpsc::channel(1);
        tx.send(Frame::ping(1)).await.unwrap();
        client.inner.clone().write_loop(5, BrokenSink, rx, cancel).await;
        assert_ne!(client.state(), ClientState::Connected);

        wait_for_state(&client, ClientState::Idle).await;
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_cycle_clears_in_flight() {
        let (client, _http) = client(true, -1);
        client.stop();
        client.inner.reconnect.lock().in_flight = true;

        let token = client.inner.lifecycle.lock().clone();
        client.inner.clone().reconnect_cycle(ReconnectPolicy::default(), token).await;
        assert!(!client.reconnect_info().in_flight);
        assert_eq!(client.reconnect_info().next_connect_time, 0);
    }

    #[tokio::test]
    async fn cancelled_cycle_leaves_a_restarted_client_alone() {
        let (client, _http) = client(true, -1);
        let old = client.inner.lifecycle.lock().clone();
        old.cancel();
        *client.inner.lifecycle.lock() = CancellationToken::new();
        client.inner.reconnect.lock().in_flight = true;

        client.inner.clone().reconnect_cycle(ReconnectPolicy::default(), old).await;
        assert!(client.reconnect_info().in_flight);
    }

    #[tokio::test]
    async fn absurd_reconnect_delay_saturates() {
        let (client, _http) = client(true, -1);
        client.inner.mark_next_connect(Duration::MAX);
        assert_eq!(client.reconnect_info().next_connect_time, i64::MAX);

        client.inner.mark_next_connect(Duration::from_secs(5));
        let next = client.reconnect_info().next_connect_time;
        assert!(next > Utc::now().timestamp_millis());
    }
}
