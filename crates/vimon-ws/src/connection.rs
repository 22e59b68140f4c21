//! Feed connection lifecycle.
//!
//! Owns the socket, the reconnect loop, and subscription replay. All
//! inbound frames are forwarded raw over an mpsc channel; decoding
//! happens downstream so a malformed frame can never take down the
//! connection task.

use crate::error::{ConnError, ConnResult};
use crate::frame::{Directive, DirectiveAction};
use crate::handle::FeedHandle;
use crate::heartbeat::LivenessMonitor;
use crate::subscription::SubscriptionManager;
use futures_util::{FutureExt, SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vimon_auth::{AuthError, Token, TokenStore};
use vimon_core::{Market, RawFrame, VI_CHANNEL};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnConfig {
    /// Realtime gateway URL.
    pub url: String,
    /// Markets whose VI channel is subscribed on every (re)connect.
    pub markets: Vec<Market>,
    /// Maximum consecutive reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Connection is considered dead after this long without any frame.
    pub idle_timeout_ms: u64,
    /// Token refresh margin applied when acquiring the session token.
    pub token_refresh_margin_secs: u64,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            markets: Market::ALL.to_vec(),
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 5000,
            reconnect_max_delay_ms: 60000,
            idle_timeout_ms: 60000,
            token_refresh_margin_secs: 300,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    /// Socket is up and the base VI subscriptions have been sent.
    Subscribed,
    Closing,
}

/// Feed connection manager.
pub struct FeedConnection {
    config: ConnConfig,
    tokens: Arc<TokenStore>,
    state: Arc<RwLock<ConnState>>,
    subscriptions: Arc<SubscriptionManager>,
    liveness: Arc<LivenessMonitor>,
    frame_tx: mpsc::Sender<RawFrame>,
    reconnect_count: Arc<RwLock<u32>>,
    outbound_tx: mpsc::Sender<Directive>,
    outbound_rx: Arc<TokioMutex<mpsc::Receiver<Directive>>>,
    reauth: Arc<tokio::sync::Notify>,
    shutdown_token: CancellationToken,
}

impl FeedConnection {
    pub fn new(
        config: ConnConfig,
        tokens: Arc<TokenStore>,
        frame_tx: mpsc::Sender<RawFrame>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(100);
        let idle_timeout_ms = config.idle_timeout_ms;
        Self {
            config,
            tokens,
            state: Arc::new(RwLock::new(ConnState::Disconnected)),
            subscriptions: Arc::new(SubscriptionManager::new()),
            liveness: Arc::new(LivenessMonitor::new(idle_timeout_ms)),
            frame_tx,
            reconnect_count: Arc::new(RwLock::new(0)),
            outbound_tx,
            outbound_rx: Arc::new(TokioMutex::new(outbound_rx)),
            reauth: Arc::new(tokio::sync::Notify::new()),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle for queueing directives.
    ///
    /// The handle can be cloned and shared across tasks.
    pub fn handle(&self) -> FeedHandle {
        FeedHandle::new(
            self.outbound_tx.clone(),
            self.state.clone(),
            self.subscriptions.clone(),
        )
    }

    pub fn state(&self) -> ConnState {
        *self.state.read()
    }

    /// Signal graceful shutdown. Both the message loop and the retry
    /// loop exit promptly.
    pub fn shutdown(&self) {
        info!("FeedConnection shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Tell a live session its token was replaced.
    ///
    /// The permit is stored if the session is busy between polls, so the
    /// signal is never lost; repeated calls coalesce into one teardown.
    /// A permit left over from between sessions is discarded before the
    /// next attempt, which reads the store anyway.
    pub fn reauthenticate(&self) {
        self.reauth.notify_one();
    }

    /// Connect and run until shutdown or until retries are exhausted.
    pub async fn run(&self) -> ConnResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting connect loop");
                *self.state.write() = ConnState::Disconnected;
                return Ok(());
            }

            *self.state.write() = ConnState::Connecting;

            // A re-auth permit stored while disconnected is stale: the
            // token acquired below is already the latest.
            let _ = self.reauth.notified().now_or_never();

            let session = match self.acquire_token().await {
                Ok(token) => self.run_session(&token).await,
                Err(e) => Err(e),
            };

            match session {
                Ok(()) => info!("Feed connection closed"),
                Err(ConnError::Auth(AuthError::Unauthorized(msg))) => {
                    error!(%msg, "Credentials rejected, not retrying");
                    *self.state.write() = ConnState::Disconnected;
                    return Err(ConnError::Auth(AuthError::Unauthorized(msg)));
                }
                Err(ConnError::Reauthenticate) => {
                    // Not a failure: reconnect immediately with the
                    // refreshed token, no backoff.
                    info!("Reconnecting with refreshed token");
                    continue;
                }
                Err(e) => error!(?e, "Feed connection error"),
            }

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                *self.state.write() = ConnState::Disconnected;
                return Ok(());
            }

            // A session that reached Subscribed resets the failure streak.
            if *self.reconnect_count.read() == 0 {
                attempt = 0;
            }
            attempt += 1;
            *self.reconnect_count.write() = attempt;

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max reconnection attempts reached");
                *self.state.write() = ConnState::Disconnected;
                return Err(ConnError::RetriesExhausted(attempt));
            }

            let delay = backoff_delay(
                self.config.reconnect_base_delay_ms,
                self.config.reconnect_max_delay_ms,
                attempt,
            );
            warn!(attempt, delay_ms = delay.as_millis(), "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    *self.state.write() = ConnState::Disconnected;
                    return Ok(());
                }
            }
        }
    }

    async fn acquire_token(&self) -> ConnResult<Token> {
        let margin = Duration::from_secs(self.config.token_refresh_margin_secs);
        Ok(self.tokens.ensure_valid(margin).await?)
    }

    async fn run_session(&self, token: &Token) -> ConnResult<()> {
        info!(url = %self.config.url, "Connecting to feed gateway");

        let mut request = self.config.url.as_str().into_client_request()?;
        let bearer = format!("Bearer {}", token.value)
            .parse()
            .map_err(|_| ConnError::ConnectionFailed("token not header-safe".to_string()))?;
        request
            .headers_mut()
            .insert(tungstenite::http::header::AUTHORIZATION, bearer);

        let (ws_stream, _response) =
            match connect_async_tls_with_config(request, None, true, None).await {
                Ok(ok) => ok,
                Err(e) => {
                    // A rejected handshake usually means the token went
                    // stale; force a refresh so the next attempt carries
                    // a fresh one.
                    if is_auth_rejection(&e) {
                        warn!("Handshake rejected, forcing token refresh");
                        self.tokens.refresh().await?;
                    }
                    return Err(e.into());
                }
            };
        let (mut write, mut read) = ws_stream.split();
        info!("Feed gateway connected");

        self.seed_base_subscriptions();
        for directive in self.subscriptions.replay_order() {
            let wire = directive.render(&token.value)?;
            write.send(Message::Text(wire)).await?;
            debug!(
                tr_cd = %directive.tr_cd,
                tr_key = %directive.tr_key,
                "Subscription directive sent"
            );
        }

        *self.state.write() = ConnState::Subscribed;
        *self.reconnect_count.write() = 0;
        self.liveness.reset();
        info!(
            subscriptions = self.subscriptions.len(),
            "Feed subscribed, entering message loop"
        );

        loop {
            let outbound_recv = async { self.outbound_rx.lock().await.recv().await };

            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    *self.state.write() = ConnState::Closing;
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    *self.state.write() = ConnState::Disconnected;
                    return Ok(());
                }

                () = self.reauth.notified() => {
                    info!("Token replaced, tearing down session");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame before re-auth");
                    }
                    return Err(ConnError::Reauthenticate);
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.liveness.record_frame();
                            self.forward(RawFrame::from(text)).await;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.liveness.record_frame();
                            self.forward(RawFrame::new(data)).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.liveness.record_frame();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.liveness.record_frame();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Feed closed by server");
                            return Err(ConnError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(?e, "Feed read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("Feed stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                outbound = outbound_recv => {
                    if let Some(directive) = outbound {
                        let wire = directive.render(&token.value)?;
                        write.send(Message::Text(wire)).await?;
                        match directive.action {
                            DirectiveAction::Subscribe => {
                                self.subscriptions.add(&directive);
                            }
                            DirectiveAction::Unsubscribe => {
                                self.subscriptions.remove(&directive.tr_cd, &directive.tr_key);
                            }
                        }
                        debug!(
                            tr_cd = %directive.tr_cd,
                            tr_key = %directive.tr_key,
                            ?directive.action,
                            "Directive sent"
                        );
                    }
                }

                _ = self.liveness.wait_for_check() => {
                    if self.liveness.is_idle() {
                        error!(
                            idle_ms = self.liveness.idle_ms(),
                            "No frames within idle timeout"
                        );
                        return Err(ConnError::IdleTimeout);
                    }
                }
            }
        }
    }

    /// Register the base VI subscriptions if the registry has none.
    ///
    /// Dynamic trade subscriptions added during a previous session stay
    /// in the registry and are replayed together with the base set.
    fn seed_base_subscriptions(&self) {
        for market in &self.config.markets {
            self.subscriptions
                .add(&Directive::subscribe(VI_CHANNEL, market.code()));
        }
    }

    async fn forward(&self, frame: RawFrame) {
        if self.frame_tx.send(frame).await.is_err() {
            warn!("Frame receiver dropped");
        }
    }
}

fn is_auth_rejection(e: &tungstenite::Error) -> bool {
    match e {
        tungstenite::Error::Http(response) => {
            response.status() == tungstenite::http::StatusCode::UNAUTHORIZED
                || response.status() == tungstenite::http::StatusCode::FORBIDDEN
        }
        _ => false,
    }
}

/// Exponential backoff: base * 2^(attempt-1), capped, plus 0-1000ms jitter.
fn backoff_delay(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10);
    let delay = base_ms.saturating_mul(1u64 << exponent).min(max_ms);
    Duration::from_millis(delay + rand_jitter())
}

/// Generate random jitter (0-1000ms).
fn rand_jitter() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use vimon_auth::AuthConfig;

    /// In-process gateway: drops the first `fail_first` connections at
    /// the TCP level, then speaks websocket, recording the handshake
    /// Authorization header and the first inbound directive and sending
    /// `frames` before idling.
    struct Gateway {
        url: String,
        connections: Arc<AtomicUsize>,
        last_auth: Arc<parking_lot::Mutex<Option<String>>>,
        last_subscribe: Arc<parking_lot::Mutex<Option<String>>>,
    }

    async fn spawn_gateway(fail_first: usize, frames: Vec<String>) -> Gateway {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/websocket", listener.local_addr().unwrap());
        let connections = Arc::new(AtomicUsize::new(0));
        let last_auth = Arc::new(parking_lot::Mutex::new(None));
        let last_subscribe = Arc::new(parking_lot::Mutex::new(None));

        {
            let connections = connections.clone();
            let last_auth = last_auth.clone();
            let last_subscribe = last_subscribe.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let seen = connections.fetch_add(1, Ordering::SeqCst) + 1;
                    if seen <= fail_first {
                        drop(stream);
                        continue;
                    }
                    let last_auth = last_auth.clone();
                    let last_subscribe = last_subscribe.clone();
                    let frames = frames.clone();
                    tokio::spawn(async move {
                        let record_auth =
                            move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                                *last_auth.lock() = req
                                    .headers()
                                    .get("authorization")
                                    .and_then(|v| v.to_str().ok())
                                    .map(String::from);
                                Ok(resp)
                            };
                        let Ok(ws) =
                            tokio_tungstenite::accept_hdr_async(stream, record_auth).await
                        else {
                            return;
                        };
                        let (mut write, mut read) = ws.split();
                        if let Some(Ok(Message::Text(text))) = read.next().await {
                            *last_subscribe.lock() = Some(text);
                        }
                        for frame in frames {
                            if write.send(Message::Text(frame)).await.is_err() {
                                return;
                            }
                        }
                        while let Some(Ok(_)) = read.next().await {}
                    });
                }
            });
        }

        Gateway {
            url,
            connections,
            last_auth,
            last_subscribe,
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 5s");
    }

    #[test]
    fn test_default_config() {
        let config = ConnConfig::default();
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_base_delay_ms, 5000);
        assert_eq!(config.markets, vec![Market::Kospi, Market::Kosdaq]);
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let first = backoff_delay(5000, 60000, 1).as_millis() as u64;
        let third = backoff_delay(5000, 60000, 3).as_millis() as u64;
        let tenth = backoff_delay(5000, 60000, 10).as_millis() as u64;

        assert!((5000..6000).contains(&first));
        assert!((20000..21000).contains(&third));
        assert!((60000..61000).contains(&tenth));
    }

    fn unreachable_connection(max_attempts: u32) -> FeedConnection {
        let tokens = TokenStore::new(AuthConfig {
            // Nothing listens on this port, so token acquisition fails fast.
            token_url: "http://127.0.0.1:9/oauth2/token".to_string(),
            app_key: "k".to_string(),
            app_secret: "s".to_string(),
        })
        .unwrap();
        let (frame_tx, _frame_rx) = mpsc::channel(16);
        FeedConnection::new(
            ConnConfig {
                url: "ws://127.0.0.1:9/websocket".to_string(),
                max_reconnect_attempts: max_attempts,
                reconnect_base_delay_ms: 1,
                reconnect_max_delay_ms: 2,
                ..Default::default()
            },
            Arc::new(tokens),
            frame_tx,
        )
    }

    #[tokio::test]
    async fn test_retries_exhausted_on_unreachable_endpoint() {
        let conn = unreachable_connection(2);

        let result = tokio::time::timeout(Duration::from_secs(30), conn.run()).await;
        match result {
            Ok(Err(ConnError::RetriesExhausted(attempts))) => assert_eq!(attempts, 2),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(conn.state(), ConnState::Disconnected);
    }

    #[tokio::test]
    async fn test_shutdown_unblocks_run() {
        let conn = Arc::new(unreachable_connection(0));

        let runner = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.run().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        conn.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("run did not exit after shutdown")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(conn.state(), ConnState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnect_resets_streak_and_uses_latest_token() {
        let mut server = mockito::Server::new_async().await;
        // Every issuance is a fresh token that expires inside the refresh
        // margin, so each connect attempt fetches a new one.
        let issued = Arc::new(AtomicUsize::new(0));
        let counter = issued.clone();
        let _mock = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body_from_request(move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                format!(r#"{{"access_token":"tok-{n}","expires_in":1}}"#).into_bytes()
            })
            .expect_at_least(3)
            .create_async()
            .await;

        let gateway = spawn_gateway(2, Vec::new()).await;
        let tokens = TokenStore::new(AuthConfig {
            token_url: format!("{}/oauth2/token", server.url()),
            app_key: "k".to_string(),
            app_secret: "s".to_string(),
        })
        .unwrap();
        let (frame_tx, _frame_rx) = mpsc::channel(16);
        let conn = Arc::new(FeedConnection::new(
            ConnConfig {
                url: gateway.url.clone(),
                markets: vec![Market::Kospi],
                max_reconnect_attempts: 3,
                reconnect_base_delay_ms: 1,
                reconnect_max_delay_ms: 2,
                ..Default::default()
            },
            Arc::new(tokens),
            frame_tx,
        ));

        let runner = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.run().await })
        };

        // Two handshakes fail (cap is 3), the third subscribes.
        wait_until(|| conn.state() == ConnState::Subscribed).await;
        wait_until(|| gateway.last_subscribe.lock().is_some()).await;
        assert_eq!(gateway.connections.load(Ordering::SeqCst), 3);
        // A successful subscribe clears the failure streak.
        assert_eq!(*conn.reconnect_count.read(), 0);

        // Both the handshake and the replayed directive carry the token
        // fetched for this attempt, not the one from the first attempt.
        assert_eq!(gateway.last_auth.lock().as_deref(), Some("Bearer tok-3"));
        let wire: serde_json::Value =
            serde_json::from_str(gateway.last_subscribe.lock().as_ref().unwrap()).unwrap();
        assert_eq!(wire["header"]["token"], "tok-3");
        assert_eq!(wire["body"]["tr_cd"], "VI_");
        assert_eq!(wire["body"]["tr_key"], "1");

        conn.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("run did not exit after shutdown")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_silent_feed_times_out() {
        let gateway = spawn_gateway(0, Vec::new()).await;
        let tokens = TokenStore::new(AuthConfig {
            token_url: "http://127.0.0.1:9/oauth2/token".to_string(),
            app_key: "k".to_string(),
            app_secret: "s".to_string(),
        })
        .unwrap();
        let (frame_tx, _frame_rx) = mpsc::channel(16);
        let conn = FeedConnection::new(
            ConnConfig {
                url: gateway.url.clone(),
                idle_timeout_ms: 100,
                ..Default::default()
            },
            Arc::new(tokens),
            frame_tx,
        );

        let token = Token::new("tok".to_string(), Utc::now(), 3600);
        let result = tokio::time::timeout(Duration::from_secs(5), conn.run_session(&token))
            .await
            .expect("session did not end");
        assert!(matches!(result, Err(ConnError::IdleTimeout)));
    }

    #[tokio::test]
    async fn test_reauthenticate_lands_while_session_is_busy() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok","expires_in":3600}"#)
            .create_async()
            .await;

        // Two frames per connection into a capacity-1 channel nobody
        // drains: the session blocks forwarding the second frame, so it
        // cannot be waiting on the re-auth signal when it arrives.
        let ack = r#"{"header":{"tr_cd":"VI_","rsp_msg":"ok"}}"#.to_string();
        let gateway = spawn_gateway(0, vec![ack.clone(), ack]).await;

        let tokens = TokenStore::new(AuthConfig {
            token_url: format!("{}/oauth2/token", server.url()),
            app_key: "k".to_string(),
            app_secret: "s".to_string(),
        })
        .unwrap();
        let (frame_tx, mut frame_rx) = mpsc::channel(1);
        let conn = Arc::new(FeedConnection::new(
            ConnConfig {
                url: gateway.url.clone(),
                max_reconnect_attempts: 0,
                reconnect_base_delay_ms: 1,
                reconnect_max_delay_ms: 2,
                ..Default::default()
            },
            Arc::new(tokens),
            frame_tx,
        ));

        let runner = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.run().await })
        };

        wait_until(|| conn.state() == ConnState::Subscribed).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        conn.reauthenticate();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Unblock the session; the stored signal must tear it down and
        // reconnect rather than evaporate.
        let drain = tokio::spawn(async move { while frame_rx.recv().await.is_some() {} });
        wait_until(|| gateway.connections.load(Ordering::SeqCst) >= 2).await;

        conn.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("run did not exit after shutdown")
            .unwrap();
        assert!(result.is_ok());
        drain.abort();
    }
}
