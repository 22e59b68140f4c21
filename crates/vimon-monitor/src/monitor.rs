//! Monitor orchestration.
//!
//! Wires the token store, feed connection, decoder, handler and sink
//! together and supervises them from a single `select!` loop: frames are
//! decoded and handled in arrival order, the refresh timer keeps the
//! token fresh, and exhaustion of either the auth retries or the
//! reconnect budget terminates the run with an error.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult, StateError};
use crate::sink::WriterSink;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vimon_auth::{AuthError, TokenStore};
use vimon_feed::{HandlerError, MessageProcessor, ViEventHandler};
use vimon_persistence::EventWriter;
use vimon_ws::FeedConnection;

/// Frame channel depth between the connection task and the read loop.
const FRAME_CHANNEL_CAPACITY: usize = 1000;

/// Monitor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// The top-level orchestrator.
pub struct Monitor {
    config: AppConfig,
    state: Arc<RwLock<MonitorState>>,
    shutdown: CancellationToken,
}

impl Monitor {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(MonitorState::Idle)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.read()
    }

    /// Request a stop. No-op unless the monitor is running.
    pub fn stop(&self) {
        let mut state = self.state.write();
        if *state == MonitorState::Running {
            info!("Monitor stop requested");
            *state = MonitorState::Stopping;
            self.shutdown.cancel();
        }
    }

    /// Run the monitor until stopped or until a retry budget is exhausted.
    pub async fn start(&self) -> AppResult<()> {
        {
            let mut state = self.state.write();
            match *state {
                MonitorState::Idle => *state = MonitorState::Running,
                // A monitor is single-shot; a stopped one stays stopped.
                MonitorState::Stopped => return Err(StateError::AlreadyStopped.into()),
                MonitorState::Running | MonitorState::Stopping => {
                    return Err(StateError::AlreadyRunning.into())
                }
            }
        }

        let result = self.run().await;

        *self.state.write() = MonitorState::Stopped;
        if let Err(ref e) = result {
            error!(error = %e, "Monitor terminated");
        }
        result
    }

    async fn run(&self) -> AppResult<()> {
        let tokens = Arc::new(TokenStore::new(self.config.auth_config()?)?);

        info!("Fetching initial access token");
        self.refresh_with_retry(&tokens).await?;

        let (frame_tx, mut frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let connection = Arc::new(FeedConnection::new(
            self.config.conn_config(),
            tokens.clone(),
            frame_tx,
        ));

        let sink = Arc::new(WriterSink::new(EventWriter::new(
            &self.config.persistence.data_dir,
            self.config.persistence.buffer_size,
        )));
        let handler = ViEventHandler::new(
            sink.clone(),
            connection.handle(),
            Duration::from_secs(self.config.watch.trade_watch_secs),
        );
        let processor = MessageProcessor::new();

        let mut conn_task = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.run().await })
        };

        let mut refresh_interval = tokio::time::interval(Duration::from_secs(
            self.config.auth.check_interval_secs,
        ));
        refresh_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; the token was just fetched.
        refresh_interval.tick().await;

        info!("Monitor running");

        let result = loop {
            tokio::select! {
                res = &mut conn_task => {
                    let conn_result =
                        res.map_err(|e| AppError::Internal(format!("connection task: {e}")))?;
                    match conn_result {
                        // The connection only returns Ok on shutdown.
                        Ok(()) => break Ok(()),
                        Err(e) => {
                            error!(error = %e, "Feed connection gave up");
                            break Err(e.into());
                        }
                    }
                }

                Some(frame) = frame_rx.recv() => {
                    let envelope = match processor.decode(&frame) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            warn!(error = %e, "Dropping undecodable frame");
                            continue;
                        }
                    };
                    match handler.handle(envelope).await {
                        Ok(_) => {}
                        Err(e @ HandlerError::MissingRequiredField { .. }) => {
                            warn!(error = %e, "Skipping incomplete VI frame");
                        }
                        Err(e) => {
                            // Sink failures mean events are being lost.
                            error!(error = %e, "Event handling failed");
                            connection.shutdown();
                            break Err(e.into());
                        }
                    }
                }

                _ = refresh_interval.tick() => {
                    let before = tokens.current().await.ok().map(|t| t.value);
                    if let Err(e) = self.refresh_with_retry(&tokens).await {
                        connection.shutdown();
                        break Err(e);
                    }
                    let after = tokens.current().await.ok().map(|t| t.value);
                    if before != after {
                        info!("Access token refreshed");
                        connection.reauthenticate();
                    }
                }

                () = self.shutdown.cancelled() => {
                    info!("Shutting down monitor");
                    break Ok(());
                }
            }
        };

        connection.shutdown();
        if !conn_task.is_finished() {
            if let Err(e) = conn_task.await {
                warn!(?e, "Connection task did not shut down cleanly");
            }
        }

        if let Err(e) = sink.close() {
            warn!(error = %e, "Failed to flush event sink on shutdown");
        }

        result
    }

    /// `ensure_valid` with bounded exponential-backoff retry.
    ///
    /// Rejected credentials fail immediately; transient failures are
    /// retried up to the configured cap.
    async fn refresh_with_retry(&self, tokens: &TokenStore) -> AppResult<()> {
        let margin = Duration::from_secs(self.config.auth.refresh_margin_secs);
        let max_retries = self.config.auth.max_retries.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match tokens.ensure_valid(margin).await {
                Ok(_) => return Ok(()),
                Err(e @ AuthError::Unauthorized(_)) => {
                    error!(error = %e, "Credentials rejected");
                    return Err(e.into());
                }
                Err(e) if attempt >= max_retries => {
                    error!(attempt, error = %e, "Token retry budget exhausted");
                    return Err(e.into());
                }
                Err(e) => {
                    let delay = Duration::from_millis(
                        self.config.auth.retry_base_delay_ms << (attempt - 1).min(10),
                    );
                    warn!(attempt, error = %e, delay_ms = delay.as_millis(), "Token fetch failed, retrying");
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.shutdown.cancelled() => {
                            return Err(AppError::Internal("shutdown during token retry".to_string()));
                        }
                    }
                }
            }
        }
    }
}
