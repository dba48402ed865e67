use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use channel_integration::{Channel, ChannelConnector, ChannelError, ChannelEvent};
use dom::Document;
use serde_json::Value;
use shared::{
    domain::ConnectionState,
    protocol::ONLOAD_MESSAGE,
};
use thiserror::Error;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{gate, CommandInterpreter, EventBinder, RemoteExecutor, SessionContext};

/// Return mode sent in the join params when none is configured.
pub const DEFAULT_RETURN_MODE: &str = "";

/// How often and how patiently a session retries a failed join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): `base * 2^min(retry, 6)`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.min(6);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Page path, sent in the join params and used to build the topic.
    pub path: String,
    pub return_mode: String,
    pub retry: RetryPolicy,
}

impl SessionConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            return_mode: DEFAULT_RETURN_MODE.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_return_mode(mut self, return_mode: impl Into<String>) -> Self {
        self.return_mode = return_mode.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    JoinFailed { attempt: u32, error: String },
    OnloadSent,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session already started")]
    AlreadyStarted,
    #[error("session has not been started")]
    NotStarted,
    #[error("a join is already in flight")]
    JoinInFlight,
    #[error("session has been stopped")]
    Stopped,
    #[error("join failed after {attempts} attempts: {source}")]
    JoinExhausted {
        attempts: u32,
        #[source]
        source: ChannelError,
    },
    #[error("failed to encode join params: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

#[derive(Default)]
struct SessionState {
    connection: ConnectionState,
    channel: Option<Arc<dyn Channel>>,
    join_in_flight: bool,
    stopped: bool,
    interactivity_enabled: bool,
    handlers_installed: bool,
    onload_fired: bool,
}

/// One page's bridge to its controller.
///
/// `start` disables interactive elements, opens the page channel and joins
/// it. On the first successful join the elements are enabled, DOM listeners
/// are bound, the `execjs` handler is installed and `onload` is pushed.
/// Later joins only rebind listeners. If a join gives up, the elements are
/// disabled again and the next successful join re-enables them. A stopped
/// session never rejoins.
pub struct Session {
    context: Arc<SessionContext>,
    connector: Arc<dyn ChannelConnector>,
    executor: Arc<RemoteExecutor>,
    binder: EventBinder,
    retry: RetryPolicy,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        document: Arc<dyn Document>,
        connector: Arc<dyn ChannelConnector>,
        interpreter: Arc<dyn CommandInterpreter>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            context: Arc::new(SessionContext::new(
                config.path,
                config.return_mode,
                document,
            )),
            connector,
            executor: Arc::new(RemoteExecutor::new(interpreter)),
            binder: EventBinder::new(),
            retry: config.retry,
            state: Mutex::new(SessionState::default()),
            events,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.lock().connection
    }

    pub fn onload_fired(&self) -> bool {
        self.lock().onload_fired
    }

    pub fn binder(&self) -> &EventBinder {
        &self.binder
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), SessionError> {
        let params = serde_json::to_value(self.context.join_params())?;
        let channel = {
            let mut state = self.lock();
            if state.channel.is_some() {
                return Err(SessionError::AlreadyStarted);
            }
            let disabled = gate::set_disabled(&self.context, true);
            info!(
                session_id = %self.context.session_id(),
                path = self.context.path(),
                disabled,
                "session: starting"
            );
            let channel = self.connector.channel(&self.context.topic(), params);
            state.channel = Some(Arc::clone(&channel));
            channel
        };
        self.join_with_retry(&channel).await
    }

    /// Runs connect and join again on the existing channel.
    pub async fn rejoin(self: &Arc<Self>) -> Result<(), SessionError> {
        let channel = self.live_channel()?;
        self.join_with_retry(&channel).await
    }

    /// Watches the channel for drops and rejoins after each one. The task ends
    /// when the session is dropped or stopped, or when a rejoin gives up.
    pub fn supervise(self: &Arc<Self>) -> Result<JoinHandle<()>, SessionError> {
        let channel = self.live_channel()?;
        let mut channel_events = channel.subscribe_events();
        let session: Weak<Session> = Arc::downgrade(self);

        Ok(tokio::spawn(async move {
            loop {
                let event = match channel_events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "session: lagged behind channel events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(session) = session.upgrade() else {
                    break;
                };
                if session.is_stopped() {
                    debug!(?event, "session: stopped, supervisor exiting");
                    break;
                }
                match &event {
                    ChannelEvent::Closed => warn!("session: socket closed, rejoining"),
                    ChannelEvent::Errored { reason } => {
                        warn!(reason = %reason, "session: channel errored, rejoining")
                    }
                }
                session.set_connection(ConnectionState::Disconnected);
                match session.rejoin().await {
                    Ok(()) | Err(SessionError::JoinInFlight) => {}
                    Err(SessionError::Stopped) => break,
                    Err(err) => {
                        error!(error = %err, "session: supervisor stopping");
                        break;
                    }
                }
            }
        }))
    }

    /// Leaves the channel and detaches every listener. Interactive elements
    /// are disabled again and the session refuses further joins.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let channel = {
            let mut state = self.lock();
            let channel = state.channel.clone().ok_or(SessionError::NotStarted)?;
            state.stopped = true;
            state.interactivity_enabled = false;
            channel
        };
        self.binder.unbind_all(self.context.document());
        gate::set_disabled(&self.context, true);
        let left = channel.leave().await;
        self.set_connection(ConnectionState::Disconnected);
        info!(session_id = %self.context.session_id(), "session: stopped");
        left.map_err(SessionError::from)
    }

    async fn join_with_retry(self: &Arc<Self>, channel: &Arc<dyn Channel>) -> Result<(), SessionError> {
        let _guard = InFlight::acquire(self)?;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if self.is_stopped() {
                return Err(SessionError::Stopped);
            }
            attempt += 1;
            self.set_connection(ConnectionState::Joining);
            match self.connect_and_join(channel).await {
                Ok(response) => {
                    debug!(attempt, %response, "session: join accepted");
                    return self.joined(channel);
                }
                Err(err) => {
                    warn!(
                        session_id = %self.context.session_id(),
                        attempt,
                        max_attempts,
                        error = %err,
                        "session: join failed"
                    );
                    self.emit(SessionEvent::JoinFailed {
                        attempt,
                        error: err.to_string(),
                    });
                    if attempt >= max_attempts {
                        self.lock().interactivity_enabled = false;
                        let disabled = gate::set_disabled(&self.context, true);
                        self.set_connection(ConnectionState::Disconnected);
                        error!(
                            disabled,
                            session_id = %self.context.session_id(),
                            "session: giving up, interactive elements stay disabled"
                        );
                        return Err(SessionError::JoinExhausted {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    tokio::time::sleep(self.retry.delay_for(attempt - 1)).await;
                }
            }
        }
    }

    async fn connect_and_join(&self, channel: &Arc<dyn Channel>) -> Result<Value, ChannelError> {
        self.connector.connect().await?;
        channel.join().await
    }

    fn joined(&self, channel: &Arc<dyn Channel>) -> Result<(), SessionError> {
        let (enable, install_handlers) = {
            let mut state = self.lock();
            if state.stopped {
                drop(state);
                debug!(topic = channel.topic(), "session: join completed after stop, ignoring");
                self.set_connection(ConnectionState::Disconnected);
                return Err(SessionError::Stopped);
            }
            let enable = !state.interactivity_enabled;
            let install_handlers = !state.handlers_installed;
            state.interactivity_enabled = true;
            state.handlers_installed = true;
            (enable, install_handlers)
        };
        self.set_connection(ConnectionState::Connected);

        if enable {
            gate::set_disabled(&self.context, false);
        }
        self.binder.bind_all(&self.context, channel);
        if install_handlers {
            self.executor.install(channel);
            channel.on(
                ONLOAD_MESSAGE,
                Arc::new(|_payload: Value| debug!("session: controller acknowledged onload")),
            );
        }
        self.fire_onload(channel);
        info!(
            session_id = %self.context.session_id(),
            topic = channel.topic(),
            enabled = enable,
            "session: connected"
        );
        Ok(())
    }

    fn fire_onload(&self, channel: &Arc<dyn Channel>) {
        {
            let mut state = self.lock();
            if state.onload_fired {
                return;
            }
            state.onload_fired = true;
        }
        let receipt = channel.push(ONLOAD_MESSAGE, Value::Null);
        if let Some(err) = receipt.refused() {
            warn!(error = %err, "session: onload not sent");
            return;
        }
        self.emit(SessionEvent::OnloadSent);
    }

    fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// The session's channel, unless it was never started or has been stopped.
    fn live_channel(&self) -> Result<Arc<dyn Channel>, SessionError> {
        let state = self.lock();
        if state.stopped {
            return Err(SessionError::Stopped);
        }
        state.channel.clone().ok_or(SessionError::NotStarted)
    }

    fn set_connection(&self, connection: ConnectionState) {
        let changed = {
            let mut state = self.lock();
            let changed = state.connection != connection;
            state.connection = connection;
            changed
        };
        if changed {
            self.emit(SessionEvent::StateChanged(connection));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

struct InFlight<'a> {
    session: &'a Session,
}

impl<'a> InFlight<'a> {
    fn acquire(session: &'a Session) -> Result<Self, SessionError> {
        let mut state = session.lock();
        if state.join_in_flight {
            return Err(SessionError::JoinInFlight);
        }
        state.join_in_flight = true;
        Ok(Self { session })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.session.lock().join_in_flight = false;
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
