//! Phoenix channels over a single websocket, using the v2 JSON serializer.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::{Channel, ChannelConnector, ChannelError, ChannelEvent, InboundHandler, PushReceipt};

mod frame;

pub use frame::{
    PhoenixFrame, CLOSE_EVENT, ERROR_EVENT, HEARTBEAT_EVENT, HEARTBEAT_TOPIC, JOIN_EVENT,
    LEAVE_EVENT, REPLY_EVENT,
};

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);
const SERIALIZER_VSN: &str = "2.0.0";

#[derive(Debug, Clone)]
pub struct PhoenixConfig {
    /// Socket mount point, e.g. `ws://host/drab/socket`.
    pub endpoint: Url,
    pub token: Option<String>,
    pub heartbeat_interval: Duration,
    pub reply_timeout: Duration,
}

impl PhoenixConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            token: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn socket_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        let path = format!("{}/websocket", url.path().trim_end_matches('/'));
        url.set_path(&path);
        {
            let mut query = url.query_pairs_mut();
            if let Some(token) = &self.token {
                query.append_pair("token", token);
            }
            query.append_pair("vsn", SERIALIZER_VSN);
        }
        url
    }
}

type ReplySender = oneshot::Sender<Result<Value, ChannelError>>;

#[derive(Default)]
struct SocketState {
    outbound: Option<mpsc::UnboundedSender<Message>>,
    pending: HashMap<String, ReplySender>,
    channels: HashMap<String, Weak<ChannelShared>>,
    tasks: Vec<JoinHandle<()>>,
    generation: u64,
}

struct SocketShared {
    state: Mutex<SocketState>,
    next_ref: AtomicU64,
    reply_timeout: Duration,
}

impl SocketShared {
    fn lock(&self) -> MutexGuard<'_, SocketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_ref(&self) -> String {
        (self.next_ref.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn send(&self, frame: &PhoenixFrame) -> Result<(), ChannelError> {
        let text = frame.encode()?;
        let state = self.lock();
        let outbound = state.outbound.as_ref().ok_or(ChannelError::NotConnected)?;
        outbound
            .send(Message::Text(text))
            .map_err(|_| ChannelError::Closed)
    }

    /// Sends a frame that expects a `phx_reply` with the same ref.
    fn request(self: &Arc<Self>, frame: &PhoenixFrame) -> PushReceipt {
        let Some(reference) = frame.reference.clone() else {
            return PushReceipt::ready(Err(ChannelError::Encode(
                "request frame has no ref".to_string(),
            )));
        };
        let text = match frame.encode() {
            Ok(text) => text,
            Err(err) => return PushReceipt::ready(Err(err)),
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.lock();
            let Some(outbound) = state.outbound.clone() else {
                return PushReceipt::ready(Err(ChannelError::NotConnected));
            };
            state.pending.insert(reference.clone(), tx);
            if outbound.send(Message::Text(text)).is_err() {
                state.pending.remove(&reference);
                return PushReceipt::ready(Err(ChannelError::Closed));
            }
        }

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let shared = Arc::downgrade(self);
            let timeout = self.reply_timeout;
            handle.spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(shared) = shared.upgrade() {
                    shared.resolve(&reference, Err(ChannelError::Timeout));
                }
            });
        }
        PushReceipt::pending(rx)
    }

    fn resolve(&self, reference: &str, result: Result<Value, ChannelError>) {
        let waiter = self.lock().pending.remove(reference);
        if let Some(waiter) = waiter {
            let _ = waiter.send(result);
        }
    }

    fn channel(&self, topic: &str) -> Option<Arc<ChannelShared>> {
        self.lock().channels.get(topic).and_then(Weak::upgrade)
    }

    fn route(&self, raw: &str) {
        let Some(frame) = PhoenixFrame::parse(raw) else {
            debug!(raw, "phoenix: ignoring unparseable frame");
            return;
        };

        match frame.event.as_str() {
            REPLY_EVENT => {
                if let Some(reference) = &frame.reference {
                    self.resolve(reference, frame.reply_result());
                }
            }
            ERROR_EVENT | CLOSE_EVENT => match self.channel(&frame.topic) {
                Some(channel) if channel.is_current(frame.join_ref.as_deref()) => {
                    warn!(topic = %frame.topic, event = %frame.event, "phoenix: channel closed by server");
                    channel.clear_join();
                    channel.emit(ChannelEvent::Errored {
                        reason: frame.event.clone(),
                    });
                }
                Some(_) => {
                    debug!(topic = %frame.topic, event = %frame.event, "phoenix: ignoring close for a channel that is not joined")
                }
                None => {}
            },
            _ => match self.channel(&frame.topic) {
                Some(channel) => channel.dispatch(&frame.event, frame.payload),
                None => debug!(topic = %frame.topic, event = %frame.event, "phoenix: no channel for inbound frame"),
            },
        }
    }

    fn disconnected(&self, generation: u64) {
        let (pending, channels) = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.outbound = None;
            let pending: Vec<ReplySender> = state.pending.drain().map(|(_, tx)| tx).collect();
            let channels: Vec<Arc<ChannelShared>> =
                state.channels.values().filter_map(Weak::upgrade).collect();
            (pending, channels)
        };

        warn!(
            pending = pending.len(),
            channels = channels.len(),
            "phoenix: socket disconnected"
        );
        for waiter in pending {
            let _ = waiter.send(Err(ChannelError::Closed));
        }
        for channel in channels {
            channel.clear_join();
            channel.emit(ChannelEvent::Closed);
        }
    }
}

/// One websocket multiplexing any number of [`PhoenixChannel`]s.
pub struct PhoenixSocket {
    config: PhoenixConfig,
    shared: Arc<SocketShared>,
}

impl PhoenixSocket {
    pub fn new(config: PhoenixConfig) -> Self {
        let shared = Arc::new(SocketShared {
            state: Mutex::new(SocketState::default()),
            next_ref: AtomicU64::new(0),
            reply_timeout: config.reply_timeout,
        });
        Self { config, shared }
    }

    pub fn config(&self) -> &PhoenixConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().outbound.is_some()
    }

    /// Typed variant of [`ChannelConnector::channel`].
    pub fn phoenix_channel(&self, topic: &str, params: Value) -> Arc<PhoenixChannel> {
        let (events, _) = broadcast::channel(64);
        let shared = Arc::new(ChannelShared {
            topic: topic.to_string(),
            params,
            handlers: Mutex::new(HashMap::new()),
            join_ref: Mutex::new(None),
            joining: AtomicBool::new(false),
            events,
        });
        self.shared
            .lock()
            .channels
            .insert(topic.to_string(), Arc::downgrade(&shared));
        Arc::new(PhoenixChannel {
            shared,
            socket: Arc::clone(&self.shared),
        })
    }

    fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let period = self.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let frame = PhoenixFrame {
                    join_ref: None,
                    reference: Some(shared.next_ref()),
                    topic: HEARTBEAT_TOPIC.to_string(),
                    event: HEARTBEAT_EVENT.to_string(),
                    payload: json!({}),
                };
                if let Err(err) = shared.send(&frame) {
                    debug!(error = %err, "phoenix: heartbeat stopped");
                    break;
                }
            }
        })
    }
}

impl Drop for PhoenixSocket {
    fn drop(&mut self) {
        for task in self.shared.lock().tasks.drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl ChannelConnector for PhoenixSocket {
    async fn connect(&self) -> Result<(), ChannelError> {
        if self.is_connected() {
            return Ok(());
        }

        let url = self.config.socket_url();
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| ChannelError::Connect(err.to_string()))?;
        let (mut sink, mut stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let generation = {
            let mut state = self.shared.lock();
            for task in state.tasks.drain(..) {
                task.abort();
            }
            state.generation += 1;
            state.outbound = Some(tx);
            state.generation
        };
        info!(endpoint = %self.config.endpoint, generation, "phoenix: socket connected");

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(err) = sink.send(message).await {
                    warn!(error = %err, "phoenix: socket send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let shared = Arc::clone(&self.shared);
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => shared.route(&text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "phoenix: socket receive failed");
                        break;
                    }
                }
            }
            shared.disconnected(generation);
        });

        let heartbeat = self.spawn_heartbeat();
        self.shared.lock().tasks = vec![writer, reader, heartbeat];
        Ok(())
    }

    fn channel(&self, topic: &str, params: Value) -> Arc<dyn Channel> {
        self.phoenix_channel(topic, params)
    }
}

struct ChannelShared {
    topic: String,
    params: Value,
    handlers: Mutex<HashMap<String, Vec<InboundHandler>>>,
    join_ref: Mutex<Option<String>>,
    joining: AtomicBool,
    events: broadcast::Sender<ChannelEvent>,
}

impl ChannelShared {
    fn join_ref(&self) -> Option<String> {
        self.join_ref
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_join_ref(&self, value: Option<String>) {
        *self.join_ref.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    fn clear_join(&self) {
        self.set_join_ref(None);
    }

    /// Whether a server frame tagged with `join_ref` concerns the live join.
    /// Untagged frames count as current while the channel is joined.
    fn is_current(&self, join_ref: Option<&str>) -> bool {
        match (self.join_ref(), join_ref) {
            (Some(current), Some(tagged)) => current == tagged,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn emit(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }

    fn dispatch(&self, event: &str, payload: Value) {
        let handlers: Vec<InboundHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            debug!(topic = %self.topic, event, "phoenix: no handler for inbound event");
            return;
        }
        for handler in handlers {
            handler(payload.clone());
        }
    }
}

struct JoinGuard<'a>(&'a AtomicBool);

impl Drop for JoinGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct PhoenixChannel {
    shared: Arc<ChannelShared>,
    socket: Arc<SocketShared>,
}

impl PhoenixChannel {
    pub fn is_joined(&self) -> bool {
        self.shared.join_ref().is_some()
    }
}

#[async_trait]
impl Channel for PhoenixChannel {
    fn topic(&self) -> &str {
        &self.shared.topic
    }

    async fn join(&self) -> Result<Value, ChannelError> {
        if self.shared.joining.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::JoinInFlight(self.shared.topic.clone()));
        }
        let _guard = JoinGuard(&self.shared.joining);

        let reference = self.socket.next_ref();
        let frame = PhoenixFrame {
            join_ref: Some(reference.clone()),
            reference: Some(reference.clone()),
            topic: self.shared.topic.clone(),
            event: JOIN_EVENT.to_string(),
            payload: self.shared.params.clone(),
        };
        let result = self.socket.request(&frame).ack().await;
        match &result {
            Ok(_) => {
                self.shared.set_join_ref(Some(reference));
                info!(topic = %self.shared.topic, "phoenix: joined channel");
            }
            Err(err) => {
                warn!(topic = %self.shared.topic, error = %err, "phoenix: join failed");
            }
        }
        result
    }

    async fn leave(&self) -> Result<(), ChannelError> {
        let Some(join_ref) = self.shared.join_ref() else {
            return Ok(());
        };
        self.shared.clear_join();
        let frame = PhoenixFrame {
            join_ref: Some(join_ref),
            reference: Some(self.socket.next_ref()),
            topic: self.shared.topic.clone(),
            event: LEAVE_EVENT.to_string(),
            payload: json!({}),
        };
        self.socket.request(&frame).ack().await.map(|_| ())
    }

    fn on(&self, event: &str, handler: InboundHandler) {
        self.shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    fn push(&self, event: &str, payload: Value) -> PushReceipt {
        let Some(join_ref) = self.shared.join_ref() else {
            return PushReceipt::ready(Err(ChannelError::NotConnected));
        };
        let frame = PhoenixFrame {
            join_ref: Some(join_ref),
            reference: Some(self.socket.next_ref()),
            topic: self.shared.topic.clone(),
            event: event.to_string(),
            payload,
        };
        self.socket.request(&frame)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events.subscribe()
    }
}

#[cfg(test)]
#[path = "../tests/phoenix_tests.rs"]
mod tests;
