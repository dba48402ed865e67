//! Scriptable stand-ins for the channel layer.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use channel_integration::{
    Channel, ChannelConnector, ChannelError, ChannelEvent, InboundHandler, PushReceipt,
};
use serde_json::{json, Value};
use tokio::sync::{broadcast, Notify};

pub(crate) struct RecordingChannel {
    topic: String,
    join_results: Mutex<VecDeque<Result<Value, ChannelError>>>,
    joins: AtomicUsize,
    hold_joins: AtomicBool,
    join_started: Notify,
    release_join: Notify,
    leaves: AtomicUsize,
    refuse_pushes: AtomicBool,
    handlers: Mutex<HashMap<String, Vec<InboundHandler>>>,
    pushes: Mutex<Vec<(String, Value)>>,
    events: broadcast::Sender<ChannelEvent>,
}

impl RecordingChannel {
    pub(crate) fn new(topic: &str) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            topic: topic.to_string(),
            join_results: Mutex::new(VecDeque::new()),
            joins: AtomicUsize::new(0),
            hold_joins: AtomicBool::new(false),
            join_started: Notify::new(),
            release_join: Notify::new(),
            leaves: AtomicUsize::new(0),
            refuse_pushes: AtomicBool::new(false),
            handlers: Mutex::new(HashMap::new()),
            pushes: Mutex::new(Vec::new()),
            events,
        })
    }

    /// Queues the outcome of the next join; unscripted joins succeed.
    pub(crate) fn script_join(&self, result: Result<Value, ChannelError>) {
        self.join_results.lock().expect("lock").push_back(result);
    }

    /// Makes every join wait for [`RecordingChannel::release`].
    pub(crate) fn hold_joins(&self) {
        self.hold_joins.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release(&self) {
        self.release_join.notify_one();
    }

    pub(crate) async fn wait_for_join(&self) {
        self.join_started.notified().await;
    }

    /// Makes every push fail the way an unjoined channel refuses it.
    pub(crate) fn refuse_pushes(&self, refuse: bool) {
        self.refuse_pushes.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub(crate) fn leaves(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    pub(crate) fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .lock()
            .expect("lock")
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Simulates the controller pushing `event` to the client.
    pub(crate) fn deliver(&self, event: &str, payload: Value) {
        let handlers = self
            .handlers
            .lock()
            .expect("lock")
            .get(event)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(payload.clone());
        }
    }

    pub(crate) fn pushes(&self, event: &str) -> Vec<Value> {
        self.pushes
            .lock()
            .expect("lock")
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub(crate) fn emit(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn join(&self) -> Result<Value, ChannelError> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        self.join_started.notify_one();
        if self.hold_joins.load(Ordering::SeqCst) {
            self.release_join.notified().await;
        }
        self.join_results
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }

    async fn leave(&self) -> Result<(), ChannelError> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on(&self, event: &str, handler: InboundHandler) {
        self.handlers
            .lock()
            .expect("lock")
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    fn push(&self, event: &str, payload: Value) -> PushReceipt {
        if self.refuse_pushes.load(Ordering::SeqCst) {
            return PushReceipt::ready(Err(ChannelError::NotConnected));
        }
        self.pushes
            .lock()
            .expect("lock")
            .push((event.to_string(), payload));
        PushReceipt::ready(Ok(json!({})))
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }
}

pub(crate) struct RecordingConnector {
    channel: Arc<RecordingChannel>,
    connect_failures: AtomicUsize,
    connects: AtomicUsize,
    requested: Mutex<Vec<(String, Value)>>,
}

impl RecordingConnector {
    pub(crate) fn new(channel: Arc<RecordingChannel>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            connect_failures: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        })
    }

    /// Makes the next `count` connects fail.
    pub(crate) fn fail_connects(&self, count: usize) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn requested(&self) -> Vec<(String, Value)> {
        self.requested.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ChannelConnector for RecordingConnector {
    async fn connect(&self) -> Result<(), ChannelError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let remaining = self.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ChannelError::Connect("connection refused".to_string()));
        }
        Ok(())
    }

    fn channel(&self, topic: &str, params: Value) -> Arc<dyn Channel> {
        self.requested
            .lock()
            .expect("lock")
            .push((topic.to_string(), params));
        self.channel.clone()
    }
}
