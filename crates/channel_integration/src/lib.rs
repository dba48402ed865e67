use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};

pub mod phoenix;

pub use phoenix::{PhoenixChannel, PhoenixConfig, PhoenixFrame, PhoenixSocket};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("failed to connect socket: {0}")]
    Connect(String),
    #[error("socket is not connected")]
    NotConnected,
    #[error("a join is already in flight for topic {0}")]
    JoinInFlight(String),
    #[error("server rejected the request: {0}")]
    Rejected(Value),
    #[error("timed out waiting for a reply")]
    Timeout,
    #[error("connection closed")]
    Closed,
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

/// Lifecycle notifications a channel emits after a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The socket dropped; every joined channel on it is gone.
    Closed,
    /// The server reported a crash or close of this topic.
    Errored { reason: String },
}

pub type InboundHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Acknowledgement handle returned by [`Channel::push`]. Dropping it makes the
/// push fire-and-forget.
pub struct PushReceipt {
    inner: ReceiptState,
}

enum ReceiptState {
    Pending(oneshot::Receiver<Result<Value, ChannelError>>),
    Ready(Result<Value, ChannelError>),
}

impl PushReceipt {
    pub fn pending(rx: oneshot::Receiver<Result<Value, ChannelError>>) -> Self {
        Self {
            inner: ReceiptState::Pending(rx),
        }
    }

    pub fn ready(result: Result<Value, ChannelError>) -> Self {
        Self {
            inner: ReceiptState::Ready(result),
        }
    }

    /// The error a push was refused with before it reached the socket, such
    /// as [`ChannelError::NotConnected`] while the channel is not joined.
    pub fn refused(&self) -> Option<&ChannelError> {
        match &self.inner {
            ReceiptState::Ready(Err(err)) => Some(err),
            _ => None,
        }
    }

    pub async fn ack(self) -> Result<Value, ChannelError> {
        match self.inner {
            ReceiptState::Pending(rx) => rx.await.unwrap_or(Err(ChannelError::Closed)),
            ReceiptState::Ready(result) => result,
        }
    }
}

/// A topic-scoped conversation with the controller.
///
/// Implementations allow at most one join in flight, keep handlers registered
/// through [`Channel::on`] for the lifetime of the channel (across rejoins),
/// and never block in [`Channel::push`].
#[async_trait]
pub trait Channel: Send + Sync {
    fn topic(&self) -> &str;
    async fn join(&self) -> Result<Value, ChannelError>;
    async fn leave(&self) -> Result<(), ChannelError>;
    fn on(&self, event: &str, handler: InboundHandler);
    fn push(&self, event: &str, payload: Value) -> PushReceipt;
    fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent>;
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Opens the underlying connection; a no-op when it is already open.
    async fn connect(&self) -> Result<(), ChannelError>;
    fn channel(&self, topic: &str, params: Value) -> Arc<dyn Channel>;
}
