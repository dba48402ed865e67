use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use channel_integration::{Channel, ChannelError};
use dom::{Document, DomError, DomEvent, Listener, ListenerId, NodeId, Selector};
use shared::{
    domain::{CorrelationId, EventKind},
    protocol::{EventMessage, EventPayload, EVENT_MESSAGE},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{identity, SessionContext};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("event not sent: {0}")]
    Channel(#[from] ChannelError),
}

/// Outcome of one [`EventBinder::bind_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindReport {
    pub bound: usize,
    pub replaced: usize,
    pub pruned: usize,
}

/// Owns the DOM listeners the bridge installs.
///
/// Each `(element, event kind)` pair holds at most one listener; binding again
/// removes the previous one first, so repeated joins never stack listeners.
#[derive(Default)]
pub struct EventBinder {
    bindings: Mutex<HashMap<(NodeId, EventKind), ListenerId>>,
}

impl EventBinder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(NodeId, EventKind), ListenerId>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn bind_all(&self, context: &Arc<SessionContext>, channel: &Arc<dyn Channel>) -> BindReport {
        let document = context.document();
        let mut bindings = self.lock();
        let mut report = BindReport::default();
        let mut live = HashSet::new();

        for kind in EventKind::ALL {
            for node in document.query(&Selector::has_attribute(kind.handler_attribute())) {
                live.insert((node, kind));
                if let Some(previous) = bindings.remove(&(node, kind)) {
                    if document.remove_listener(node, previous) {
                        report.replaced += 1;
                    }
                }
                let listener = event_listener(Arc::downgrade(context), Arc::clone(channel), kind);
                match document.add_listener(node, kind.as_str(), listener) {
                    Ok(id) => {
                        bindings.insert((node, kind), id);
                        report.bound += 1;
                    }
                    Err(err) => warn!(%node, event = %kind, error = %err, "dispatch: could not bind"),
                }
            }
        }

        // Elements that lost their handler attribute or left the page.
        let stale: Vec<_> = bindings
            .keys()
            .filter(|key| !live.contains(key))
            .copied()
            .collect();
        for key in stale {
            if let Some(id) = bindings.remove(&key) {
                document.remove_listener(key.0, id);
                report.pruned += 1;
            }
        }

        info!(
            session_id = %context.session_id(),
            bound = report.bound,
            replaced = report.replaced,
            pruned = report.pruned,
            "dispatch: listeners bound"
        );
        report
    }

    /// Removes every listener this binder installed.
    pub fn unbind_all(&self, document: &dyn Document) -> usize {
        let mut bindings = self.lock();
        let removed = bindings
            .drain()
            .filter(|((node, _), id)| document.remove_listener(*node, *id))
            .count();
        debug!(removed, "dispatch: listeners removed");
        removed
    }

    pub fn binding_count(&self) -> usize {
        self.lock().len()
    }
}

fn event_listener(
    context: Weak<SessionContext>,
    channel: Arc<dyn Channel>,
    kind: EventKind,
) -> Listener {
    Arc::new(move |event: &DomEvent| {
        let Some(context) = context.upgrade() else {
            return;
        };
        if let Err(err) = dispatch_event(&context, channel.as_ref(), event.target, kind) {
            warn!(node = %event.target, event = %kind, error = %err, "dispatch: event dropped");
        }
    })
}

/// Captures the element's state and pushes it to the controller.
///
/// The push is fire-and-forget: the controller never replies to `event`.
/// A push the channel refuses outright, for example while it is not joined,
/// is returned as [`DispatchError::Channel`].
pub fn dispatch_event(
    context: &SessionContext,
    channel: &dyn Channel,
    node: NodeId,
    kind: EventKind,
) -> Result<EventMessage, DispatchError> {
    let document = context.document();
    let correlation_id = identity::ensure_id(document, node)?;
    let payload = build_payload(document, node, kind, correlation_id)?;
    let message = EventMessage {
        event: kind,
        payload,
    };
    let receipt = channel.push(EVENT_MESSAGE, serde_json::to_value(&message)?);
    if let Some(err) = receipt.refused() {
        return Err(DispatchError::Channel(err.clone()));
    }
    debug!(
        topic = channel.topic(),
        event = %kind,
        correlation_id = %message.payload.correlation_id,
        "dispatch: event sent"
    );
    Ok(message)
}

pub fn build_payload(
    document: &dyn Document,
    node: NodeId,
    kind: EventKind,
    correlation_id: CorrelationId,
) -> Result<EventPayload, DomError> {
    let snapshot = document.snapshot(node)?;
    let handler_name = document.attribute(node, kind.handler_attribute())?;
    Ok(EventPayload {
        element_id: snapshot.id,
        text: snapshot.text,
        html: snapshot.html,
        value: snapshot.value,
        dataset: snapshot.dataset,
        correlation_id,
        handler_name,
    })
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
