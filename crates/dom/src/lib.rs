//! Boundary to the page the bridge lives in.
//!
//! The bridge never talks to a concrete DOM library. It reads and mutates
//! elements through [`Document`], addressing them by [`NodeId`] handles that a
//! document hands out from [`Document::query`]. [`MemoryDocument`] is the
//! in-process implementation used by the headless agent and by tests.

use std::{collections::BTreeMap, fmt, sync::Arc};

use thiserror::Error;

mod memory;
mod selector;

pub use memory::{ElementSpec, MemoryDocument, PageFixture};
pub use selector::{Selector, SelectorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Delivered to a listener when an event fires on the element it is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
    pub target: NodeId,
    pub event_type: String,
}

pub type Listener = Arc<dyn Fn(&DomEvent) + Send + Sync>;

/// Readable state of an element at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSnapshot {
    pub id: Option<String>,
    pub text: String,
    pub html: String,
    pub value: Option<String>,
    pub dataset: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("{0} is not attached to the document")]
    NodeNotFound(NodeId),
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

/// Operations the bridge needs from the host page.
///
/// Implementations must not hold internal locks while invoking listeners:
/// a listener reads the element it fired on and may push to the channel,
/// and another event can arrive while that push is in flight.
pub trait Document: Send + Sync {
    fn query(&self, selector: &Selector) -> Vec<NodeId>;
    fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DomError>;
    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError>;
    fn is_disabled(&self, node: NodeId) -> Result<bool, DomError>;
    fn set_disabled(&self, node: NodeId, disabled: bool) -> Result<(), DomError>;
    fn snapshot(&self, node: NodeId) -> Result<ElementSnapshot, DomError>;
    fn set_text(&self, node: NodeId, text: &str) -> Result<(), DomError>;
    fn set_html(&self, node: NodeId, html: &str) -> Result<(), DomError>;
    fn set_value(&self, node: NodeId, value: &str) -> Result<(), DomError>;
    fn add_listener(
        &self,
        node: NodeId,
        event_type: &str,
        listener: Listener,
    ) -> Result<ListenerId, DomError>;
    /// Returns `false` when the listener (or its element) is already gone.
    fn remove_listener(&self, node: NodeId, listener: ListenerId) -> bool;

    fn query_str(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        Ok(self.query(&Selector::parse(selector)?))
    }
}
