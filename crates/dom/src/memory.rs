use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use serde::Deserialize;
use tracing::debug;

use crate::{
    Document, DomError, DomEvent, ElementSnapshot, Listener, ListenerId, NodeId, Selector,
};

/// Declarative description of one element, as found in page fixture files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ElementSpec {
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

fn default_tag() -> String {
    "div".to_string()
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// A page described as a flat list of elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageFixture {
    #[serde(default, rename = "element")]
    pub elements: Vec<ElementSpec>,
}

struct RegisteredListener {
    id: ListenerId,
    event_type: String,
    callback: Listener,
}

struct MemoryNode {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    html: String,
    value: Option<String>,
    disabled: bool,
    listeners: Vec<RegisteredListener>,
}

#[derive(Default)]
struct DocumentState {
    nodes: BTreeMap<NodeId, MemoryNode>,
    next_node: u64,
    next_listener: u64,
}

impl DocumentState {
    fn node(&self, node: NodeId) -> Result<&MemoryNode, DomError> {
        self.nodes.get(&node).ok_or(DomError::NodeNotFound(node))
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut MemoryNode, DomError> {
        self.nodes.get_mut(&node).ok_or(DomError::NodeNotFound(node))
    }
}

/// Flat, in-process document. Elements are kept in insertion order, which is
/// also the order `query` returns them in.
#[derive(Default)]
pub struct MemoryDocument {
    state: Mutex<DocumentState>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: &PageFixture) -> Self {
        let document = Self::new();
        for spec in &fixture.elements {
            document.insert(spec.clone());
        }
        document
    }

    fn lock(&self) -> MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, spec: ElementSpec) -> NodeId {
        let mut attributes = spec.attributes;
        if let Some(id) = spec.id {
            attributes.insert("id".to_string(), id);
        }
        let disabled = spec.disabled || attributes.contains_key("disabled");
        let (text, html) = match spec.html {
            Some(html) if spec.text.is_empty() => (strip_tags(&html), html),
            Some(html) => (spec.text, html),
            None => {
                let html = escape_html(&spec.text);
                (spec.text, html)
            }
        };

        let mut state = self.lock();
        state.next_node += 1;
        let id = NodeId(state.next_node);
        state.nodes.insert(
            id,
            MemoryNode {
                tag: spec.tag,
                attributes,
                text,
                html,
                value: spec.value,
                disabled,
                listeners: Vec::new(),
            },
        );
        id
    }

    /// Detaches an element together with all of its listeners.
    pub fn remove(&self, node: NodeId) -> bool {
        self.lock().nodes.remove(&node).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tag(&self, node: NodeId) -> Option<String> {
        self.lock().nodes.get(&node).map(|n| n.tag.clone())
    }

    pub fn listener_count(&self, node: NodeId, event_type: &str) -> usize {
        self.lock().nodes.get(&node).map_or(0, |n| {
            n.listeners
                .iter()
                .filter(|l| l.event_type == event_type)
                .count()
        })
    }

    /// Fires `event_type` on `node` and returns how many listeners ran.
    ///
    /// Disabled form controls swallow events. On any other tag the disabled
    /// flag is kept but ignored, as browsers do. Listeners run after the
    /// internal lock is released so they are free to read and mutate the
    /// document.
    pub fn dispatch(&self, node: NodeId, event_type: &str) -> Result<usize, DomError> {
        let callbacks: Vec<Listener> = {
            let state = self.lock();
            let target = state.node(node)?;
            if target.disabled && is_form_control(&target.tag) {
                debug!(%node, event_type, "dom: event suppressed on disabled element");
                return Ok(0);
            }
            target
                .listeners
                .iter()
                .filter(|l| l.event_type == event_type)
                .map(|l| l.callback.clone())
                .collect()
        };

        let event = DomEvent {
            target: node,
            event_type: event_type.to_string(),
        };
        for callback in &callbacks {
            callback(&event);
        }
        Ok(callbacks.len())
    }
}

/// Tags whose `disabled` property blocks user events.
const FORM_CONTROLS: &[&str] = &[
    "button", "fieldset", "input", "optgroup", "option", "select", "textarea",
];

fn is_form_control(tag: &str) -> bool {
    FORM_CONTROLS
        .iter()
        .any(|control| control.eq_ignore_ascii_case(tag))
}

impl Document for MemoryDocument {
    fn query(&self, selector: &Selector) -> Vec<NodeId> {
        self.lock()
            .nodes
            .iter()
            .filter(|(_, node)| selector.matches(&node.attributes))
            .map(|(id, _)| *id)
            .collect()
    }

    fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DomError> {
        Ok(self.lock().node(node)?.attributes.get(name).cloned())
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let mut state = self.lock();
        let target = state.node_mut(node)?;
        target
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn is_disabled(&self, node: NodeId) -> Result<bool, DomError> {
        Ok(self.lock().node(node)?.disabled)
    }

    fn set_disabled(&self, node: NodeId, disabled: bool) -> Result<(), DomError> {
        self.lock().node_mut(node)?.disabled = disabled;
        Ok(())
    }

    fn snapshot(&self, node: NodeId) -> Result<ElementSnapshot, DomError> {
        let state = self.lock();
        let target = state.node(node)?;
        Ok(ElementSnapshot {
            id: target.attributes.get("id").cloned(),
            text: target.text.clone(),
            html: target.html.clone(),
            value: target.value.clone(),
            dataset: dataset(&target.attributes),
        })
    }

    fn set_text(&self, node: NodeId, text: &str) -> Result<(), DomError> {
        let mut state = self.lock();
        let target = state.node_mut(node)?;
        target.text = text.to_string();
        target.html = escape_html(text);
        Ok(())
    }

    fn set_html(&self, node: NodeId, html: &str) -> Result<(), DomError> {
        let mut state = self.lock();
        let target = state.node_mut(node)?;
        target.text = strip_tags(html);
        target.html = html.to_string();
        Ok(())
    }

    fn set_value(&self, node: NodeId, value: &str) -> Result<(), DomError> {
        self.lock().node_mut(node)?.value = Some(value.to_string());
        Ok(())
    }

    fn add_listener(
        &self,
        node: NodeId,
        event_type: &str,
        listener: Listener,
    ) -> Result<ListenerId, DomError> {
        let mut state = self.lock();
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state.node_mut(node)?.listeners.push(RegisteredListener {
            id,
            event_type: event_type.to_string(),
            callback: listener,
        });
        Ok(id)
    }

    fn remove_listener(&self, node: NodeId, listener: ListenerId) -> bool {
        let mut state = self.lock();
        let Some(target) = state.nodes.get_mut(&node) else {
            return false;
        };
        let before = target.listeners.len();
        target.listeners.retain(|l| l.id != listener);
        target.listeners.len() != before
    }
}

/// `data-row-id="7"` becomes `rowId => "7"`.
fn dataset(attributes: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    attributes
        .iter()
        .filter_map(|(name, value)| {
            let key = name.strip_prefix("data-")?;
            if key.is_empty() {
                return None;
            }
            Some((camel_case(key), value.clone()))
        })
        .collect()
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            other if !in_tag => out.push(other),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod tests;
