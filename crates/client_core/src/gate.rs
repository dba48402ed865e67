use std::collections::BTreeSet;

use dom::{Document, NodeId, Selector};
use shared::domain::EventKind;
use tracing::{debug, warn};

use crate::SessionContext;

/// Every element carrying at least one handler attribute, each listed once.
pub fn interactive_elements(document: &dyn Document) -> Vec<NodeId> {
    let mut nodes = BTreeSet::new();
    for kind in EventKind::ALL {
        nodes.extend(document.query(&Selector::has_attribute(kind.handler_attribute())));
    }
    nodes.into_iter().collect()
}

/// Sets the disabled flag on every interactive element and returns how many
/// were updated. Elements that vanish mid-pass are skipped.
pub fn set_disabled(context: &SessionContext, disabled: bool) -> usize {
    let document = context.document();
    let mut updated = 0;
    for node in interactive_elements(document) {
        match document.set_disabled(node, disabled) {
            Ok(()) => updated += 1,
            Err(err) => warn!(%node, error = %err, "gate: could not toggle element"),
        }
    }
    debug!(
        session_id = %context.session_id(),
        disabled,
        updated,
        "gate: interactivity updated"
    );
    updated
}

#[cfg(test)]
#[path = "tests/gate_tests.rs"]
mod tests;
