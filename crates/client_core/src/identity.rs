use dom::{Document, DomError, NodeId};
use shared::domain::{CorrelationId, CORRELATION_ATTRIBUTE};
use tracing::debug;

/// Returns the element's correlation id, assigning a fresh one on first use.
///
/// An id, once written, is never replaced, so the controller can rely on
/// `drab-id` to address the same element across events and rejoins.
pub fn ensure_id(document: &dyn Document, node: NodeId) -> Result<CorrelationId, DomError> {
    if let Some(existing) = document.attribute(node, CORRELATION_ATTRIBUTE)? {
        if !existing.is_empty() {
            return Ok(CorrelationId(existing));
        }
    }

    let id = CorrelationId::generate();
    document.set_attribute(node, CORRELATION_ATTRIBUTE, id.as_str())?;
    debug!(%node, correlation_id = %id, "identity: tagged element");
    Ok(id)
}

#[cfg(test)]
#[path = "tests/identity_tests.rs"]
mod tests;
