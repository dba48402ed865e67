use super::*;

use dom::{ElementSpec, MemoryDocument};

#[test]
fn first_call_assigns_and_later_calls_reuse() {
    let document = MemoryDocument::new();
    let node = document.insert(ElementSpec::new("button"));

    let first = ensure_id(&document, node).expect("id");
    let second = ensure_id(&document, node).expect("id");
    assert_eq!(first, second);
    assert_eq!(
        document
            .attribute(node, CORRELATION_ATTRIBUTE)
            .expect("attr")
            .as_deref(),
        Some(first.as_str())
    );
}

#[test]
fn existing_attribute_is_kept() {
    let document = MemoryDocument::new();
    let node = document.insert(ElementSpec::new("button").with_attribute("drab-id", "server-given"));

    assert_eq!(
        ensure_id(&document, node).expect("id"),
        CorrelationId::from("server-given")
    );
}

#[test]
fn distinct_elements_get_distinct_ids() {
    let document = MemoryDocument::new();
    let a = document.insert(ElementSpec::new("button"));
    let b = document.insert(ElementSpec::new("button"));
    assert_ne!(
        ensure_id(&document, a).expect("id"),
        ensure_id(&document, b).expect("id")
    );
}

#[test]
fn detached_element_is_an_error() {
    let document = MemoryDocument::new();
    let node = document.insert(ElementSpec::new("button"));
    document.remove(node);
    assert_eq!(ensure_id(&document, node), Err(DomError::NodeNotFound(node)));
}
