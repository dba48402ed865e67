use super::*;

use std::sync::Arc;

use dom::{ElementSpec, MemoryDocument};

fn page() -> (Arc<MemoryDocument>, Vec<NodeId>, NodeId) {
    let document = Arc::new(MemoryDocument::new());
    let nodes = vec![
        document.insert(ElementSpec::new("button").with_attribute("drab-click", "save")),
        document.insert(
            ElementSpec::new("input")
                .with_attribute("drab-change", "qty_changed")
                .with_attribute("drab-keyup", "qty_typed"),
        ),
        document.insert(ElementSpec::new("textarea").with_attribute("drab-keydown", "note")),
    ];
    let plain = document.insert(ElementSpec::new("p").with_text("static"));
    (document, nodes, plain)
}

#[test]
fn interactive_elements_are_unique_across_handler_kinds() {
    let (document, nodes, _) = page();
    assert_eq!(interactive_elements(document.as_ref()), nodes);
}

#[test]
fn disables_and_enables_only_interactive_elements() {
    let (document, nodes, plain) = page();
    let context = SessionContext::new("/", "x", document.clone());

    assert_eq!(set_disabled(&context, true), 3);
    for node in &nodes {
        assert!(document.is_disabled(*node).expect("disabled"));
    }
    assert!(!document.is_disabled(plain).expect("disabled"));

    assert_eq!(set_disabled(&context, false), 3);
    for node in &nodes {
        assert!(!document.is_disabled(*node).expect("disabled"));
    }
}

#[test]
fn empty_page_is_a_no_op() {
    let context = SessionContext::new("/", "x", Arc::new(MemoryDocument::new()));
    assert_eq!(set_disabled(&context, true), 0);
}
