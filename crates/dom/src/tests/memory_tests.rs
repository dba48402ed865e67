use super::*;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

fn counting_listener(counter: &Arc<AtomicUsize>) -> Listener {
    let counter = Arc::clone(counter);
    Arc::new(move |_event: &DomEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn query_matches_ids_and_attributes_in_insertion_order() {
    let document = MemoryDocument::new();
    let first = document.insert(
        ElementSpec::new("button")
            .with_id("a")
            .with_attribute("drab-click", "one"),
    );
    let second = document.insert(ElementSpec::new("input").with_attribute("drab-click", "two"));
    document.insert(ElementSpec::new("span").with_text("plain"));

    assert_eq!(
        document.query(&Selector::has_attribute("drab-click")),
        vec![first, second]
    );
    assert_eq!(document.query(&Selector::id("a")), vec![first]);
    assert_eq!(
        document.query_str("[drab-click=two]").expect("selector"),
        vec![second]
    );
    assert!(document.query_str("div > p").is_err());
}

#[test]
fn snapshot_reports_text_html_value_and_camel_cased_dataset() {
    let document = MemoryDocument::new();
    let node = document.insert(
        ElementSpec::new("input")
            .with_id("qty")
            .with_attribute("data-row-id", "7")
            .with_attribute("data-kind", "line")
            .with_value("3"),
    );
    let label = document.insert(ElementSpec::new("label").with_html("<b>Total</b> &amp; tax"));

    let snapshot = document.snapshot(node).expect("snapshot");
    assert_eq!(snapshot.id.as_deref(), Some("qty"));
    assert_eq!(snapshot.value.as_deref(), Some("3"));
    assert_eq!(
        snapshot.dataset,
        BTreeMap::from([
            ("kind".to_string(), "line".to_string()),
            ("rowId".to_string(), "7".to_string()),
        ])
    );

    let label = document.snapshot(label).expect("snapshot");
    assert_eq!(label.text, "Total & tax");
    assert_eq!(label.html, "<b>Total</b> &amp; tax");
    assert_eq!(label.value, None);
}

#[test]
fn set_text_escapes_into_html_and_set_html_strips_into_text() {
    let document = MemoryDocument::new();
    let node = document.insert(ElementSpec::new("div"));

    document.set_text(node, "a < b").expect("set text");
    let snapshot = document.snapshot(node).expect("snapshot");
    assert_eq!(snapshot.text, "a < b");
    assert_eq!(snapshot.html, "a &lt; b");

    document.set_html(node, "<i>hi</i>").expect("set html");
    assert_eq!(document.snapshot(node).expect("snapshot").text, "hi");
}

#[test]
fn dispatch_runs_matching_listeners_only() {
    let document = MemoryDocument::new();
    let node = document.insert(ElementSpec::new("button"));
    let clicks = Arc::new(AtomicUsize::new(0));
    let keys = Arc::new(AtomicUsize::new(0));

    document
        .add_listener(node, "click", counting_listener(&clicks))
        .expect("listen");
    document
        .add_listener(node, "keyup", counting_listener(&keys))
        .expect("listen");

    assert_eq!(document.dispatch(node, "click").expect("dispatch"), 1);
    assert_eq!(clicks.load(Ordering::SeqCst), 1);
    assert_eq!(keys.load(Ordering::SeqCst), 0);
    assert_eq!(document.listener_count(node, "click"), 1);
}

#[test]
fn disabled_elements_swallow_events() {
    let document = MemoryDocument::new();
    let node = document.insert(ElementSpec::new("button"));
    let clicks = Arc::new(AtomicUsize::new(0));
    document
        .add_listener(node, "click", counting_listener(&clicks))
        .expect("listen");

    document.set_disabled(node, true).expect("disable");
    assert_eq!(document.dispatch(node, "click").expect("dispatch"), 0);
    assert!(document.is_disabled(node).expect("disabled"));

    document.set_disabled(node, false).expect("enable");
    assert_eq!(document.dispatch(node, "click").expect("dispatch"), 1);
    assert_eq!(clicks.load(Ordering::SeqCst), 1);
}

#[test]
fn disabled_flag_only_blocks_form_controls() {
    let document = MemoryDocument::new();
    let heading = document.insert(ElementSpec::new("h1"));
    let select = document.insert(ElementSpec::new("SELECT"));
    let clicks = Arc::new(AtomicUsize::new(0));
    for node in [heading, select] {
        document
            .add_listener(node, "click", counting_listener(&clicks))
            .expect("listen");
        document.set_disabled(node, true).expect("disable");
    }

    assert_eq!(document.dispatch(heading, "click").expect("dispatch"), 1);
    assert!(document.is_disabled(heading).expect("disabled"));
    assert_eq!(document.dispatch(select, "click").expect("dispatch"), 0);
    assert_eq!(clicks.load(Ordering::SeqCst), 1);
}

#[test]
fn removed_listener_no_longer_fires() {
    let document = MemoryDocument::new();
    let node = document.insert(ElementSpec::new("button"));
    let clicks = Arc::new(AtomicUsize::new(0));
    let id = document
        .add_listener(node, "click", counting_listener(&clicks))
        .expect("listen");

    assert!(document.remove_listener(node, id));
    assert!(!document.remove_listener(node, id));
    assert_eq!(document.dispatch(node, "click").expect("dispatch"), 0);
}

#[test]
fn listeners_may_read_the_document_while_dispatching() {
    let document = Arc::new(MemoryDocument::new());
    let node = document.insert(ElementSpec::new("input").with_value("x"));
    let seen = Arc::new(std::sync::Mutex::new(None));

    let reader = Arc::clone(&document);
    let sink = Arc::clone(&seen);
    document
        .add_listener(
            node,
            "change",
            Arc::new(move |event: &DomEvent| {
                let value = reader.snapshot(event.target).expect("snapshot").value;
                *sink.lock().expect("lock") = value;
            }),
        )
        .expect("listen");

    document.dispatch(node, "change").expect("dispatch");
    assert_eq!(seen.lock().expect("lock").as_deref(), Some("x"));
}

#[test]
fn operations_on_removed_nodes_fail() {
    let document = MemoryDocument::new();
    let node = document.insert(ElementSpec::new("div"));
    assert!(document.remove(node));
    assert!(document.is_empty());
    assert_eq!(
        document.snapshot(node),
        Err(DomError::NodeNotFound(node))
    );
    assert!(document.dispatch(node, "click").is_err());
}

#[test]
fn fixture_loads_from_toml() {
    let fixture: PageFixture = toml::from_str(
        r#"
        [[element]]
        tag = "button"
        id = "go"
        text = "Go"
        attributes = { "drab-click" = "go_clicked" }

        [[element]]
        tag = "input"
        value = "initial"
        disabled = true
        "#,
    )
    .expect("fixture");

    let document = MemoryDocument::from_fixture(&fixture);
    assert_eq!(document.len(), 2);
    let go = document.query(&Selector::id("go"));
    assert_eq!(go.len(), 1);
    assert_eq!(
        document.attribute(go[0], "drab-click").expect("attr").as_deref(),
        Some("go_clicked")
    );
    assert_eq!(document.tag(go[0]).as_deref(), Some("button"));
}
