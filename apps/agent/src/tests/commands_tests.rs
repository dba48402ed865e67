use super::*;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use dom::{DomEvent, ElementSpec};

#[test]
fn parses_event_commands() {
    assert_eq!(
        parse("click #save"),
        Ok(Some(Command::Fire {
            kind: EventKind::Click,
            selector: Selector::id("save"),
            value: None,
        }))
    );
    assert_eq!(
        parse("  change   #qty   12 units "),
        Ok(Some(Command::Fire {
            kind: EventKind::Change,
            selector: Selector::id("qty"),
            value: Some("12 units".to_string()),
        }))
    );
    assert_eq!(
        parse("show [drab-click]"),
        Ok(Some(Command::Show {
            selector: Selector::has_attribute("drab-click"),
        }))
    );
    assert_eq!(parse("   "), Ok(None));
}

#[test]
fn rejects_bad_commands() {
    assert_eq!(
        parse("hover #save"),
        Err(CommandError::Unknown("hover".to_string()))
    );
    assert_eq!(
        parse("click"),
        Err(CommandError::MissingSelector("click".to_string()))
    );
    assert_eq!(parse("change #qty"), Err(CommandError::MissingValue));
    assert!(matches!(
        parse("click div > p"),
        Err(CommandError::Selector(_))
    ));
}

#[test]
fn fire_sets_value_then_dispatches() {
    let document = MemoryDocument::new();
    let node = document.insert(ElementSpec::new("input").with_id("qty").with_value("1"));
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    document
        .add_listener(
            node,
            "change",
            Arc::new(move |_event: &DomEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .expect("listen");

    let command = parse("change #qty 7").expect("parse").expect("command");
    let output = apply(&document, &command).expect("apply");

    assert_eq!(output, "change fired on 1 element(s), 1 listener(s) ran");
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(
        document.snapshot(node).expect("snapshot").value.as_deref(),
        Some("7")
    );
}

#[test]
fn unmatched_selector_is_reported() {
    let document = MemoryDocument::new();
    let command = parse("click #ghost").expect("parse").expect("command");
    assert_eq!(
        apply(&document, &command),
        Err(CommandError::NoMatch(Selector::id("ghost")))
    );
}

#[test]
fn show_prints_one_line_per_match() {
    let document = MemoryDocument::new();
    document.insert(ElementSpec::new("span").with_id("total").with_text("12"));
    let command = parse("show #total").expect("parse").expect("command");
    let output = apply(&document, &command).expect("apply");
    let line: serde_json::Value = serde_json::from_str(&output).expect("json");
    assert_eq!(line["id"], "total");
    assert_eq!(line["text"], "12");
    assert_eq!(line["disabled"], false);
}
