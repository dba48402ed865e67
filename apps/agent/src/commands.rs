use dom::{Document, DomError, MemoryDocument, NodeId, Selector, SelectorError};
use serde_json::json;
use shared::domain::{EventKind, UnknownEventKind};
use thiserror::Error;

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `click #id`, `change #id <value>`, `keyup #id [value]`, `keydown #id [value]`.
    /// A value is written to the element before the event fires.
    Fire {
        kind: EventKind,
        selector: Selector,
        value: Option<String>,
    },
    /// `show <selector>` prints the current state of every match.
    Show { selector: Selector },
}

#[derive(Debug, PartialEq, Error)]
pub enum CommandError {
    #[error("unknown command {0:?}; expected click, change, keyup, keydown or show")]
    Unknown(String),
    #[error("{0} needs a selector")]
    MissingSelector(String),
    #[error("change needs a value")]
    MissingValue,
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error("nothing matches {0}")]
    NoMatch(Selector),
}

impl From<UnknownEventKind> for CommandError {
    fn from(value: UnknownEventKind) -> Self {
        CommandError::Unknown(value.0)
    }
}

/// Parses a line; blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (name, rest) = split_word(line);
    let kind = match name {
        "show" => None,
        other => Some(other.parse::<EventKind>()?),
    };
    let (raw_selector, value) = split_word(rest);
    if raw_selector.is_empty() {
        return Err(CommandError::MissingSelector(name.to_string()));
    }
    let selector = Selector::parse(raw_selector)?;
    let value = (!value.is_empty()).then(|| value.to_string());

    let Some(kind) = kind else {
        return Ok(Some(Command::Show { selector }));
    };
    if kind == EventKind::Change && value.is_none() {
        return Err(CommandError::MissingValue);
    }
    Ok(Some(Command::Fire {
        kind,
        selector,
        value,
    }))
}

/// Runs a command against the page and returns a line to print.
pub fn apply(document: &MemoryDocument, command: &Command) -> Result<String, CommandError> {
    match command {
        Command::Fire {
            kind,
            selector,
            value,
        } => {
            let nodes = matching(document, selector)?;
            let mut listeners = 0;
            for node in &nodes {
                if let Some(value) = value {
                    document.set_value(*node, value)?;
                }
                listeners += document.dispatch(*node, kind.as_str())?;
            }
            Ok(format!(
                "{kind} fired on {} element(s), {listeners} listener(s) ran",
                nodes.len()
            ))
        }
        Command::Show { selector } => {
            let mut lines = Vec::new();
            for node in matching(document, selector)? {
                let snapshot = document.snapshot(node)?;
                lines.push(
                    json!({
                        "node": node.0,
                        "id": snapshot.id,
                        "text": snapshot.text,
                        "val": snapshot.value,
                        "disabled": document.is_disabled(node)?,
                    })
                    .to_string(),
                );
            }
            Ok(lines.join("\n"))
        }
    }
}

fn matching(document: &MemoryDocument, selector: &Selector) -> Result<Vec<NodeId>, CommandError> {
    let nodes = document.query(selector);
    if nodes.is_empty() {
        return Err(CommandError::NoMatch(selector.clone()));
    }
    Ok(nodes)
}

fn split_word(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
