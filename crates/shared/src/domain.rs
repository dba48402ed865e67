use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(SessionId);
id_newtype!(CorrelationId);
id_newtype!(SenderId);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Attribute the bridge writes on an element the first time it dispatches from it.
pub const CORRELATION_ATTRIBUTE: &str = "drab-id";

/// The closed set of UI events the bridge listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Click,
    Change,
    Keyup,
    Keydown,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Click,
        EventKind::Change,
        EventKind::Keyup,
        EventKind::Keydown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::Change => "change",
            EventKind::Keyup => "keyup",
            EventKind::Keydown => "keydown",
        }
    }

    /// Attribute whose presence opts an element into capture for this event.
    /// Its value names the controller-side handler.
    pub fn handler_attribute(self) -> &'static str {
        match self {
            EventKind::Click => "drab-click",
            EventKind::Change => "drab-change",
            EventKind::Keyup => "drab-keyup",
            EventKind::Keydown => "drab-keydown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized event type '{0}'")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Joining,
    Connected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_parses_only_the_fixed_vocabulary() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
        assert_eq!(
            "submit".parse::<EventKind>(),
            Err(UnknownEventKind("submit".to_string()))
        );
    }

    #[test]
    fn handler_attribute_is_prefixed_event_name() {
        for kind in EventKind::ALL {
            assert_eq!(kind.handler_attribute(), format!("drab-{kind}"));
        }
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(CorrelationId::generate(), CorrelationId::generate());
        assert_ne!(SessionId::generate(), SessionId::generate());
    }
}
