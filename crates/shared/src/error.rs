use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecFailureKind {
    Parse,
    Reference,
    Type,
    Thrown,
    Dom,
    Internal,
}

/// Structured failure sent back to the controller in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecFailure {
    pub kind: ExecFailureKind,
    pub message: String,
}

impl ExecFailure {
    pub fn new(kind: ExecFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },
    #[error("{0} is not defined")]
    Reference(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("uncaught {0}")]
    Thrown(String),
    #[error("dom error: {0}")]
    Dom(String),
    #[error("interpreter failed: {0}")]
    Internal(String),
}

impl ExecError {
    pub fn parse(offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ExecFailureKind {
        match self {
            ExecError::Parse { .. } => ExecFailureKind::Parse,
            ExecError::Reference(_) => ExecFailureKind::Reference,
            ExecError::Type(_) => ExecFailureKind::Type,
            ExecError::Thrown(_) => ExecFailureKind::Thrown,
            ExecError::Dom(_) => ExecFailureKind::Dom,
            ExecError::Internal(_) => ExecFailureKind::Internal,
        }
    }
}

impl From<ExecError> for ExecFailure {
    fn from(value: ExecError) -> Self {
        let message = match &value {
            ExecError::Thrown(message) => message.clone(),
            other => other.to_string(),
        };
        Self {
            kind: value.kind(),
            message,
        }
    }
}
