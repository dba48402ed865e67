use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use channel_integration::Channel;
use serde_json::Value;
use shared::{
    domain::SenderId,
    error::{ExecError, ExecFailure, ExecFailureKind},
    protocol::{ExecReply, ExecRequest, EXECJS_MESSAGE},
};
use tracing::{debug, warn};

use crate::CommandInterpreter;

/// Answers `execjs` requests from the controller.
///
/// Every request that names a sender gets exactly one reply carrying the same
/// sender, whatever the script does.
pub struct RemoteExecutor {
    interpreter: Arc<dyn CommandInterpreter>,
}

impl RemoteExecutor {
    pub fn new(interpreter: Arc<dyn CommandInterpreter>) -> Self {
        Self { interpreter }
    }

    pub fn execute(&self, request: &ExecRequest) -> ExecReply {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.interpreter.execute(&request.script)
        }))
        .unwrap_or_else(|_| Err(ExecError::Internal("interpreter panicked".to_string())));

        match outcome {
            Ok(value) => {
                debug!(sender_id = %request.sender_id, "remote_exec: script succeeded");
                ExecReply::ok(request.sender_id.clone(), value)
            }
            Err(err) => {
                warn!(sender_id = %request.sender_id, error = %err, "remote_exec: script failed");
                ExecReply::failed(request.sender_id.clone(), err.into())
            }
        }
    }

    /// Decodes a raw `execjs` payload and runs it. Returns `None` only when
    /// the payload carries no usable sender, since such a reply could not be
    /// correlated.
    pub fn handle_payload(&self, payload: Value) -> Option<ExecReply> {
        match serde_json::from_value::<ExecRequest>(payload.clone()) {
            Ok(request) => Some(self.execute(&request)),
            Err(err) => match payload.get("sender").and_then(Value::as_str) {
                Some(sender) => {
                    warn!(sender_id = sender, error = %err, "remote_exec: malformed request");
                    Some(ExecReply::failed(
                        SenderId::from(sender),
                        ExecFailure::new(
                            ExecFailureKind::Parse,
                            format!("malformed execjs request: {err}"),
                        ),
                    ))
                }
                None => {
                    warn!(error = %err, "remote_exec: dropping request without sender");
                    None
                }
            },
        }
    }

    /// Registers the `execjs` handler on `channel`. Call once per channel.
    pub fn install(self: &Arc<Self>, channel: &Arc<dyn Channel>) {
        let executor = Arc::clone(self);
        let weak = Arc::downgrade(channel);
        channel.on(
            EXECJS_MESSAGE,
            Arc::new(move |payload: Value| {
                let Some(reply) = executor.handle_payload(payload) else {
                    return;
                };
                let Some(channel) = weak.upgrade() else {
                    return;
                };
                match serde_json::to_value(&reply) {
                    Ok(encoded) => {
                        let receipt = channel.push(EXECJS_MESSAGE, encoded);
                        if let Some(err) = receipt.refused() {
                            warn!(
                                sender = %reply.sender_id,
                                error = %err,
                                "remote_exec: reply not sent"
                            );
                        }
                    }
                    Err(err) => warn!(error = %err, "remote_exec: could not encode reply"),
                }
            }),
        );
    }
}

#[cfg(test)]
#[path = "tests/remote_exec_tests.rs"]
mod tests;
