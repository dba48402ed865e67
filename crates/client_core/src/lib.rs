//! The client half of the bridge: keeps one channel joined for the page,
//! forwards tagged UI events to the controller and answers its script
//! requests against the page.

mod context;
pub mod dispatch;
pub mod gate;
pub mod identity;
pub mod interpreter;
pub mod remote_exec;
pub mod session;

pub use context::SessionContext;
pub use dispatch::{BindReport, DispatchError, EventBinder};
pub use interpreter::{CommandInterpreter, ExpressionInterpreter};
pub use remote_exec::RemoteExecutor;
pub use session::{RetryPolicy, Session, SessionConfig, SessionError, SessionEvent};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
