use std::sync::Arc;

use dom::Document;
use shared::{
    domain::SessionId,
    protocol::{topic_for_path, JoinParams},
};

/// Everything the bridge components share for one page session. Built once
/// by [`crate::Session::new`] and handed to every component explicitly.
pub struct SessionContext {
    session_id: SessionId,
    path: String,
    return_mode: String,
    document: Arc<dyn Document>,
}

impl SessionContext {
    pub fn new(
        path: impl Into<String>,
        return_mode: impl Into<String>,
        document: Arc<dyn Document>,
    ) -> Self {
        Self {
            session_id: SessionId::generate(),
            path: path.into(),
            return_mode: return_mode.into(),
            document,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn return_mode(&self) -> &str {
        &self.return_mode
    }

    pub fn document(&self) -> &dyn Document {
        self.document.as_ref()
    }

    pub fn topic(&self) -> String {
        topic_for_path(&self.path)
    }

    pub fn join_params(&self) -> JoinParams {
        JoinParams {
            path: self.path.clone(),
            return_mode: self.return_mode.clone(),
        }
    }
}
