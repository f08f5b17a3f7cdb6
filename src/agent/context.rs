use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::retrieval::Retriever;
use crate::session::SessionRegistry;

/// Everything a run hands to its agents and tools, passed explicitly.
#[derive(Clone)]
pub struct RunContext {
    pub session_token: Option<String>,
    pub sessions: SessionRegistry,
    pub work_dir: PathBuf,
    pub venv_path: Option<PathBuf>,
    pub retriever: Arc<dyn Retriever>,
    pub tool_timeout: Duration,
}

impl RunContext {
    /// Runs without a token cannot be cancelled and are always live.
    pub fn is_live(&self) -> bool {
        self.session_token
            .as_deref()
            .map_or(true, |token| self.sessions.is_live(token))
    }

    pub fn release(&self) {
        if let Some(token) = self.session_token.as_deref() {
            self.sessions.remove(token);
        }
    }
}
