//! Live session tokens. A streaming run whose token is gone stops at its next poll.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    tokens: Arc<RwLock<HashSet<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: &str) {
        let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        tokens.insert(token.to_string());
        debug!("Session {} registered", token);
    }

    /// Returns whether the token was live. Removing an unknown token is a no-op.
    pub fn remove(&self, token: &str) -> bool {
        let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        let removed = tokens.remove(token);
        if removed {
            debug!("Session {} removed", token);
        }
        removed
    }

    pub fn is_live(&self, token: &str) -> bool {
        self.tokens
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.register("t");
        let shared = registry.clone();
        assert!(shared.is_live("t"));

        assert!(registry.remove("t"));
        assert!(!registry.remove("t"));
        assert!(!shared.is_live("t"));
        assert!(registry.is_empty());
    }
}
