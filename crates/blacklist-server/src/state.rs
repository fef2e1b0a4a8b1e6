use std::sync::Arc;

use blacklist_core::engine::LifecycleEngine;
use blacklist_core::store::AddressStore;

/// Shared application state passed to all route handlers.
pub struct AppState<S: AddressStore> {
    pub engine: Arc<LifecycleEngine<S>>,
    /// Expected `X-Internal-Token`. `None` rejects every internal request.
    pub internal_token: Option<Arc<str>>,
}

impl<S: AddressStore> AppState<S> {
    pub fn new(engine: Arc<LifecycleEngine<S>>, internal_token: Option<String>) -> Self {
        Self {
            engine,
            internal_token: internal_token
                .filter(|token| !token.is_empty())
                .map(Arc::from),
        }
    }
}

// Manual impl: deriving would require `S: Clone`.
impl<S: AddressStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            internal_token: self.internal_token.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blacklist_core::clock::SystemClock;
    use blacklist_core::config::LifecyclePolicy;
    use blacklist_core::store::MemoryStore;

    fn engine() -> Arc<LifecycleEngine<MemoryStore>> {
        Arc::new(LifecycleEngine::new(
            MemoryStore::new(),
            Arc::new(SystemClock),
            LifecyclePolicy::default(),
        ))
    }

    #[test]
    fn empty_token_is_treated_as_unset() {
        let state = AppState::new(engine(), Some(String::new()));
        assert!(state.internal_token.is_none());
    }

    #[test]
    fn token_is_kept() {
        let state = AppState::new(engine(), Some("s3cret".into()));
        assert_eq!(state.internal_token.as_deref(), Some("s3cret"));
    }
}
