use std::collections::HashMap;
use std::sync::Mutex;

/// Process-wide map from client placeholder conversation ids to the real
/// numeric ids the upstream assigns once a conversation exists.
///
/// The mapping is ephemeral: a lookup miss after a restart is a normal
/// outcome and callers treat it as "not yet known". A placeholder binds to
/// the first real id observed for it; later observations are no-ops, since
/// a conversation keeps one stable id for its whole lifetime.
#[derive(Debug, Default)]
pub struct ConversationRegistry {
    inner: Mutex<HashMap<String, i64>>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `placeholder -> real_id`. Returns true if this call created
    /// the binding, false if the placeholder was already bound.
    pub fn observe(&self, placeholder: &str, real_id: i64) -> bool {
        let mut map = match self.inner.lock() {
            Ok(m) => m,
            Err(poisoned) => poisoned.into_inner(),
        };
        if map.contains_key(placeholder) {
            tracing::debug!(
                "placeholder {} already bound, ignoring real id {}",
                placeholder,
                real_id
            );
            return false;
        }
        tracing::info!("bound placeholder {} to conversation {}", placeholder, real_id);
        map.insert(placeholder.to_string(), real_id);
        true
    }

    pub fn resolve(&self, placeholder: &str) -> Option<i64> {
        let map = match self.inner.lock() {
            Ok(m) => m,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(placeholder).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_misses_until_observed() {
        let registry = ConversationRegistry::new();
        assert_eq!(registry.resolve("tmp-123"), None);
        assert!(registry.observe("tmp-123", 555));
        assert_eq!(registry.resolve("tmp-123"), Some(555));
    }

    #[test]
    fn first_observation_wins() {
        let registry = ConversationRegistry::new();
        assert!(registry.observe("tmp-123", 555));
        assert!(!registry.observe("tmp-123", 777));
        assert_eq!(registry.resolve("tmp-123"), Some(555));
    }

    #[test]
    fn placeholders_are_independent() {
        let registry = ConversationRegistry::new();
        registry.observe("a", 1);
        registry.observe("b", 2);
        assert_eq!(registry.resolve("a"), Some(1));
        assert_eq!(registry.resolve("b"), Some(2));
    }
}
