use std::sync::{Arc, PoisonError, RwLock};

/// The receiver identity shared between the host and the responders.
///
/// Cloning gives another handle to the same value. Every [ReceiverIdentity::set]
/// replaces the whole snapshot, so a reader either sees the old string or the
/// new one, never a mix. Responders read it once per query.
#[derive(Clone, Debug, Default)]
pub struct ReceiverIdentity {
    current: Arc<RwLock<Option<Arc<str>>>>,
}

impl ReceiverIdentity {
    /// Creates an identity that is not set yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the identity. An empty string clears it.
    pub fn set(&self, id: &str) {
        let snapshot = if id.is_empty() {
            None
        } else {
            Some(Arc::from(id))
        };
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Clears the identity.
    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Returns the current snapshot, if set.
    pub fn get(&self) -> Option<Arc<str>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
