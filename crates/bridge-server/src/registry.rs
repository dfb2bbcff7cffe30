//! Live session registry.

use std::sync::Arc;

use bridge_core::SessionId;
use dashmap::DashSet;

/// Ids of the sessions currently running.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashSet<SessionId>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session; it is removed when the guard drops.
    pub fn register(self: &Arc<Self>, id: SessionId) -> SessionGuard {
        let _ = self.sessions.insert(id.clone());
        SessionGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Number of running sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is running.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Removes its session from the registry on drop.
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl SessionGuard {
    /// The registered id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let _ = self.registry.sessions.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_removes_on_drop() {
        let registry = Arc::new(SessionRegistry::new());
        let a = registry.register(SessionId::new());
        let b = registry.register(SessionId::new());
        assert_eq!(registry.len(), 2);
        assert_ne!(a.id(), b.id());

        drop(a);
        assert_eq!(registry.len(), 1);

        drop(b);
        assert!(registry.is_empty());
    }
}
