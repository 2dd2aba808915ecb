//! Scope identity → update lock handle registry.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use super::types::UpdateLock;
use crate::{config::Config, scope::ScopeIdentity};

/// One [`UpdateLock`] handle per scope identity for the owning context.
///
/// Handles are created on first lookup and shared afterwards, so every
/// caller in the process observes the same local hold state.
#[derive(Debug)]
pub struct LockRegistry {
    config: Config,
    handles: Mutex<HashMap<ScopeIdentity, Arc<UpdateLock>>>,
}

impl LockRegistry {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Handle for `scope`, created on first use.
    pub fn lock_for(&self, scope: &ScopeIdentity) -> Arc<UpdateLock> {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(handles.entry(scope.clone()).or_insert_with(|| {
            tracing::debug!(%scope, "Registering update lock handle");
            Arc::new(UpdateLock::new(
                scope.clone(),
                self.config.paths_for(scope).lock_file,
            ))
        }))
    }

    /// Number of scopes with a registered handle
    pub fn len(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
