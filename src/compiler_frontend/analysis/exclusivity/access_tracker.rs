//! Per-statement access tracking.
//!
//! Runs for every statement and terminator, so it stays a flat vector indexed
//! by target.

use crate::compiler_frontend::analysis::exclusivity::AccessKind;

#[derive(Debug, Clone)]
pub(crate) struct StatementAccessTracker {
    target_access: Vec<Option<AccessKind>>,
}

impl StatementAccessTracker {
    pub(crate) fn new(target_count: usize) -> Self {
        Self {
            target_access: vec![None; target_count],
        }
    }

    pub(crate) fn conflict(&self, target_index: usize, new_access: AccessKind) -> Option<AccessKind> {
        let existing = (*self.target_access.get(target_index)?)?;

        match (existing, new_access) {
            (AccessKind::Shared, AccessKind::Shared) => None,
            (AccessKind::Shared, AccessKind::Mutable)
            | (AccessKind::Mutable, AccessKind::Shared)
            | (AccessKind::Mutable, AccessKind::Mutable) => Some(existing),
        }
    }

    pub(crate) fn record(&mut self, target_index: usize, access: AccessKind) {
        let Some(entry) = self.target_access.get_mut(target_index) else {
            return;
        };

        match (*entry, access) {
            (Some(AccessKind::Mutable), _) => {}
            (_, AccessKind::Mutable) => *entry = Some(AccessKind::Mutable),
            (None, AccessKind::Shared) => *entry = Some(AccessKind::Shared),
            (Some(AccessKind::Shared), AccessKind::Shared) => {}
        }
    }

    pub(crate) fn clear(&mut self) {
        self.target_access.fill(None);
    }
}
