//! Per-participant session context shared by the engine components.
//!
//! One context instance represents one participant's view of one session:
//! identity, membership, cached phase, and the local vote budget. Engines
//! clone the handle and read it at operation time, so there is no global
//! mutable state and several participants can coexist in one process.

use std::sync::{Arc, RwLock};

use crate::model::{MAX_VOTES_PER_PARTICIPANT, Phase};

/// Cloneable handle onto one participant's session state.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<RwLock<ContextInner>>,
}

struct ContextInner {
    participant_id: String,
    session_id: Option<String>,
    display_name: Option<String>,
    is_owner: bool,
    phase: Phase,
    votes_used: u8,
}

impl SessionContext {
    /// Create a context for a participant that has not joined a session yet.
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ContextInner {
                participant_id: participant_id.into(),
                session_id: None,
                display_name: None,
                is_owner: false,
                phase: Phase::Reflection,
                votes_used: 0,
            })),
        }
    }

    /// Durable participant identifier.
    pub fn participant_id(&self) -> String {
        self.read().participant_id.clone()
    }

    /// Identifier of the active session, when one is joined.
    pub fn session_id(&self) -> Option<String> {
        self.read().session_id.clone()
    }

    /// Display name chosen for the active session.
    pub fn display_name(&self) -> Option<String> {
        self.read().display_name.clone()
    }

    /// Whether this participant created the active session.
    pub fn is_owner(&self) -> bool {
        self.read().is_owner
    }

    /// Locally cached phase of the active session.
    pub fn phase(&self) -> Phase {
        self.read().phase
    }

    /// Votes already cast in the active session.
    pub fn votes_used(&self) -> u8 {
        self.read().votes_used
    }

    /// Votes still available in the active session.
    pub fn votes_remaining(&self) -> u8 {
        MAX_VOTES_PER_PARTICIPANT.saturating_sub(self.read().votes_used)
    }

    /// Bind the context to a session after a create or join.
    pub(crate) fn enter_session(
        &self,
        session_id: String,
        display_name: String,
        is_owner: bool,
        phase: Phase,
    ) {
        let mut inner = self.write();
        inner.session_id = Some(session_id);
        inner.display_name = Some(display_name);
        inner.is_owner = is_owner;
        inner.phase = phase;
        inner.votes_used = 0;
    }

    /// Refresh the cached phase.
    pub(crate) fn set_phase(&self, phase: Phase) {
        self.write().phase = phase;
    }

    /// Record one spent vote.
    pub(crate) fn record_vote(&self) {
        let mut inner = self.write();
        inner.votes_used = inner.votes_used.saturating_add(1);
    }

    /// Drop all session-bound state, keeping the participant identity.
    pub(crate) fn reset(&self) {
        let mut inner = self.write();
        inner.session_id = None;
        inner.display_name = None;
        inner.is_owner = false;
        inner.phase = Phase::Reflection;
        inner.votes_used = 0;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ContextInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ContextInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
