//! Session lifecycle, membership, phase control, and realtime watchers.

use std::sync::{Arc, Mutex};

use rand::Rng;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::export::ExportDocument;
use crate::model::{
    MAX_NAME_LEN, Participant, Phase, SESSION_ID_PREFIX, SessionDocument, TimerState, now_millis,
};
use crate::store::{BoardStore, StoreError, paths};

use super::context::SessionContext;
use super::gate::{self, Role};
use super::subscription::{WatchHandle, spawn_watch};
use super::timer::{TimerCoordinator, TimerEvent};

/// Alphabet used for generated session identifiers.
const SESSION_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
/// Length of the random part of a session identifier.
const SESSION_ID_LEN: usize = 7;

/// One participant's handle onto a retrospective session.
///
/// Owns the session context shared with the card and grouping engines,
/// tracks every realtime subscription for collective release, and wires
/// the owner's timer ticks into the shared document.
pub struct SessionManager {
    store: Arc<dyn BoardStore>,
    ctx: SessionContext,
    subscriptions: Mutex<Vec<WatchHandle>>,
    timer: TimerCoordinator,
}

impl SessionManager {
    /// Build a manager for the given durable participant identity.
    pub fn new(store: Arc<dyn BoardStore>, participant_id: impl Into<String>) -> Self {
        let ctx = SessionContext::new(participant_id);
        let timer = TimerCoordinator::new(mirror_timer(store.clone(), ctx.clone()));
        Self {
            store,
            ctx,
            subscriptions: Mutex::new(Vec::new()),
            timer,
        }
    }

    /// Clone of the session context, for wiring up the other engines.
    pub fn context(&self) -> SessionContext {
        self.ctx.clone()
    }

    /// The local timer coordinator.
    pub fn timer(&self) -> &TimerCoordinator {
        &self.timer
    }

    /// Identifier of the active session, when one is joined.
    pub fn session_id(&self) -> Option<String> {
        self.ctx.session_id()
    }

    /// Durable identity of this participant.
    pub fn participant_id(&self) -> String {
        self.ctx.participant_id()
    }

    /// Display name used in the active session.
    pub fn display_name(&self) -> Option<String> {
        self.ctx.display_name()
    }

    /// Whether this participant owns the active session.
    pub fn is_owner(&self) -> bool {
        self.ctx.is_owner()
    }

    /// Locally cached phase of the active session.
    pub fn phase(&self) -> Phase {
        self.ctx.phase()
    }

    /// Votes already spent in the active session.
    pub fn votes_used(&self) -> u8 {
        self.ctx.votes_used()
    }

    /// Votes still available in the active session.
    pub fn votes_remaining(&self) -> u8 {
        self.ctx.votes_remaining()
    }

    /// Create a fresh session owned by this participant.
    ///
    /// Writes the initial document (reflection phase, creator as the only
    /// member, zeroed timer, empty boards) and binds the context to it.
    pub async fn create_session(&self, display_name: &str) -> EngineResult<String> {
        let name = validate_display_name(display_name)?;
        let session_id = generate_session_id();

        let document = SessionDocument::initial(&self.ctx.participant_id(), &name);
        let path = paths::session(&session_id);
        let payload = serde_json::to_value(&document)
            .map_err(|source| StoreError::malformed(path.clone(), source))?;
        self.store.write(&path, payload).await?;

        self.ctx
            .enter_session(session_id.clone(), name, true, Phase::Reflection);
        info!(session = %session_id, "created session");
        Ok(session_id)
    }

    /// Join an existing session under the given display name.
    ///
    /// Reads the document once: absent sessions are rejected, ownership is
    /// derived by comparing the stored owner with this identity, and a name
    /// already bound to a different identity is a conflict. Two
    /// simultaneous joiners with the same name can both pass the check
    /// before either write lands; that race is accepted.
    pub async fn join_session(&self, session_id: &str, display_name: &str) -> EngineResult<String> {
        let name = validate_display_name(display_name)?;
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(EngineError::Validation(
                "session id must not be empty".into(),
            ));
        }

        let path = paths::session(session_id);
        let raw = self.store.read_once(&path).await?;
        if raw.is_null() {
            return Err(EngineError::NotFound(format!(
                "session `{session_id}` not found"
            )));
        }
        let document: SessionDocument =
            serde_json::from_value(raw).map_err(|source| StoreError::malformed(path, source))?;

        let me = self.ctx.participant_id();
        let taken_by_other = document
            .users
            .iter()
            .any(|(id, existing)| existing == &name && id != &me);
        if taken_by_other {
            return Err(EngineError::NameConflict(name));
        }

        self.store
            .write(&paths::user(session_id, &me), Value::from(name.clone()))
            .await?;

        let is_owner = document.owner == me;
        let phase = document.phase.unwrap_or(Phase::Reflection);
        self.ctx
            .enter_session(session_id.to_string(), name, is_owner, phase);
        info!(session = %session_id, owner = is_owner, "joined session");
        Ok(session_id.to_string())
    }

    /// Move the session to a new phase. Owner only.
    pub async fn set_phase(&self, phase: Phase) -> EngineResult<()> {
        let session_id = self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        gate::phase_change(Role::of(self.ctx.is_owner())).into_result()?;

        self.store
            .write(&paths::phase(&session_id), Value::from(phase.as_str()))
            .await?;
        self.ctx.set_phase(phase);
        info!(session = %session_id, %phase, "phase changed");
        Ok(())
    }

    /// Wipe the session data after an interactive confirmation. Owner only.
    ///
    /// Cards and the timer are reset; membership and ownership survive so
    /// connected participants keep their seats. Returns `false` when the
    /// confirmation is declined.
    pub async fn clear_session(&self, confirm: impl FnOnce(&str) -> bool) -> EngineResult<bool> {
        let session_id = self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        gate::session_clear(Role::of(self.ctx.is_owner())).into_result()?;

        if !confirm("Clear all data for this session?") {
            return Ok(false);
        }

        let path = paths::session(&session_id);
        let raw = self.store.read_once(&path).await?;
        let current: SessionDocument = serde_json::from_value(raw)
            .map_err(|source| StoreError::malformed(path.clone(), source))?;

        let cleared = SessionDocument {
            owner: current.owner,
            phase: Some(Phase::Reflection),
            users: current.users,
            timer: TimerState::default(),
            ..SessionDocument::default()
        };
        let payload = serde_json::to_value(&cleared)
            .map_err(|source| StoreError::malformed(path.clone(), source))?;
        self.store.write(&path, payload).await?;

        self.timer.halt();
        self.ctx.set_phase(Phase::Reflection);
        info!(session = %session_id, "session cleared");
        Ok(true)
    }

    /// Snapshot the whole session for download.
    pub async fn export_session(&self) -> EngineResult<ExportDocument> {
        let session_id = self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        let raw = self.store.read_once(&paths::session(&session_id)).await?;
        Ok(ExportDocument::new(session_id, raw))
    }

    /// Watch the membership list, receiving the initial roster and every
    /// change.
    pub async fn watch_participants(
        &self,
        mut on_change: impl FnMut(Vec<Participant>) + Send + 'static,
    ) -> EngineResult<WatchHandle> {
        let session_id = self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        let receiver = self.store.subscribe(&paths::users(&session_id)).await?;
        let handle = spawn_watch(receiver, move |value| {
            on_change(decode_participants(value));
        });
        self.track(handle.clone());
        Ok(handle)
    }

    /// Watch the session phase. The local cache is refreshed before the
    /// callback runs, so gates observe the new phase immediately.
    pub async fn watch_phase(
        &self,
        mut on_change: impl FnMut(Phase) + Send + 'static,
    ) -> EngineResult<WatchHandle> {
        let session_id = self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        let receiver = self.store.subscribe(&paths::phase(&session_id)).await?;
        let ctx = self.ctx.clone();
        let handle = spawn_watch(receiver, move |value| {
            let Some(phase) = value.as_str().and_then(Phase::parse) else {
                if !value.is_null() {
                    warn!(?value, "ignoring unknown phase value");
                }
                return;
            };
            ctx.set_phase(phase);
            on_change(phase);
        });
        self.track(handle.clone());
        Ok(handle)
    }

    /// Watch the shared timer state as written by the owner.
    pub async fn watch_timer(
        &self,
        mut on_change: impl FnMut(TimerState) + Send + 'static,
    ) -> EngineResult<WatchHandle> {
        let session_id = self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        let receiver = self.store.subscribe(&paths::timer(&session_id)).await?;
        let handle = spawn_watch(receiver, move |value| {
            if value.is_null() {
                on_change(TimerState::default());
                return;
            }
            match serde_json::from_value::<TimerState>(value) {
                Ok(state) => on_change(state),
                Err(error) => warn!(%error, "ignoring malformed timer state"),
            }
        });
        self.track(handle.clone());
        Ok(handle)
    }

    /// Start the shared countdown. Owner only.
    pub fn start_timer(&self, minutes: u32) -> EngineResult<()> {
        self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        gate::timer_control(Role::of(self.ctx.is_owner())).into_result()?;
        self.timer.start(minutes);
        Ok(())
    }

    /// Pause the shared countdown. Owner only.
    pub fn pause_timer(&self) -> EngineResult<bool> {
        self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        gate::timer_control(Role::of(self.ctx.is_owner())).into_result()?;
        Ok(self.timer.pause())
    }

    /// Stop and reset the shared countdown. Owner only.
    pub fn stop_timer(&self) -> EngineResult<()> {
        self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        gate::timer_control(Role::of(self.ctx.is_owner())).into_result()?;
        self.timer.stop();
        Ok(())
    }

    /// Release every subscription, halt the timer, and drop session-bound
    /// state. Safe to call repeatedly.
    pub fn cleanup(&self) {
        let handles: Vec<WatchHandle> = {
            let mut guard = self
                .subscriptions
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.drain(..).collect()
        };
        for handle in handles {
            handle.cancel();
        }
        self.timer.halt();
        self.ctx.reset();
    }

    fn track(&self, handle: WatchHandle) {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handle);
    }
}

/// Timer mirror: owner-authoritative ticks are written to the shared
/// document; expiry is logged once per countdown.
fn mirror_timer(
    store: Arc<dyn BoardStore>,
    ctx: SessionContext,
) -> impl Fn(TimerEvent) + Send + Sync + 'static {
    move |event| match event {
        TimerEvent::Update(update) => {
            let Some(session_id) = ctx.session_id() else {
                return;
            };
            let payload = json!({
                "timeRemaining": update.remaining_secs,
                "isRunning": update.running,
                "lastUpdate": now_millis(),
            });
            let store = store.clone();
            tokio::spawn(async move {
                if let Err(error) = store.write(&paths::timer(&session_id), payload).await {
                    warn!(%error, session = %session_id, "failed to mirror timer state");
                }
            });
        }
        TimerEvent::Expired => info!("retrospective timer finished"),
    }
}

/// Trim and bound a display name.
fn validate_display_name(name: &str) -> EngineResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(
            "display name must not be empty".into(),
        ));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::Validation(format!(
            "display name must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Generate a fresh session identifier.
fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SESSION_ID_LEN)
        .map(|_| SESSION_ID_ALPHABET[rng.random_range(0..SESSION_ID_ALPHABET.len())] as char)
        .collect();
    format!("{SESSION_ID_PREFIX}{suffix}")
}

/// Decode the membership map into a participant list (id order).
fn decode_participants(value: Value) -> Vec<Participant> {
    let Value::Object(entries) = value else {
        return Vec::new();
    };
    entries
        .into_iter()
        .filter_map(|(id, name)| {
            name.as_str().map(|name| Participant {
                id,
                name: name.to_string(),
            })
        })
        .collect()
}
