//! Canonical document paths for session data.
//!
//! Other clients of the same store rely on this layout, so the shape of
//! every path built here is a compatibility contract.

use crate::model::CardKind;

/// Root collection holding every session document.
pub const SESSIONS_ROOT: &str = "sessions";

/// Path of a full session document.
pub fn session(session_id: &str) -> String {
    format!("{SESSIONS_ROOT}/{session_id}")
}

/// Path of the session owner field.
pub fn owner(session_id: &str) -> String {
    format!("{SESSIONS_ROOT}/{session_id}/owner")
}

/// Path of the session phase field.
pub fn phase(session_id: &str) -> String {
    format!("{SESSIONS_ROOT}/{session_id}/phase")
}

/// Path of the membership map (display names keyed by participant id).
pub fn users(session_id: &str) -> String {
    format!("{SESSIONS_ROOT}/{session_id}/users")
}

/// Path of one participant's display name entry.
pub fn user(session_id: &str, participant_id: &str) -> String {
    format!("{SESSIONS_ROOT}/{session_id}/users/{participant_id}")
}

/// Path of the shared timer state.
pub fn timer(session_id: &str) -> String {
    format!("{SESSIONS_ROOT}/{session_id}/timer")
}

/// Path of one card column.
pub fn cards(session_id: &str, kind: CardKind) -> String {
    format!("{SESSIONS_ROOT}/{session_id}/{kind}", kind = kind.as_str())
}

/// Path of a single card.
pub fn card(session_id: &str, kind: CardKind, key: &str) -> String {
    format!("{SESSIONS_ROOT}/{session_id}/{kind}/{key}", kind = kind.as_str())
}
