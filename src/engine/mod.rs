//! The board engine: one participant's session, card, grouping, and timer
//! operations over an abstract store.
//!
//! Engines are plain objects around a shared [`SessionContext`], so several
//! participants (or several tests) can run side by side in one process.
//! All permission and phase rules are enforced here, before any write
//! reaches the store.

/// Card submission, voting, and realtime card views.
pub mod cards;
/// Per-participant session context shared across engines.
pub mod context;
/// Centralised authorization gates.
pub mod gate;
/// Group management and ranked aggregation.
pub mod groups;
/// Session lifecycle, membership, and phase control.
pub mod session;
/// Cancellation handles for realtime subscriptions.
pub mod subscription;
/// Owner-authoritative countdown with follower projection.
pub mod timer;

pub use cards::{CardEngine, filter_cards_by_phase};
pub use context::SessionContext;
pub use gate::{Decision, Role};
pub use groups::{BoardItem, GroupingEngine, organize_into_groups};
pub use session::SessionManager;
pub use subscription::WatchHandle;
pub use timer::{TimerCoordinator, TimerEvent, TimerUpdate, project};
