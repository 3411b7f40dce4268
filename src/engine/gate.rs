//! Centralised authorization for board operations.
//!
//! Every engine operation funnels its phase and role checks through one
//! gate function per entity type, so the permission rules live (and are
//! tested) in exactly one place instead of being repeated inline.

use crate::error::{EngineError, EngineResult};
use crate::model::{CardKind, MAX_VOTES_PER_PARTICIPANT, Phase};

/// Role of the acting participant within the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The participant who created the session.
    Owner,
    /// Any other session member.
    Member,
}

impl Role {
    /// Derive the role from the context ownership flag.
    pub fn of(is_owner: bool) -> Self {
        if is_owner { Role::Owner } else { Role::Member }
    }
}

/// Outcome of an authorization check.
#[derive(Debug)]
pub enum Decision {
    /// The operation may proceed.
    Allowed,
    /// The operation is rejected with the given reason.
    Denied(EngineError),
}

impl Decision {
    /// Convert the decision into a result consumable with `?`.
    pub fn into_result(self) -> EngineResult<()> {
        match self {
            Decision::Allowed => Ok(()),
            Decision::Denied(reason) => Err(reason),
        }
    }

    /// Whether the operation was allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

fn denied(reason: EngineError) -> Decision {
    Decision::Denied(reason)
}

/// Gate for creating a card of the given kind.
///
/// Positive and negative cards may only be written during reflection;
/// action items only during the action phase, and only by the owner.
pub fn card_create(phase: Phase, role: Role, kind: CardKind) -> Decision {
    match kind {
        CardKind::Action => {
            if phase != Phase::Action {
                return denied(EngineError::PhaseViolation {
                    phase,
                    message: "action items can only be added during the action phase".into(),
                });
            }
            if role != Role::Owner {
                return denied(EngineError::PermissionDenied(
                    "only the session owner can add action items".into(),
                ));
            }
        }
        CardKind::Positive | CardKind::Negative => {
            if phase != Phase::Reflection {
                return denied(EngineError::PhaseViolation {
                    phase,
                    message: "cards can only be added during the reflection phase".into(),
                });
            }
        }
    }
    Decision::Allowed
}

/// Gate for deleting a card.
///
/// Non-action cards are frozen once the session reaches the action phase
/// and may otherwise be removed by their author or the owner; action items
/// are owner-only.
pub fn card_delete(phase: Phase, role: Role, kind: CardKind, is_author: bool) -> Decision {
    match kind {
        CardKind::Action => {
            if role != Role::Owner {
                return denied(EngineError::PermissionDenied(
                    "only the session owner can delete action items".into(),
                ));
            }
        }
        CardKind::Positive | CardKind::Negative => {
            if phase == Phase::Action {
                return denied(EngineError::PhaseViolation {
                    phase,
                    message: "cards can no longer be deleted during the action phase".into(),
                });
            }
            if role != Role::Owner && !is_author {
                return denied(EngineError::PermissionDenied(
                    "only the card author or the session owner can delete this card".into(),
                ));
            }
        }
    }
    Decision::Allowed
}

/// Gate for casting a vote on a card.
pub fn card_vote(phase: Phase, kind: CardKind, votes_used: u8) -> Decision {
    if phase != Phase::Vote {
        return denied(EngineError::PhaseViolation {
            phase,
            message: "votes can only be cast during the vote phase".into(),
        });
    }
    if !kind.carries_votes() {
        return denied(EngineError::Validation(
            "action items cannot be voted on".into(),
        ));
    }
    if votes_used >= MAX_VOTES_PER_PARTICIPANT {
        return denied(EngineError::BudgetExceeded);
    }
    Decision::Allowed
}

/// Gate for changing group membership of cards.
pub fn group_mutate(phase: Phase, role: Role, kind: CardKind) -> Decision {
    if !kind.carries_votes() {
        return denied(EngineError::Validation(
            "action items cannot be grouped".into(),
        ));
    }
    if phase != Phase::Grouping {
        return denied(EngineError::PhaseViolation {
            phase,
            message: "groups can only be changed during the grouping phase".into(),
        });
    }
    if role != Role::Owner {
        return denied(EngineError::PermissionDenied(
            "only the session owner can group cards".into(),
        ));
    }
    Decision::Allowed
}

/// Gate for changing the session phase.
pub fn phase_change(role: Role) -> Decision {
    if role != Role::Owner {
        return denied(EngineError::PermissionDenied(
            "only the session owner can change the phase".into(),
        ));
    }
    Decision::Allowed
}

/// Gate for clearing the session data.
pub fn session_clear(role: Role) -> Decision {
    if role != Role::Owner {
        return denied(EngineError::PermissionDenied(
            "only the session owner can clear the session".into(),
        ));
    }
    Decision::Allowed
}

/// Gate for driving the shared timer.
pub fn timer_control(role: Role) -> Decision {
    if role != Role::Owner {
        return denied(EngineError::PermissionDenied(
            "only the session owner can control the timer".into(),
        ));
    }
    Decision::Allowed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflection_cards_are_phase_bound() {
        for phase in Phase::ALL {
            for kind in [CardKind::Positive, CardKind::Negative] {
                let decision = card_create(phase, Role::Member, kind);
                assert_eq!(decision.is_allowed(), phase == Phase::Reflection, "{phase} {kind}");
            }
        }
    }

    #[test]
    fn action_items_require_action_phase_and_owner() {
        for phase in Phase::ALL {
            for role in [Role::Owner, Role::Member] {
                let decision = card_create(phase, role, CardKind::Action);
                let expected = phase == Phase::Action && role == Role::Owner;
                assert_eq!(decision.is_allowed(), expected, "{phase} {role:?}");
            }
        }
    }

    #[test]
    fn action_add_denials_report_the_right_reason() {
        match card_create(Phase::Reflection, Role::Owner, CardKind::Action) {
            Decision::Denied(EngineError::PhaseViolation { .. }) => {}
            other => panic!("expected phase violation, got {other:?}"),
        }
        match card_create(Phase::Action, Role::Member, CardKind::Action) {
            Decision::Denied(EngineError::PermissionDenied(_)) => {}
            other => panic!("expected permission denial, got {other:?}"),
        }
    }

    #[test]
    fn card_deletion_locks_during_action_phase() {
        let decision = card_delete(Phase::Action, Role::Owner, CardKind::Positive, true);
        assert!(matches!(
            decision,
            Decision::Denied(EngineError::PhaseViolation { .. })
        ));
    }

    #[test]
    fn card_deletion_requires_author_or_owner() {
        assert!(card_delete(Phase::Vote, Role::Member, CardKind::Negative, true).is_allowed());
        assert!(card_delete(Phase::Vote, Role::Owner, CardKind::Negative, false).is_allowed());
        assert!(matches!(
            card_delete(Phase::Vote, Role::Member, CardKind::Negative, false),
            Decision::Denied(EngineError::PermissionDenied(_))
        ));
    }

    #[test]
    fn action_item_deletion_is_owner_only_in_any_phase() {
        for phase in Phase::ALL {
            assert!(card_delete(phase, Role::Owner, CardKind::Action, false).is_allowed());
            assert!(matches!(
                card_delete(phase, Role::Member, CardKind::Action, true),
                Decision::Denied(EngineError::PermissionDenied(_))
            ));
        }
    }

    #[test]
    fn voting_is_vote_phase_only() {
        for phase in Phase::ALL {
            let decision = card_vote(phase, CardKind::Positive, 0);
            assert_eq!(decision.is_allowed(), phase == Phase::Vote, "{phase}");
        }
    }

    #[test]
    fn voting_rejects_action_items_and_spent_budgets() {
        assert!(matches!(
            card_vote(Phase::Vote, CardKind::Action, 0),
            Decision::Denied(EngineError::Validation(_))
        ));
        assert!(card_vote(Phase::Vote, CardKind::Negative, MAX_VOTES_PER_PARTICIPANT - 1).is_allowed());
        assert!(matches!(
            card_vote(Phase::Vote, CardKind::Negative, MAX_VOTES_PER_PARTICIPANT),
            Decision::Denied(EngineError::BudgetExceeded)
        ));
    }

    #[test]
    fn grouping_is_owner_only_during_grouping_phase() {
        assert!(group_mutate(Phase::Grouping, Role::Owner, CardKind::Positive).is_allowed());
        assert!(matches!(
            group_mutate(Phase::Grouping, Role::Member, CardKind::Positive),
            Decision::Denied(EngineError::PermissionDenied(_))
        ));
        assert!(matches!(
            group_mutate(Phase::Vote, Role::Owner, CardKind::Positive),
            Decision::Denied(EngineError::PhaseViolation { .. })
        ));
        assert!(matches!(
            group_mutate(Phase::Grouping, Role::Owner, CardKind::Action),
            Decision::Denied(EngineError::Validation(_))
        ));
    }

    #[test]
    fn owner_only_session_controls() {
        assert!(phase_change(Role::Owner).is_allowed());
        assert!(session_clear(Role::Owner).is_allowed());
        assert!(timer_control(Role::Owner).is_allowed());
        for gate in [phase_change, session_clear, timer_control] {
            assert!(matches!(
                gate(Role::Member),
                Decision::Denied(EngineError::PermissionDenied(_))
            ));
        }
    }
}
