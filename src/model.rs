//! Domain types shared by the board engine, the store layer, and the gateway.
//!
//! The serde representations here define the wire document layout, so field
//! names and optionality must stay stable for interoperability with other
//! clients of the same store.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Maximum length accepted for a participant display name.
pub const MAX_NAME_LEN: usize = 30;
/// Maximum length accepted for card content, after trimming.
pub const MAX_CARD_CONTENT_LEN: usize = 200;
/// Number of votes each participant may cast per session.
pub const MAX_VOTES_PER_PARTICIPANT: u8 = 3;
/// Prefix applied to generated session identifiers.
pub const SESSION_ID_PREFIX: &str = "retro-";

/// Phase of a retrospective session, controlling which operations are allowed.
///
/// The owner may set any phase at any time; the enum order reflects the
/// intended progression but no transition graph is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Participants write their own cards; peers' cards are hidden.
    Reflection,
    /// The owner clusters related cards into groups.
    Grouping,
    /// Participants spend their vote budget on cards and groups.
    Vote,
    /// The owner records action items; other boards are frozen.
    Action,
}

impl Phase {
    /// All phases in their intended progression order.
    pub const ALL: [Phase; 4] = [Phase::Reflection, Phase::Grouping, Phase::Vote, Phase::Action];

    /// Stable lowercase name used in the stored document.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Reflection => "reflection",
            Phase::Grouping => "grouping",
            Phase::Vote => "vote",
            Phase::Action => "action",
        }
    }

    /// Parse a stored phase name, returning `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        Phase::ALL.into_iter().find(|phase| phase.as_str() == value)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Board column a card belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    /// Something that went well.
    Positive,
    /// Something that should improve.
    Negative,
    /// Follow-up action item, owner-managed and never voted on.
    Action,
}

impl CardKind {
    /// Every card kind, in board order.
    pub const ALL: [CardKind; 3] = [CardKind::Positive, CardKind::Negative, CardKind::Action];

    /// Stable lowercase name used as the document path segment.
    pub fn as_str(self) -> &'static str {
        match self {
            CardKind::Positive => "positive",
            CardKind::Negative => "negative",
            CardKind::Action => "action",
        }
    }

    /// Parse a path segment, returning `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        CardKind::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Whether cards of this kind carry a vote counter.
    pub fn carries_votes(self) -> bool {
        !matches!(self, CardKind::Action)
    }
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single submitted card as stored under `sessions/{id}/{kind}/{key}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Trimmed card text.
    pub content: String,
    /// Display name of the participant who wrote the card.
    pub author: String,
    /// Creation time in epoch milliseconds.
    pub timestamp: u64,
    /// Vote counter; absent for action cards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<u32>,
    /// Group the card belongs to, when clustered during grouping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl Card {
    /// Vote count treating absent counters as zero.
    pub fn vote_count(&self) -> u32 {
        self.votes.unwrap_or(0)
    }
}

/// A card paired with its store key.
///
/// Keys are lexicographically time-ordered, so key order doubles as
/// creation order when breaking ranking ties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CardRow {
    /// Store key the card lives under.
    pub key: String,
    /// The card payload itself.
    #[serde(flatten)]
    pub card: Card,
}

/// Session member as exposed to participant list watchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Participant {
    /// Durable participant identifier.
    pub id: String,
    /// Display name chosen when joining the session.
    pub name: String,
}

/// Shared countdown state under `sessions/{id}/timer`.
///
/// Written only by the session owner; followers derive a read-only
/// projection compensated for propagation delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    /// Seconds left on the countdown.
    pub time_remaining: u32,
    /// Whether the owner's countdown loop is ticking.
    pub is_running: bool,
    /// Epoch milliseconds of the owner's last write.
    pub last_update: u64,
}

/// Full session document as stored under `sessions/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    /// Participant id of the session creator; fixed for the session lifetime.
    #[serde(default)]
    pub owner: String,
    /// Current phase; missing in documents written by older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// Display names keyed by participant id.
    #[serde(default)]
    pub users: BTreeMap<String, String>,
    /// Shared countdown state.
    #[serde(default)]
    pub timer: TimerState,
    /// Positive cards keyed by push key.
    #[serde(default)]
    pub positive: BTreeMap<String, Card>,
    /// Negative cards keyed by push key.
    #[serde(default)]
    pub negative: BTreeMap<String, Card>,
    /// Action items keyed by push key.
    #[serde(default)]
    pub action: BTreeMap<String, Card>,
}

impl SessionDocument {
    /// Initial document written when a session is created.
    pub fn initial(owner_id: &str, owner_name: &str) -> Self {
        let mut users = BTreeMap::new();
        users.insert(owner_id.to_string(), owner_name.to_string());
        Self {
            owner: owner_id.to_string(),
            phase: Some(Phase::Reflection),
            users,
            timer: TimerState::default(),
            positive: BTreeMap::new(),
            negative: BTreeMap::new(),
            action: BTreeMap::new(),
        }
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names_round_trip() {
        for phase in Phase::ALL {
            assert_eq!(Phase::parse(phase.as_str()), Some(phase));
        }
        assert_eq!(Phase::parse("unknown"), None);
    }

    #[test]
    fn action_cards_serialize_without_votes() {
        let card = Card {
            content: "schedule the follow-up".into(),
            author: "Alice".into(),
            timestamp: 1_700_000_000_000,
            votes: None,
            group_id: None,
        };
        let json = serde_json::to_value(&card).expect("serialize card");
        assert!(json.get("votes").is_none());
        assert!(json.get("groupId").is_none());
    }

    #[test]
    fn voteable_cards_serialize_counter_and_group() {
        let card = Card {
            content: "retro went long".into(),
            author: "Bob".into(),
            timestamp: 1_700_000_000_000,
            votes: Some(2),
            group_id: Some("group-1".into()),
        };
        let json = serde_json::to_value(&card).expect("serialize card");
        assert_eq!(json["votes"], 2);
        assert_eq!(json["groupId"], "group-1");
    }

    #[test]
    fn initial_document_registers_the_owner() {
        let doc = SessionDocument::initial("participant-abc", "Alice");
        assert_eq!(doc.owner, "participant-abc");
        assert_eq!(doc.phase, Some(Phase::Reflection));
        assert_eq!(doc.users.get("participant-abc").map(String::as_str), Some("Alice"));
        assert!(!doc.timer.is_running);
        assert!(doc.positive.is_empty() && doc.negative.is_empty() && doc.action.is_empty());
    }
}
