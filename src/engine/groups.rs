//! Card clustering and ranked board aggregation.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::model::{Card, CardKind, CardRow};
use crate::store::{BoardStore, FieldMap, StoreError, paths};

use super::context::SessionContext;
use super::gate::{self, Role};

/// Prefix applied to generated group identifiers.
const GROUP_ID_PREFIX: &str = "group-";

/// A ranked board entry: either a standalone card or an aggregated group.
///
/// Groups and standalone cards compete in the same ranking, ordered by
/// descending vote count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardItem {
    /// A card that belongs to no group.
    Card(CardRow),
    /// A cluster of cards sharing one group identifier.
    Group {
        /// The shared group identifier.
        id: String,
        /// Sum of the member vote counts.
        votes: u32,
        /// Earliest member timestamp.
        timestamp: u64,
        /// Members in creation order.
        cards: Vec<CardRow>,
    },
}

impl BoardItem {
    /// Vote count used for ranking.
    pub fn votes(&self) -> u32 {
        match self {
            BoardItem::Card(row) => row.card.vote_count(),
            BoardItem::Group { votes, .. } => *votes,
        }
    }

    /// Timestamp used to break ranking ties (earliest first).
    pub fn timestamp(&self) -> u64 {
        match self {
            BoardItem::Card(row) => row.card.timestamp,
            BoardItem::Group { timestamp, .. } => *timestamp,
        }
    }

    /// Whether the entry aggregates several cards.
    pub fn is_group(&self) -> bool {
        matches!(self, BoardItem::Group { .. })
    }
}

/// Group management for one participant's session.
///
/// Every mutation is owner-only and restricted to the grouping phase; the
/// aggregation itself ([`organize_into_groups`]) is a pure function usable
/// by any viewer.
#[derive(Clone)]
pub struct GroupingEngine {
    store: Arc<dyn BoardStore>,
    ctx: SessionContext,
}

impl GroupingEngine {
    /// Build a grouping engine sharing the participant's session context.
    pub fn new(store: Arc<dyn BoardStore>, ctx: SessionContext) -> Self {
        Self { store, ctx }
    }

    /// Cluster the dragged card with the target card.
    ///
    /// When the target already belongs to a group the dragged card joins
    /// it; otherwise a fresh group identifier is minted and assigned to
    /// both cards in one batched update. Returns the resulting group id.
    pub async fn group_cards(
        &self,
        kind: CardKind,
        dragged_key: &str,
        target_key: &str,
    ) -> EngineResult<String> {
        let session_id = self.authorize(kind)?;
        if dragged_key == target_key {
            return Err(EngineError::Validation(
                "a card cannot be grouped with itself".into(),
            ));
        }

        let target_path = paths::card(&session_id, kind, target_key);
        let raw = self.store.read_once(&target_path).await?;
        if raw.is_null() {
            return Err(EngineError::NotFound(format!(
                "card `{target_key}` not found"
            )));
        }
        let target: Card = serde_json::from_value(raw)
            .map_err(|source| StoreError::malformed(target_path, source))?;

        let mut fields = FieldMap::new();
        let group_id = match target.group_id {
            Some(existing) => existing,
            None => {
                let fresh = format!("{GROUP_ID_PREFIX}{}", Uuid::new_v4().simple());
                fields.insert(
                    format!("{target_key}/groupId"),
                    Value::from(fresh.clone()),
                );
                fresh
            }
        };
        fields.insert(
            format!("{dragged_key}/groupId"),
            Value::from(group_id.clone()),
        );
        self.store
            .update(&paths::cards(&session_id, kind), fields)
            .await?;

        Ok(group_id)
    }

    /// Detach one card from its group.
    pub async fn ungroup_card(&self, kind: CardKind, key: &str) -> EngineResult<()> {
        let session_id = self.authorize(kind)?;
        let mut fields = FieldMap::new();
        fields.insert("groupId".into(), Value::Null);
        self.store
            .update(&paths::card(&session_id, kind, key), fields)
            .await?;
        Ok(())
    }

    /// Dissolve a whole group with a single batched update.
    pub async fn ungroup_all(&self, kind: CardKind, group_id: &str) -> EngineResult<()> {
        let session_id = self.authorize(kind)?;
        let column_path = paths::cards(&session_id, kind);
        let raw = self.store.read_once(&column_path).await?;
        let Value::Object(entries) = raw else {
            return Ok(());
        };

        let mut fields = FieldMap::new();
        for (key, value) in entries {
            let in_group = value
                .get("groupId")
                .and_then(Value::as_str)
                .is_some_and(|id| id == group_id);
            if in_group {
                fields.insert(format!("{key}/groupId"), Value::Null);
            }
        }
        if fields.is_empty() {
            return Ok(());
        }
        self.store.update(&column_path, fields).await?;
        Ok(())
    }

    fn authorize(&self, kind: CardKind) -> EngineResult<String> {
        let session_id = self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        gate::group_mutate(self.ctx.phase(), Role::of(self.ctx.is_owner()), kind).into_result()?;
        Ok(session_id)
    }
}

/// Partition a card list into standalone cards and aggregated groups.
///
/// Group votes are the sum of member votes, the group timestamp is the
/// earliest member timestamp, and members are listed in creation order.
/// The unified result is ranked by descending votes, earliest-first on
/// ties.
pub fn organize_into_groups(rows: &[CardRow]) -> Vec<BoardItem> {
    let mut groups: IndexMap<String, Vec<CardRow>> = IndexMap::new();
    let mut items = Vec::new();

    for row in rows {
        match &row.card.group_id {
            Some(group_id) => groups.entry(group_id.clone()).or_default().push(row.clone()),
            None => items.push(BoardItem::Card(row.clone())),
        }
    }

    for (id, mut cards) in groups {
        cards.sort_by(|a, b| {
            a.card
                .timestamp
                .cmp(&b.card.timestamp)
                .then_with(|| a.key.cmp(&b.key))
        });
        let votes = cards.iter().map(|row| row.card.vote_count()).sum();
        let timestamp = cards
            .iter()
            .map(|row| row.card.timestamp)
            .min()
            .unwrap_or_default();
        items.push(BoardItem::Group {
            id,
            votes,
            timestamp,
            cards,
        });
    }

    items.sort_by(|a, b| {
        b.votes()
            .cmp(&a.votes())
            .then_with(|| a.timestamp().cmp(&b.timestamp()))
    });
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str, votes: u32, timestamp: u64, group_id: Option<&str>) -> CardRow {
        CardRow {
            key: key.into(),
            card: Card {
                content: format!("card {key}"),
                author: "Alice".into(),
                timestamp,
                votes: Some(votes),
                group_id: group_id.map(Into::into),
            },
        }
    }

    #[test]
    fn groups_aggregate_votes_and_rank_against_standalones() {
        let rows = vec![
            row("00a", 1, 30, Some("g")),
            row("00b", 2, 10, Some("g")),
            row("00c", 5, 20, None),
        ];
        let items = organize_into_groups(&rows);
        assert_eq!(items.len(), 2);

        match &items[0] {
            BoardItem::Card(card) => assert_eq!(card.key, "00c"),
            other => panic!("expected the standalone first, got {other:?}"),
        }
        match &items[1] {
            BoardItem::Group { id, votes, timestamp, cards } => {
                assert_eq!(id, "g");
                assert_eq!(*votes, 3);
                assert_eq!(*timestamp, 10);
                let keys: Vec<&str> = cards.iter().map(|row| row.key.as_str()).collect();
                assert_eq!(keys, ["00b", "00a"], "members are time-ordered");
            }
            other => panic!("expected the group second, got {other:?}"),
        }
    }

    #[test]
    fn ungrouped_lists_stay_standalone() {
        let rows = vec![row("00a", 0, 1, None), row("00b", 0, 2, None)];
        let items = organize_into_groups(&rows);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| !item.is_group()));
    }

    #[test]
    fn empty_input_yields_empty_board() {
        assert!(organize_into_groups(&[]).is_empty());
    }

    #[test]
    fn vote_ties_rank_earliest_first() {
        let rows = vec![row("00b", 2, 200, None), row("00a", 2, 100, None)];
        let items = organize_into_groups(&rows);
        assert_eq!(items[0].timestamp(), 100);
        assert_eq!(items[1].timestamp(), 200);
    }

    mod integration {
        use std::sync::Arc;

        use crate::engine::cards::CardEngine;
        use crate::engine::session::SessionManager;
        use crate::model::Phase;
        use crate::store::memory::MemoryStore;

        use super::*;

        async fn grouping_board() -> (MemoryStore, SessionManager, Vec<CardRow>) {
            let store = MemoryStore::new();
            let owner = SessionManager::new(Arc::new(store.clone()), "participant-owner");
            owner.create_session("Alice").await.unwrap();

            let cards = CardEngine::new(Arc::new(store.clone()), owner.context());
            let mut rows = Vec::new();
            for content in ["first", "second", "third"] {
                rows.push(cards.add_card(CardKind::Positive, content).await.unwrap().unwrap());
            }
            owner.set_phase(Phase::Grouping).await.unwrap();
            (store, owner, rows)
        }

        async fn column_rows(store: &MemoryStore, session_id: &str) -> Vec<CardRow> {
            let raw = store
                .read_once(&paths::cards(session_id, CardKind::Positive))
                .await
                .unwrap();
            let Value::Object(entries) = raw else {
                return Vec::new();
            };
            entries
                .into_iter()
                .map(|(key, value)| CardRow {
                    key,
                    card: serde_json::from_value(value).unwrap(),
                })
                .collect()
        }

        #[tokio::test]
        async fn grouping_joins_existing_groups_and_mints_new_ones() {
            let (store, owner, rows) = grouping_board().await;
            let session_id = owner.session_id().unwrap();
            let engine = GroupingEngine::new(Arc::new(store.clone()), owner.context());

            let group_id = engine
                .group_cards(CardKind::Positive, &rows[1].key, &rows[0].key)
                .await
                .unwrap();
            let joined = engine
                .group_cards(CardKind::Positive, &rows[2].key, &rows[0].key)
                .await
                .unwrap();
            assert_eq!(group_id, joined, "target's existing group is reused");

            let stored = column_rows(&store, &session_id).await;
            assert!(stored.iter().all(|row| row.card.group_id.as_deref() == Some(group_id.as_str())));
        }

        #[tokio::test]
        async fn ungroup_all_leaves_only_standalones() {
            let (store, owner, rows) = grouping_board().await;
            let session_id = owner.session_id().unwrap();
            let engine = GroupingEngine::new(Arc::new(store.clone()), owner.context());

            let group_id = engine
                .group_cards(CardKind::Positive, &rows[1].key, &rows[0].key)
                .await
                .unwrap();
            engine
                .group_cards(CardKind::Positive, &rows[2].key, &rows[0].key)
                .await
                .unwrap();

            engine.ungroup_all(CardKind::Positive, &group_id).await.unwrap();
            let stored = column_rows(&store, &session_id).await;
            assert!(stored.iter().all(|row| row.card.group_id.is_none()));

            let items = organize_into_groups(&stored);
            assert_eq!(items.len(), 3);
            assert!(items.iter().all(|item| !item.is_group()));
        }

        #[tokio::test]
        async fn ungroup_card_detaches_a_single_member() {
            let (store, owner, rows) = grouping_board().await;
            let session_id = owner.session_id().unwrap();
            let engine = GroupingEngine::new(Arc::new(store.clone()), owner.context());

            engine
                .group_cards(CardKind::Positive, &rows[1].key, &rows[0].key)
                .await
                .unwrap();
            engine.ungroup_card(CardKind::Positive, &rows[1].key).await.unwrap();

            let stored = column_rows(&store, &session_id).await;
            let detached = stored.iter().find(|row| row.key == rows[1].key).unwrap();
            assert!(detached.card.group_id.is_none());
            let target = stored.iter().find(|row| row.key == rows[0].key).unwrap();
            assert!(target.card.group_id.is_some(), "only the addressed card changes");
        }

        #[tokio::test]
        async fn grouping_is_fenced_by_phase_role_and_kind() {
            let (store, owner, rows) = grouping_board().await;
            let engine = GroupingEngine::new(Arc::new(store.clone()), owner.context());

            assert!(matches!(
                engine.group_cards(CardKind::Action, "a", "b").await,
                Err(EngineError::Validation(_))
            ));
            assert!(matches!(
                engine
                    .group_cards(CardKind::Positive, &rows[0].key, &rows[0].key)
                    .await,
                Err(EngineError::Validation(_))
            ));
            assert!(matches!(
                engine.group_cards(CardKind::Positive, &rows[0].key, "missing").await,
                Err(EngineError::NotFound(_))
            ));

            let member = SessionManager::new(Arc::new(store.clone()), "participant-member");
            member
                .join_session(&owner.session_id().unwrap(), "Bob")
                .await
                .unwrap();
            let member_engine = GroupingEngine::new(Arc::new(store.clone()), member.context());
            assert!(matches!(
                member_engine
                    .group_cards(CardKind::Positive, &rows[1].key, &rows[0].key)
                    .await,
                Err(EngineError::PermissionDenied(_))
            ));

            owner.set_phase(Phase::Vote).await.unwrap();
            assert!(matches!(
                engine
                    .group_cards(CardKind::Positive, &rows[1].key, &rows[0].key)
                    .await,
                Err(EngineError::PhaseViolation { .. })
            ));
        }
    }
}
