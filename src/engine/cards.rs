//! Card submission, deletion, voting, and realtime card views.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::model::{Card, CardKind, CardRow, MAX_CARD_CONTENT_LEN, Phase, now_millis};
use crate::store::{self, BoardStore, FieldMap, StoreError, paths};

use super::context::SessionContext;
use super::gate::{self, Role};
use super::subscription::{WatchHandle, spawn_watch};

/// Author name recorded when the context carries no display name.
const FALLBACK_AUTHOR: &str = "anonymous";

/// Card operations for one participant's session.
#[derive(Clone)]
pub struct CardEngine {
    store: Arc<dyn BoardStore>,
    ctx: SessionContext,
}

impl CardEngine {
    /// Build a card engine sharing the participant's session context.
    pub fn new(store: Arc<dyn BoardStore>, ctx: SessionContext) -> Self {
        Self { store, ctx }
    }

    /// Submit a new card.
    ///
    /// Content is trimmed first; an empty submission is a deliberate no-op
    /// returning `None` rather than an error. Over-length content is
    /// rejected. Positive and negative cards start with a zero vote
    /// counter; action items never carry one.
    pub async fn add_card(&self, kind: CardKind, content: &str) -> EngineResult<Option<CardRow>> {
        let session_id = self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        gate::card_create(self.ctx.phase(), Role::of(self.ctx.is_owner()), kind).into_result()?;

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if trimmed.chars().count() > MAX_CARD_CONTENT_LEN {
            return Err(EngineError::Validation(format!(
                "card content must not exceed {MAX_CARD_CONTENT_LEN} characters"
            )));
        }

        let timestamp = now_millis();
        let card = Card {
            content: trimmed.to_string(),
            author: self
                .ctx
                .display_name()
                .unwrap_or_else(|| FALLBACK_AUTHOR.to_string()),
            timestamp,
            votes: kind.carries_votes().then_some(0),
            group_id: None,
        };

        let key = store::push_key(timestamp);
        let path = paths::card(&session_id, kind, &key);
        let payload = serde_json::to_value(&card)
            .map_err(|source| StoreError::malformed(path.clone(), source))?;
        self.store.write(&path, payload).await?;

        Ok(Some(CardRow { key, card }))
    }

    /// Delete a card after an interactive confirmation.
    ///
    /// `card_author` is the author recorded on the card being removed; it
    /// feeds the ownership gate. Returns `false` when the confirmation is
    /// declined.
    pub async fn delete_card(
        &self,
        kind: CardKind,
        key: &str,
        card_author: &str,
        confirm: impl FnOnce(&str) -> bool,
    ) -> EngineResult<bool> {
        let session_id = self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        let is_author = self
            .ctx
            .display_name()
            .is_some_and(|name| name == card_author);
        gate::card_delete(
            self.ctx.phase(),
            Role::of(self.ctx.is_owner()),
            kind,
            is_author,
        )
        .into_result()?;

        if !confirm("Delete this card?") {
            return Ok(false);
        }

        self.store
            .remove(&paths::card(&session_id, kind, key))
            .await?;
        Ok(true)
    }

    /// Cast one vote on a card, spending the local budget.
    ///
    /// The increment is written on top of the caller-supplied count:
    /// concurrent voters race last-write-wins, so one of two simultaneous
    /// increments can be lost. Returns the count that was written.
    pub async fn vote_card(&self, kind: CardKind, key: &str, current_votes: u32) -> EngineResult<u32> {
        let session_id = self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        gate::card_vote(self.ctx.phase(), kind, self.ctx.votes_used()).into_result()?;

        let new_count = current_votes.saturating_add(1);
        let mut fields = FieldMap::new();
        fields.insert("votes".into(), Value::from(new_count));
        self.store
            .update(&paths::card(&session_id, kind, key), fields)
            .await?;

        self.ctx.record_vote();
        Ok(new_count)
    }

    /// Watch one card column, delivering the phase-filtered view.
    pub async fn watch_cards(
        &self,
        kind: CardKind,
        on_filtered: impl FnMut(Vec<CardRow>) + Send + 'static,
    ) -> EngineResult<WatchHandle> {
        self.watch_cards_detailed(kind, on_filtered, |_| {}).await
    }

    /// Watch one card column, delivering both the raw and filtered views.
    ///
    /// On every change the full list is sorted by descending vote count
    /// (ties keep key order, i.e. creation order), handed to `on_raw`, then
    /// filtered for the current phase and handed to `on_filtered`.
    pub async fn watch_cards_detailed(
        &self,
        kind: CardKind,
        mut on_filtered: impl FnMut(Vec<CardRow>) + Send + 'static,
        mut on_raw: impl FnMut(Vec<CardRow>) + Send + 'static,
    ) -> EngineResult<WatchHandle> {
        let session_id = self.ctx.session_id().ok_or_else(EngineError::no_session)?;
        let receiver = self
            .store
            .subscribe(&paths::cards(&session_id, kind))
            .await?;

        let ctx = self.ctx.clone();
        Ok(spawn_watch(receiver, move |value| {
            let rows = decode_rows(value);
            on_raw(rows.clone());
            let viewer = ctx.display_name().unwrap_or_default();
            on_filtered(filter_cards_by_phase(rows, kind, ctx.phase(), &viewer));
        }))
    }
}

/// Decode a stored card column into rows sorted by descending vote count.
///
/// Malformed entries are skipped with a warning rather than poisoning the
/// whole view. Key order (creation order) breaks vote ties.
fn decode_rows(value: Value) -> Vec<CardRow> {
    let Value::Object(entries) = value else {
        return Vec::new();
    };
    let mut rows: Vec<CardRow> = entries
        .into_iter()
        .filter_map(|(key, raw)| match serde_json::from_value::<Card>(raw) {
            Ok(card) => Some(CardRow { key, card }),
            Err(error) => {
                warn!(%key, %error, "skipping malformed card");
                None
            }
        })
        .collect();
    rows.sort_by_key(|row| std::cmp::Reverse(row.card.vote_count()));
    rows
}

/// Apply the per-phase visibility rule to a sorted card list.
///
/// During reflection each participant sees only their own cards, keeping
/// peers' entries private until grouping; every other phase shows the full
/// board. Action items are never filtered.
pub fn filter_cards_by_phase(
    rows: Vec<CardRow>,
    kind: CardKind,
    phase: Phase,
    viewer: &str,
) -> Vec<CardRow> {
    if kind == CardKind::Action || phase != Phase::Reflection {
        return rows;
    }
    rows.into_iter()
        .filter(|row| row.card.author == viewer)
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(key: &str, author: &str, votes: Option<u32>) -> CardRow {
        CardRow {
            key: key.into(),
            card: Card {
                content: format!("card {key}"),
                author: author.into(),
                timestamp: 1_700_000_000_000,
                votes,
                group_id: None,
            },
        }
    }

    #[test]
    fn decode_sorts_by_votes_with_key_order_ties() {
        let value = json!({
            "00a": {"content": "a", "author": "Alice", "timestamp": 1, "votes": 1},
            "00b": {"content": "b", "author": "Alice", "timestamp": 2, "votes": 3},
            "00c": {"content": "c", "author": "Alice", "timestamp": 3, "votes": 1},
        });
        let keys: Vec<String> = decode_rows(value).into_iter().map(|row| row.key).collect();
        assert_eq!(keys, ["00b", "00a", "00c"]);
    }

    #[test]
    fn decode_skips_malformed_entries() {
        let value = json!({
            "00a": {"content": "a", "author": "Alice", "timestamp": 1, "votes": 0},
            "00b": "not a card",
        });
        let rows = decode_rows(value);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "00a");
    }

    #[test]
    fn decode_treats_missing_column_as_empty() {
        assert!(decode_rows(Value::Null).is_empty());
    }

    #[test]
    fn reflection_hides_peer_cards() {
        let rows = vec![row("00a", "Alice", Some(0)), row("00b", "Bob", Some(0))];
        let visible = filter_cards_by_phase(rows, CardKind::Positive, Phase::Reflection, "Alice");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].card.author, "Alice");
    }

    #[test]
    fn later_phases_show_every_card() {
        for phase in [Phase::Grouping, Phase::Vote, Phase::Action] {
            let rows = vec![row("00a", "Alice", Some(0)), row("00b", "Bob", Some(0))];
            let visible = filter_cards_by_phase(rows, CardKind::Negative, phase, "Alice");
            assert_eq!(visible.len(), 2, "{phase}");
        }
    }

    #[test]
    fn action_items_are_never_filtered() {
        let rows = vec![row("00a", "Alice", None), row("00b", "Bob", None)];
        let visible = filter_cards_by_phase(rows, CardKind::Action, Phase::Reflection, "Alice");
        assert_eq!(visible.len(), 2);
    }

    mod integration {
        use tokio::sync::mpsc;

        use crate::engine::session::SessionManager;
        use crate::store::memory::MemoryStore;

        use super::*;

        struct Board {
            store: MemoryStore,
            owner: SessionManager,
            member: SessionManager,
            session_id: String,
        }

        impl Board {
            /// Owner "Alice" plus member "Bob" sharing one store.
            async fn new() -> Self {
                let store = MemoryStore::new();
                let owner = SessionManager::new(Arc::new(store.clone()), "participant-owner");
                let session_id = owner.create_session("Alice").await.unwrap();
                let member = SessionManager::new(Arc::new(store.clone()), "participant-member");
                member.join_session(&session_id, "Bob").await.unwrap();
                Self {
                    store,
                    owner,
                    member,
                    session_id,
                }
            }

            fn owner_cards(&self) -> CardEngine {
                CardEngine::new(Arc::new(self.store.clone()), self.owner.context())
            }

            fn member_cards(&self) -> CardEngine {
                CardEngine::new(Arc::new(self.store.clone()), self.member.context())
            }

            /// Owner changes the phase; wait until the member observes it.
            async fn advance_phase(&self, phase: Phase) {
                let (tx, mut rx) = mpsc::unbounded_channel();
                let handle = self
                    .member
                    .watch_phase(move |phase| {
                        let _ = tx.send(phase);
                    })
                    .await
                    .unwrap();
                self.owner.set_phase(phase).await.unwrap();
                while rx.recv().await != Some(phase) {}
                handle.cancel();
            }
        }

        #[tokio::test]
        async fn add_card_trims_validates_and_stores() {
            let board = Board::new().await;
            let cards = board.member_cards();

            assert!(cards.add_card(CardKind::Positive, "   ").await.unwrap().is_none());

            let too_long = "x".repeat(MAX_CARD_CONTENT_LEN + 1);
            assert!(matches!(
                cards.add_card(CardKind::Positive, &too_long).await,
                Err(EngineError::Validation(_))
            ));

            let row = cards
                .add_card(CardKind::Positive, "  daily standups helped  ")
                .await
                .unwrap()
                .expect("card created");
            assert_eq!(row.card.content, "daily standups helped");
            assert_eq!(row.card.author, "Bob");
            assert_eq!(row.card.votes, Some(0));

            let stored = board
                .store
                .read_once(&paths::card(&board.session_id, CardKind::Positive, &row.key))
                .await
                .unwrap();
            assert_eq!(stored["content"], "daily standups helped");
        }

        #[tokio::test]
        async fn action_items_need_the_action_phase_and_the_owner() {
            let board = Board::new().await;

            assert!(matches!(
                board.owner_cards().add_card(CardKind::Action, "follow up").await,
                Err(EngineError::PhaseViolation { .. })
            ));

            board.advance_phase(Phase::Action).await;
            assert!(matches!(
                board.member_cards().add_card(CardKind::Action, "follow up").await,
                Err(EngineError::PermissionDenied(_))
            ));

            let row = board
                .owner_cards()
                .add_card(CardKind::Action, "follow up")
                .await
                .unwrap()
                .expect("action created");
            assert_eq!(row.card.votes, None, "action items carry no vote counter");
        }

        #[tokio::test]
        async fn vote_budget_is_spent_across_cards_and_kinds() {
            let board = Board::new().await;
            let owner_cards = board.owner_cards();
            let first = owner_cards
                .add_card(CardKind::Positive, "pairing")
                .await
                .unwrap()
                .unwrap();
            let second = owner_cards
                .add_card(CardKind::Positive, "demos")
                .await
                .unwrap()
                .unwrap();
            let third = owner_cards
                .add_card(CardKind::Negative, "late starts")
                .await
                .unwrap()
                .unwrap();

            board.advance_phase(Phase::Vote).await;
            let cards = board.member_cards();
            assert_eq!(cards.vote_card(CardKind::Positive, &first.key, 0).await.unwrap(), 1);
            assert_eq!(cards.vote_card(CardKind::Positive, &second.key, 0).await.unwrap(), 1);
            assert_eq!(cards.vote_card(CardKind::Negative, &third.key, 0).await.unwrap(), 1);
            assert!(matches!(
                cards.vote_card(CardKind::Positive, &first.key, 1).await,
                Err(EngineError::BudgetExceeded)
            ));
            assert_eq!(board.member.votes_remaining(), 0);

            let stored = board
                .store
                .read_once(&paths::card(&board.session_id, CardKind::Positive, &first.key))
                .await
                .unwrap();
            assert_eq!(stored["votes"], 1);
        }

        #[tokio::test]
        async fn voting_outside_the_vote_phase_is_rejected() {
            let board = Board::new().await;
            let row = board
                .member_cards()
                .add_card(CardKind::Positive, "retro length")
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(
                board.member_cards().vote_card(CardKind::Positive, &row.key, 0).await,
                Err(EngineError::PhaseViolation { .. })
            ));
        }

        #[tokio::test]
        async fn delete_respects_ownership_and_confirmation() {
            let board = Board::new().await;
            let cards = board.member_cards();
            let row = cards
                .add_card(CardKind::Negative, "too many meetings")
                .await
                .unwrap()
                .unwrap();

            // Declined confirmation leaves the card in place.
            assert!(!cards
                .delete_card(CardKind::Negative, &row.key, &row.card.author, |_| false)
                .await
                .unwrap());
            let path = paths::card(&board.session_id, CardKind::Negative, &row.key);
            assert!(board.store.read_once(&path).await.unwrap().is_object());

            // A third participant may not delete someone else's card.
            let outsider = SessionManager::new(
                Arc::new(board.store.clone()),
                "participant-outsider",
            );
            outsider.join_session(&board.session_id, "Carol").await.unwrap();
            let outsider_cards = CardEngine::new(Arc::new(board.store.clone()), outsider.context());
            assert!(matches!(
                outsider_cards
                    .delete_card(CardKind::Negative, &row.key, &row.card.author, |_| true)
                    .await,
                Err(EngineError::PermissionDenied(_))
            ));

            // The author may, once confirmed.
            assert!(cards
                .delete_card(CardKind::Negative, &row.key, &row.card.author, |_| true)
                .await
                .unwrap());
            assert!(board.store.read_once(&path).await.unwrap().is_null());
        }

        #[tokio::test]
        async fn reflection_watch_hides_peers_until_grouping() {
            let board = Board::new().await;
            board
                .owner_cards()
                .add_card(CardKind::Positive, "from alice")
                .await
                .unwrap();
            board
                .member_cards()
                .add_card(CardKind::Positive, "from bob")
                .await
                .unwrap();

            let (filtered_tx, mut filtered_rx) = mpsc::unbounded_channel();
            let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
            board
                .member_cards()
                .watch_cards_detailed(
                    CardKind::Positive,
                    move |rows| {
                        let _ = filtered_tx.send(rows);
                    },
                    move |rows| {
                        let _ = raw_tx.send(rows);
                    },
                )
                .await
                .unwrap();

            let raw = raw_rx.recv().await.unwrap();
            assert_eq!(raw.len(), 2, "raw view is unfiltered");
            let visible = filtered_rx.recv().await.unwrap();
            assert_eq!(visible.len(), 1);
            assert_eq!(visible[0].card.author, "Bob");

            board.advance_phase(Phase::Grouping).await;
            let (late_tx, mut late_rx) = mpsc::unbounded_channel();
            board
                .member_cards()
                .watch_cards(CardKind::Positive, move |rows| {
                    let _ = late_tx.send(rows);
                })
                .await
                .unwrap();
            assert_eq!(late_rx.recv().await.unwrap().len(), 2);
        }

        #[tokio::test]
        async fn operations_without_a_session_are_rejected() {
            let store = MemoryStore::new();
            let detached = SessionManager::new(Arc::new(store.clone()), "participant-alone");
            let cards = CardEngine::new(Arc::new(store), detached.context());
            assert!(matches!(
                cards.add_card(CardKind::Positive, "anything").await,
                Err(EngineError::NotFound(_))
            ));
            assert!(matches!(
                cards.vote_card(CardKind::Positive, "00a", 0).await,
                Err(EngineError::NotFound(_))
            ));
        }
    }
}
