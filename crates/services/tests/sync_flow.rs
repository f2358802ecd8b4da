use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use flashcard_core::model::{CardId, Flashcard, FlashcardSet, SetId};
use flashcard_core::time::fixed_now;
use services::{
    Clock, InMemoryRemote, RemoteApi, RemoteCall, RemoteError, StateService, SyncError,
    SyncReport, SyncService,
};
use storage::repository::Storage;

async fn state_with_sets(ids: &[&str]) -> Arc<StateService> {
    let storage = Storage::in_memory();
    let state = StateService::load(Clock::fixed(fixed_now()), Arc::clone(&storage.state))
        .await
        .expect("load");
    let sets: Vec<FlashcardSet> = ids
        .iter()
        .map(|id| {
            FlashcardSet::new(SetId::new(*id), format!("Set {id}"), None, fixed_now())
                .expect("set")
                .with_cards([Flashcard::new(CardId::new(format!("{id}-1")), "q", "a")])
        })
        .collect();
    state
        .update_state(|mut s| {
            s.flashcard_sets = sets;
            s
        })
        .await
        .expect("seed");
    Arc::new(state)
}

/// Delegates to an in-memory remote and marks another set dirty while the
/// first upsert is in flight.
struct RacingRemote {
    inner: InMemoryRemote,
    state: Arc<StateService>,
    late: SetId,
    fired: OnceLock<()>,
}

#[async_trait]
impl RemoteApi for RacingRemote {
    async fn fetch_sets(&self) -> Result<Vec<FlashcardSet>, RemoteError> {
        self.inner.fetch_sets().await
    }

    async fn upsert_set(&self, set: &FlashcardSet) -> Result<(), RemoteError> {
        if self.fired.set(()).is_ok() {
            self.state.mark_dirty(&self.late).await;
        }
        self.inner.upsert_set(set).await
    }

    async fn upsert_cards(&self, set_id: &SetId, cards: &[Flashcard]) -> Result<(), RemoteError> {
        self.inner.upsert_cards(set_id, cards).await
    }

    async fn delete_set(&self, set_id: &SetId) -> Result<(), RemoteError> {
        self.inner.delete_set(set_id).await
    }
}

#[tokio::test]
async fn sync_clears_only_attempted_sets() {
    let state = state_with_sets(&["a", "b", "c"]).await;
    state.mark_dirty(&SetId::new("a")).await;
    state.mark_card_dirty(&SetId::new("b"), &CardId::new("b-1")).await;

    let inner = InMemoryRemote::new();
    let remote = RacingRemote {
        inner: inner.clone(),
        state: Arc::clone(&state),
        late: SetId::new("c"),
        fired: OnceLock::new(),
    };
    let sync = SyncService::new(Arc::clone(&state), Some(Arc::new(remote)));

    let report = sync.sync().await.expect("sync");

    assert_eq!(report, SyncReport::Synced { upserted: 2, deleted: 0 });
    assert_eq!(state.dirty_set_ids(), vec![SetId::new("c")]);
    assert!(state.dirty_cards().is_empty());
    assert_eq!(inner.sets().len(), 2);

    let report = sync.sync().await.expect("second sync");
    assert_eq!(report, SyncReport::Synced { upserted: 1, deleted: 0 });
    assert!(state.dirty_set_ids().is_empty());
}

#[tokio::test]
async fn failed_sync_clears_nothing() {
    let state = state_with_sets(&["a", "b"]).await;
    state.mark_dirty(&SetId::new("a")).await;
    state.mark_card_dirty(&SetId::new("b"), &CardId::new("b-1")).await;

    let remote = InMemoryRemote::new();
    remote.fail_on(Some(SetId::new("b")));
    let sync = SyncService::new(Arc::clone(&state), Some(Arc::new(remote.clone())));

    let err = sync.sync().await.expect_err("sync must fail");

    assert!(matches!(err, SyncError::Remote(RemoteError::Rejected(_))));
    assert_eq!(state.dirty_set_ids(), vec![SetId::new("a"), SetId::new("b")]);
    assert_eq!(state.dirty_cards().len(), 1);

    remote.fail_on(None);
    sync.sync().await.expect("retry");

    assert!(state.dirty_set_ids().is_empty());
    assert!(remote.calls().contains(&RemoteCall::UpsertCards(SetId::new("b"), 1)));
}

#[tokio::test]
async fn repeated_sync_is_a_noop() {
    let state = state_with_sets(&["a"]).await;
    state.mark_dirty(&SetId::new("a")).await;
    let remote = InMemoryRemote::new();
    let sync = SyncService::new(Arc::clone(&state), Some(Arc::new(remote.clone())));

    sync.sync().await.expect("sync");
    let calls = remote.calls().len();

    assert_eq!(sync.sync().await.expect("again"), SyncReport::NothingToSync);
    assert_eq!(remote.calls().len(), calls);
}
