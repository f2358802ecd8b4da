use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use flashcard_core::model::{Flashcard, FlashcardSet, SetId};
use reqwest::{Client, Response};

use crate::config::RemoteConfig;
use crate::error::RemoteError;

/// Backend that owns the server-side copy of the flashcard sets.
///
/// All writes are upserts keyed by entity id, so repeating a call is harmless.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetch every set with its cards.
    async fn fetch_sets(&self) -> Result<Vec<FlashcardSet>, RemoteError>;

    /// Upsert set metadata. Cards are ignored; see [`RemoteApi::upsert_cards`].
    async fn upsert_set(&self, set: &FlashcardSet) -> Result<(), RemoteError>;

    /// Upsert every card of a set.
    async fn upsert_cards(&self, set_id: &SetId, cards: &[Flashcard]) -> Result<(), RemoteError>;

    /// Delete a set and its cards. Deleting an unknown id succeeds.
    async fn delete_set(&self, set_id: &SetId) -> Result<(), RemoteError>;
}

// ─── HTTP ──────────────────────────────────────────────────────────────────────

/// JSON-over-HTTP [`RemoteApi`] with bearer authentication.
#[derive(Clone)]
pub struct HttpRemoteApi {
    client: Client,
    config: RemoteConfig,
}

impl HttpRemoteApi {
    #[must_use]
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// `None` unless `FLASHCARDS_API_URL` and `FLASHCARDS_API_KEY` are set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        RemoteConfig::from_env().map(Self::new)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }
}

fn check(response: Response) -> Result<Response, RemoteError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(RemoteError::HttpStatus(response.status()))
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn fetch_sets(&self) -> Result<Vec<FlashcardSet>, RemoteError> {
        let response = self
            .client
            .get(self.url("flashcard-sets"))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        Ok(check(response)?.json().await?)
    }

    async fn upsert_set(&self, set: &FlashcardSet) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.url(&format!("flashcard-sets/{}", set.id)))
            .bearer_auth(&self.config.api_key)
            .json(&set.metadata())
            .send()
            .await?;
        check(response)?;
        Ok(())
    }

    async fn upsert_cards(&self, set_id: &SetId, cards: &[Flashcard]) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.url(&format!("flashcard-sets/{set_id}/flashcards")))
            .bearer_auth(&self.config.api_key)
            .json(cards)
            .send()
            .await?;
        check(response)?;
        Ok(())
    }

    async fn delete_set(&self, set_id: &SetId) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.url(&format!("flashcard-sets/{set_id}")))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response)?;
        Ok(())
    }
}

// ─── In-memory ─────────────────────────────────────────────────────────────────

/// A call received by [`InMemoryRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    FetchSets,
    UpsertSet(SetId),
    UpsertCards(SetId, usize),
    DeleteSet(SetId),
}

#[derive(Default)]
struct RemoteTables {
    sets: Vec<FlashcardSet>,
    calls: Vec<RemoteCall>,
    fail_on: Option<SetId>,
}

/// Remote backend held in memory, for tests and offline use.
///
/// Records every call and can be told to reject writes for one set id.
#[derive(Clone, Default)]
pub struct InMemoryRemote {
    tables: Arc<Mutex<RemoteTables>>,
}

impl InMemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sets(sets: Vec<FlashcardSet>) -> Self {
        let remote = Self::default();
        remote.lock().sets = sets;
        remote
    }

    /// Reject every write touching `set_id` until cleared with `None`.
    pub fn fail_on(&self, set_id: Option<SetId>) {
        self.lock().fail_on = set_id;
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn sets(&self) -> Vec<FlashcardSet> {
        self.lock().sets.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteTables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, set_id: &SetId, call: RemoteCall) -> Result<MutexGuard<'_, RemoteTables>, RemoteError> {
        let mut tables = self.lock();
        tables.calls.push(call);
        if tables.fail_on.as_ref() == Some(set_id) {
            return Err(RemoteError::Rejected(format!("writes to {set_id} are rejected")));
        }
        Ok(tables)
    }
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn fetch_sets(&self) -> Result<Vec<FlashcardSet>, RemoteError> {
        let mut tables = self.lock();
        tables.calls.push(RemoteCall::FetchSets);
        Ok(tables.sets.clone())
    }

    async fn upsert_set(&self, set: &FlashcardSet) -> Result<(), RemoteError> {
        let mut tables = self.write(&set.id, RemoteCall::UpsertSet(set.id.clone()))?;
        let metadata = set.metadata();
        match tables.sets.iter().position(|s| s.id == set.id) {
            Some(index) => {
                let existing = &mut tables.sets[index];
                let cards = std::mem::take(&mut existing.flashcards);
                *existing = FlashcardSet {
                    flashcards: cards,
                    ..metadata
                };
            }
            None => tables.sets.push(metadata),
        }
        Ok(())
    }

    async fn upsert_cards(&self, set_id: &SetId, cards: &[Flashcard]) -> Result<(), RemoteError> {
        let mut tables =
            self.write(set_id, RemoteCall::UpsertCards(set_id.clone(), cards.len()))?;
        let set = tables
            .sets
            .iter_mut()
            .find(|s| &s.id == set_id)
            .ok_or_else(|| RemoteError::Rejected(format!("unknown set {set_id}")))?;
        set.flashcards = cards.to_vec();
        Ok(())
    }

    async fn delete_set(&self, set_id: &SetId) -> Result<(), RemoteError> {
        let mut tables = self.write(set_id, RemoteCall::DeleteSet(set_id.clone()))?;
        tables.sets.retain(|s| &s.id != set_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashcard_core::model::CardId;
    use flashcard_core::time::fixed_now;

    fn set(id: &str) -> FlashcardSet {
        FlashcardSet::new(SetId::new(id), "Verbs", None, fixed_now())
            .unwrap()
            .with_cards([Flashcard::new(CardId::new("c1"), "gehen", "to go")])
    }

    #[tokio::test]
    async fn in_memory_upserts_are_idempotent() {
        let remote = InMemoryRemote::new();
        let s = set("s1");

        for _ in 0..2 {
            remote.upsert_set(&s).await.unwrap();
            remote.upsert_cards(&s.id, &s.flashcards).await.unwrap();
        }

        assert_eq!(remote.sets(), vec![s]);
    }

    #[tokio::test]
    async fn metadata_upsert_keeps_remote_cards() {
        let remote = InMemoryRemote::with_sets(vec![set("s1")]);
        let mut renamed = set("s1");
        renamed.title = "Irregular verbs".into();
        renamed.flashcards.clear();

        remote.upsert_set(&renamed).await.unwrap();

        let stored = &remote.sets()[0];
        assert_eq!(stored.title, "Irregular verbs");
        assert_eq!(stored.flashcards.len(), 1);
    }

    #[tokio::test]
    async fn fail_on_rejects_and_records() {
        let remote = InMemoryRemote::new();
        remote.fail_on(Some(SetId::new("s1")));

        let err = remote.upsert_set(&set("s1")).await.unwrap_err();

        assert!(matches!(err, RemoteError::Rejected(_)));
        assert_eq!(remote.calls(), vec![RemoteCall::UpsertSet(SetId::new("s1"))]);
        assert!(remote.sets().is_empty());
    }

    #[test]
    fn http_urls_join_cleanly() {
        let api = HttpRemoteApi::new(RemoteConfig {
            base_url: "https://api.test/v1/".into(),
            api_key: "k".into(),
        });
        assert_eq!(api.url("flashcard-sets"), "https://api.test/v1/flashcard-sets");
    }
}
