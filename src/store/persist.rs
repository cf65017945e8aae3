//! 抽出結果の永続化アダプタ。
//!
//! 既存チェック → 1件ずつの挿入という「存在しなければ保存」方式で冪等性を保つ。
//! 4コレクション全体を包むトランザクションは張らないため、途中で失敗した場合は
//! それまでに保存された行がそのまま残る。

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::dao::VocabularyDao;
use super::models::{SaveReport, SongScope};
use crate::pipeline::items::MergedResult;
use crate::util::text::is_blank;

#[derive(Clone)]
pub struct LexiconPersistence {
    dao: Arc<dyn VocabularyDao>,
}

impl LexiconPersistence {
    pub fn new(dao: Arc<dyn VocabularyDao>) -> Self {
        Self { dao }
    }

    /// Whether anything at all is stored for the scope.
    pub async fn exists_any(&self, scope: &SongScope) -> Result<bool> {
        self.dao
            .exists_any(scope)
            .await
            .with_context(|| format!("failed to check stored lexicon for song {}", scope.song_id))
    }

    /// Inserts every item whose key is new to the scope and whose meaning or
    /// translation is present.
    ///
    /// The first failing insert is returned as the error; items saved before it
    /// remain stored.
    pub async fn save_all(&self, scope: &SongScope, result: &MergedResult) -> Result<SaveReport> {
        let mut report = SaveReport::default();

        for mut item in result.items() {
            let collection = item.collection();
            let key = item.natural_key().trim().to_string();
            if key.is_empty() {
                report.skipped_blank_key += 1;
                continue;
            }
            if is_blank(item.core_text()) {
                debug!(
                    song_id = %scope.song_id,
                    collection = collection.as_str(),
                    key = %key,
                    "skipping item without meaning"
                );
                report.skipped_missing_core += 1;
                continue;
            }
            if self.dao.exists_by_key(scope, collection, &key).await.with_context(|| {
                format!("failed to look up {} key {key:?}", collection.as_str())
            })? {
                report.skipped_existing += 1;
                continue;
            }

            *item.natural_key_mut() = key.clone();
            let inserted = self.dao.insert_item(scope, &item).await.with_context(|| {
                format!("failed to save {} item {key:?}", collection.as_str())
            })?;
            if inserted {
                report.inserted += 1;
            } else {
                // lost a race with a concurrent writer; the row is there either way
                report.skipped_existing += 1;
            }
        }

        info!(
            song_id = %scope.song_id,
            situation = scope.situation.as_deref().unwrap_or_default(),
            location = scope.location.as_deref().unwrap_or_default(),
            inserted = report.inserted,
            skipped = report.skipped(),
            "saved lexicon items"
        );
        Ok(report)
    }

    /// Rebuilds the four-collection view from storage.
    pub async fn load_as_json(&self, scope: &SongScope) -> Result<MergedResult> {
        self.dao
            .find_all(scope)
            .await
            .with_context(|| format!("failed to load stored lexicon for song {}", scope.song_id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::pipeline::items::{Collection, ExtractedItem, Idiom, Sentence, Word};
    use crate::store::memory::InMemoryStore;

    fn sample() -> MergedResult {
        let mut result = MergedResult::default();
        result.words.push(Word {
            word: "run".into(),
            meaning: Some("to move fast".into()),
            ..Word::default()
        });
        result.words.push(Word {
            word: "fly".into(),
            meaning: Some("   ".into()),
            ..Word::default()
        });
        result.idioms.push(Idiom {
            phrase: "break a leg".into(),
            meaning: Some("good luck".into()),
            ..Idiom::default()
        });
        result.sentences.push(Sentence {
            sentence: "I run".into(),
            translation: None,
            ..Sentence::default()
        });
        result
    }

    #[tokio::test]
    async fn save_all_skips_blank_core_and_existing_keys() {
        let store = Arc::new(InMemoryStore::new());
        let persistence = LexiconPersistence::new(store.clone());
        let scope = SongScope::song("s1");

        let first = persistence.save_all(&scope, &sample()).await.expect("save");
        assert_eq!(first.inserted, 2);
        assert_eq!(first.skipped_missing_core, 2);

        let mut again = sample();
        again.words[0].word = "RUN".into();
        let second = persistence.save_all(&scope, &again).await.expect("save");
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_existing, 2);
        assert_eq!(store.item_count().await, 2);
    }

    #[tokio::test]
    async fn load_as_json_returns_saved_view() {
        let store = Arc::new(InMemoryStore::new());
        let persistence = LexiconPersistence::new(store);
        let scope = SongScope::song("s1");

        assert!(!persistence.exists_any(&scope).await.expect("exists"));
        persistence.save_all(&scope, &sample()).await.expect("save");
        assert!(persistence.exists_any(&scope).await.expect("exists"));

        let loaded = persistence.load_as_json(&scope).await.expect("load");
        assert_eq!(loaded.words.len(), 1);
        assert_eq!(loaded.words[0].word, "run");
        assert_eq!(loaded.idioms.len(), 1);
        assert!(loaded.sentences.is_empty());
    }

    #[tokio::test]
    async fn context_scoped_saves_are_independent() {
        let store = Arc::new(InMemoryStore::new());
        let persistence = LexiconPersistence::new(store.clone());
        let cafe = SongScope::song("s1").with_context(Some("cafe".into()), None);
        let park = SongScope::song("s1").with_context(Some("park".into()), None);

        persistence.save_all(&cafe, &sample()).await.expect("save");
        let report = persistence.save_all(&park, &sample()).await.expect("save");
        assert_eq!(report.inserted, 2);
        assert_eq!(store.item_count().await, 4);
    }

    /// Accepts a fixed number of inserts, then fails.
    struct FlakyDao {
        inner: InMemoryStore,
        remaining: AtomicUsize,
    }

    #[async_trait]
    impl VocabularyDao for FlakyDao {
        async fn exists_any(&self, scope: &SongScope) -> Result<bool> {
            self.inner.exists_any(scope).await
        }

        async fn exists_by_key(
            &self,
            scope: &SongScope,
            collection: Collection,
            key: &str,
        ) -> Result<bool> {
            self.inner.exists_by_key(scope, collection, key).await
        }

        async fn insert_item(&self, scope: &SongScope, item: &ExtractedItem) -> Result<bool> {
            if self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
            {
                anyhow::bail!("connection reset");
            }
            self.inner.insert_item(scope, item).await
        }

        async fn find_all(&self, scope: &SongScope) -> Result<MergedResult> {
            self.inner.find_all(scope).await
        }
    }

    #[tokio::test]
    async fn partial_failure_keeps_earlier_rows() {
        let dao = Arc::new(FlakyDao {
            inner: InMemoryStore::new(),
            remaining: AtomicUsize::new(1),
        });
        let persistence = LexiconPersistence::new(dao.clone());
        let scope = SongScope::song("s1");

        let error = persistence
            .save_all(&scope, &sample())
            .await
            .expect_err("second insert fails");
        assert!(format!("{error:#}").contains("connection reset"));

        let stored = persistence.load_as_json(&scope).await.expect("load");
        assert_eq!(stored.words.len(), 1);
        assert!(stored.idioms.is_empty());
    }

    #[tokio::test]
    async fn keys_are_stored_trimmed() {
        let store = Arc::new(InMemoryStore::new());
        let persistence = LexiconPersistence::new(store.clone());
        let scope = SongScope::song("s1");

        let mut padded = MergedResult::default();
        padded.words.push(Word {
            word: "  run ".into(),
            meaning: Some("to move fast".into()),
            ..Word::default()
        });
        persistence.save_all(&scope, &padded).await.expect("save");
        let report = persistence.save_all(&scope, &sample()).await.expect("save");

        assert_eq!(report.skipped_existing, 1);
        let stored = persistence.load_as_json(&scope).await.expect("load");
        let words: Vec<&str> = stored.words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, vec!["run"]);
    }

    /// Never sees existing rows, so every duplicate reaches the insert.
    struct BlindLookupDao {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl VocabularyDao for BlindLookupDao {
        async fn exists_any(&self, scope: &SongScope) -> Result<bool> {
            self.inner.exists_any(scope).await
        }

        async fn exists_by_key(
            &self,
            _scope: &SongScope,
            _collection: Collection,
            _key: &str,
        ) -> Result<bool> {
            Ok(false)
        }

        async fn insert_item(&self, scope: &SongScope, item: &ExtractedItem) -> Result<bool> {
            self.inner.insert_item(scope, item).await
        }

        async fn find_all(&self, scope: &SongScope) -> Result<MergedResult> {
            self.inner.find_all(scope).await
        }
    }

    #[tokio::test]
    async fn insert_conflict_counts_as_existing() {
        let dao = Arc::new(BlindLookupDao {
            inner: InMemoryStore::new(),
        });
        let persistence = LexiconPersistence::new(dao.clone());
        let scope = SongScope::song("s1");

        persistence.save_all(&scope, &sample()).await.expect("save");
        let report = persistence.save_all(&scope, &sample()).await.expect("save");

        assert_eq!(report.inserted, 0);
        assert_eq!(report.skipped_existing, 2);
        assert_eq!(dao.inner.item_count().await, 2);
    }
}
