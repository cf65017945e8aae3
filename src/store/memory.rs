//! インメモリ実装。
//!
//! DSN 未設定時のローカル起動とテストで使う。プロセス終了で内容は消える。

use std::collections::HashMap;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::dao::{SongDao, VocabularyDao};
use super::models::{LyricLine, SongRecord, SongScope};
use crate::pipeline::accumulator::natural_key;
use crate::pipeline::items::{Collection, ExtractedItem, MergedResult};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: RwLock<Vec<(SongScope, ExtractedItem)>>,
    songs: RwLock<HashMap<String, SongRecord>>,
    lines: RwLock<Vec<LyricLine>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_song(&self, song: SongRecord) {
        self.songs.write().await.insert(song.song_id.clone(), song);
    }

    pub async fn put_line(&self, line: LyricLine) {
        let mut lines = self.lines.write().await;
        lines.retain(|existing| existing.id != line.id);
        lines.push(line);
    }

    pub async fn item_count(&self) -> usize {
        self.items.read().await.len()
    }
}

/// Exact scope used for uniqueness: rows collide only within the same stored context.
fn same_stored_scope(a: &SongScope, b: &SongScope) -> bool {
    a.song_id == b.song_id && a.situation == b.situation && a.location == b.location
}

#[async_trait]
impl VocabularyDao for InMemoryStore {
    async fn exists_any(&self, scope: &SongScope) -> Result<bool> {
        Ok(self
            .items
            .read()
            .await
            .iter()
            .any(|(stored, _)| scope.matches(stored)))
    }

    async fn exists_by_key(
        &self,
        scope: &SongScope,
        collection: Collection,
        key: &str,
    ) -> Result<bool> {
        let wanted = natural_key(key);
        Ok(self.items.read().await.iter().any(|(stored, item)| {
            scope.matches(stored)
                && item.collection() == collection
                && natural_key(item.natural_key()) == wanted
        }))
    }

    async fn insert_item(&self, scope: &SongScope, item: &ExtractedItem) -> Result<bool> {
        if item.natural_key().trim().is_empty() {
            bail!("refusing to insert {} item without key", item.collection().as_str());
        }
        let mut items = self.items.write().await;
        let key = natural_key(item.natural_key());
        let duplicate = items.iter().any(|(stored, existing)| {
            same_stored_scope(stored, scope)
                && existing.collection() == item.collection()
                && natural_key(existing.natural_key()) == key
        });
        if duplicate {
            return Ok(false);
        }
        items.push((scope.clone(), item.clone()));
        Ok(true)
    }

    async fn find_all(&self, scope: &SongScope) -> Result<MergedResult> {
        let mut result = MergedResult::default();
        for (stored, item) in self.items.read().await.iter() {
            if scope.matches(stored) {
                result.push(item.clone());
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl SongDao for InMemoryStore {
    async fn find_song(&self, song_id: &str) -> Result<Option<SongRecord>> {
        Ok(self.songs.read().await.get(song_id).cloned())
    }

    async fn find_lines(&self, song_id: &str) -> Result<Vec<LyricLine>> {
        let mut lines: Vec<LyricLine> = self
            .lines
            .read()
            .await
            .iter()
            .filter(|line| line.song_id == song_id)
            .cloned()
            .collect();
        // None sorts before Some, matching NULLS FIRST.
        lines.sort_by(|a, b| {
            a.start_time_ms
                .cmp(&b.start_time_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(lines)
    }

    async fn update_line_translation(&self, line_id: &str, target_text: &str) -> Result<()> {
        let mut lines = self.lines.write().await;
        match lines.iter_mut().find(|line| line.id == line_id) {
            Some(line) => {
                line.target_text = Some(target_text.to_string());
                Ok(())
            }
            None => bail!("lyric line {line_id} not found"),
        }
    }
}
