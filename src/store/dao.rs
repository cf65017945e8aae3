//! DAO trait definitions
//!
//! 語彙コレクションの永続化と、曲・歌詞行の参照／更新を分けて定義する。

use anyhow::Result;
use async_trait::async_trait;

use super::models::{LyricLine, SongRecord, SongScope};
use crate::pipeline::items::{Collection, ExtractedItem, MergedResult};

/// VocabularyDao - 抽出アイテムのデータアクセス層
#[async_trait]
pub trait VocabularyDao: Send + Sync {
    /// 範囲内にいずれかのコレクションの行が存在するか
    async fn exists_any(&self, scope: &SongScope) -> Result<bool>;

    /// 自然キー（大文字小文字を区別しない）で存在確認する
    async fn exists_by_key(&self, scope: &SongScope, collection: Collection, key: &str)
    -> Result<bool>;

    /// 1件挿入する。一意制約で挿入されなかった場合は `false`
    async fn insert_item(&self, scope: &SongScope, item: &ExtractedItem) -> Result<bool>;

    /// 範囲内の全アイテムを挿入順で取得する
    async fn find_all(&self, scope: &SongScope) -> Result<MergedResult>;
}

/// SongDao - 曲の歌詞と時刻付き歌詞行のデータアクセス層
#[async_trait]
pub trait SongDao: Send + Sync {
    async fn find_song(&self, song_id: &str) -> Result<Option<SongRecord>>;

    /// 開始時刻順（時刻なしが先頭）、同時刻は ID 順
    async fn find_lines(&self, song_id: &str) -> Result<Vec<LyricLine>>;

    async fn update_line_translation(&self, line_id: &str, target_text: &str) -> Result<()>;
}
