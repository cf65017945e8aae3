use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use super::dao::{SongDao, VocabularyDao};
use super::models::{LyricLine, SongRecord, SongScope};
use crate::pipeline::items::{
    Collection, Expression, ExtractedItem, Idiom, MergedResult, Sentence, Word,
};

/// `None` scope fields match any stored value.
const SCOPE_CLAUSE: &str =
    "song_id = $1 AND ($2::text IS NULL OR situation = $2) AND ($3::text IS NULL OR location = $3)";

fn table(collection: Collection) -> &'static str {
    match collection {
        Collection::Words => "lexicon_words",
        Collection::Expressions => "lexicon_expressions",
        Collection::Idioms => "lexicon_idioms",
        Collection::Sentences => "lexicon_sentences",
    }
}

/// Postgres 実装。語彙テーブルと曲・歌詞行テーブルの両方を扱う。
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_collection(&self, scope: &SongScope, sql: &str) -> Result<Vec<PgRow>> {
        sqlx::query(sql)
            .bind(&scope.song_id)
            .bind(&scope.situation)
            .bind(&scope.location)
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch lexicon rows")
    }
}

#[async_trait]
impl VocabularyDao for PgStore {
    async fn exists_any(&self, scope: &SongScope) -> Result<bool> {
        let sql = Collection::ALL
            .iter()
            .map(|c| format!("EXISTS (SELECT 1 FROM {} WHERE {SCOPE_CLAUSE})", table(*c)))
            .collect::<Vec<_>>()
            .join(" OR ");
        let row = sqlx::query(&format!("SELECT {sql} AS present"))
            .bind(&scope.song_id)
            .bind(&scope.situation)
            .bind(&scope.location)
            .fetch_one(&self.pool)
            .await
            .context("failed to check lexicon existence")?;
        Ok(row.try_get("present")?)
    }

    async fn exists_by_key(
        &self,
        scope: &SongScope,
        collection: Collection,
        key: &str,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {SCOPE_CLAUSE} AND lower({}) = lower($4)) AS present",
            table(collection),
            collection.key_field()
        );
        let row = sqlx::query(&sql)
            .bind(&scope.song_id)
            .bind(&scope.situation)
            .bind(&scope.location)
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("failed to check {} key", collection.as_str()))?;
        Ok(row.try_get("present")?)
    }

    async fn insert_item(&self, scope: &SongScope, item: &ExtractedItem) -> Result<bool> {
        let query = match item {
            ExtractedItem::Word(word) => sqlx::query(
                r"
                INSERT INTO lexicon_words
                    (song_id, situation, location, word, phonetic, meaning, pos, examples, level, tags)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(&scope.song_id)
            .bind(&scope.situation)
            .bind(&scope.location)
            .bind(word.word.trim())
            .bind(&word.phonetic)
            .bind(&word.meaning)
            .bind(&word.pos)
            .bind(&word.examples)
            .bind(&word.level)
            .bind(&word.tags),
            ExtractedItem::Expression(expression) => sqlx::query(
                r"
                INSERT INTO lexicon_expressions
                    (song_id, situation, location, expression, meaning, context, examples, tags, level)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(&scope.song_id)
            .bind(&scope.situation)
            .bind(&scope.location)
            .bind(expression.expression.trim())
            .bind(&expression.meaning)
            .bind(&expression.context)
            .bind(&expression.examples)
            .bind(&expression.tags)
            .bind(&expression.level),
            ExtractedItem::Idiom(idiom) => sqlx::query(
                r"
                INSERT INTO lexicon_idioms
                    (song_id, situation, location, phrase, meaning, examples, level, tags)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(&scope.song_id)
            .bind(&scope.situation)
            .bind(&scope.location)
            .bind(idiom.phrase.trim())
            .bind(&idiom.meaning)
            .bind(&idiom.examples)
            .bind(&idiom.level)
            .bind(&idiom.tags),
            ExtractedItem::Sentence(sentence) => sqlx::query(
                r"
                INSERT INTO lexicon_sentences
                    (song_id, situation, location, sentence, translation, tags, level)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(&scope.song_id)
            .bind(&scope.situation)
            .bind(&scope.location)
            .bind(sentence.sentence.trim())
            .bind(&sentence.translation)
            .bind(&sentence.tags)
            .bind(&sentence.level),
        };

        let result = query
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to insert {} item", item.collection().as_str()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_all(&self, scope: &SongScope) -> Result<MergedResult> {
        let mut result = MergedResult::default();

        let sql = format!(
            "SELECT word, phonetic, meaning, pos, examples, level, tags FROM lexicon_words WHERE {SCOPE_CLAUSE} ORDER BY id"
        );
        for row in self.fetch_collection(scope, &sql).await? {
            result.words.push(Word {
                word: row.try_get("word")?,
                phonetic: row.try_get("phonetic")?,
                meaning: row.try_get("meaning")?,
                pos: row.try_get("pos")?,
                examples: row.try_get("examples")?,
                level: row.try_get("level")?,
                tags: row.try_get("tags")?,
            });
        }

        let sql = format!(
            "SELECT expression, meaning, context, examples, tags, level FROM lexicon_expressions WHERE {SCOPE_CLAUSE} ORDER BY id"
        );
        for row in self.fetch_collection(scope, &sql).await? {
            result.expressions.push(Expression {
                expression: row.try_get("expression")?,
                meaning: row.try_get("meaning")?,
                context: row.try_get("context")?,
                examples: row.try_get("examples")?,
                tags: row.try_get("tags")?,
                level: row.try_get("level")?,
            });
        }

        let sql = format!(
            "SELECT phrase, meaning, examples, level, tags FROM lexicon_idioms WHERE {SCOPE_CLAUSE} ORDER BY id"
        );
        for row in self.fetch_collection(scope, &sql).await? {
            result.idioms.push(Idiom {
                phrase: row.try_get("phrase")?,
                meaning: row.try_get("meaning")?,
                examples: row.try_get("examples")?,
                level: row.try_get("level")?,
                tags: row.try_get("tags")?,
            });
        }

        let sql = format!(
            "SELECT sentence, translation, tags, level FROM lexicon_sentences WHERE {SCOPE_CLAUSE} ORDER BY id"
        );
        for row in self.fetch_collection(scope, &sql).await? {
            result.sentences.push(Sentence {
                sentence: row.try_get("sentence")?,
                translation: row.try_get("translation")?,
                tags: row.try_get("tags")?,
                level: row.try_get("level")?,
            });
        }

        Ok(result)
    }
}

#[async_trait]
impl SongDao for PgStore {
    async fn find_song(&self, song_id: &str) -> Result<Option<SongRecord>> {
        let row = sqlx::query(
            r"
            SELECT song_id, lyrics, title, artists, album
            FROM songs
            WHERE song_id = $1
            ",
        )
        .bind(song_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch song")?;

        row.map(|row| -> Result<SongRecord> {
            Ok(SongRecord {
                song_id: row.try_get("song_id")?,
                lyrics: row.try_get("lyrics")?,
                title: row.try_get("title")?,
                artists: row.try_get("artists")?,
                album: row.try_get("album")?,
            })
        })
        .transpose()
    }

    async fn find_lines(&self, song_id: &str) -> Result<Vec<LyricLine>> {
        let rows = sqlx::query(
            r"
            SELECT id, song_id, start_time_ms, source_text, target_text
            FROM lyric_lines
            WHERE song_id = $1
            ORDER BY start_time_ms ASC NULLS FIRST, id ASC
            ",
        )
        .bind(song_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch lyric lines")?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            lines.push(LyricLine {
                id: row.try_get("id")?,
                song_id: row.try_get("song_id")?,
                start_time_ms: row.try_get("start_time_ms")?,
                source_text: row.try_get("source_text")?,
                target_text: row.try_get("target_text")?,
            });
        }
        Ok(lines)
    }

    async fn update_line_translation(&self, line_id: &str, target_text: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE lyric_lines
            SET target_text = $2
            WHERE id = $1
            ",
        )
        .bind(line_id)
        .bind(target_text)
        .execute(&self.pool)
        .await
        .context("failed to update lyric line translation")?;
        Ok(())
    }
}
