//! チャンクオーケストレーター。
//!
//! チャンクを1件ずつ生成バックエンドへ送り、応答を検証してアキュムレータへ
//! 畳み込む。1チャンクの失敗は空フラグメントに置き換え、全体は止めない。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::accumulator::Accumulator;
use super::chunker::LyricChunker;
use super::items::MergedResult;
use super::level::normalize_levels;
use crate::clients::{GenerationBackend, GenerationRequest};
use crate::observability::metrics::Metrics;
use crate::prompt::PromptStore;
use crate::schema::extraction::{EXTRACTION_SCHEMA, empty_fragment};
use crate::schema::validate_json;
use crate::store::{LexiconPersistence, SongDao, SongScope};
use crate::util::text::clip;

const DEFAULT_SCHEMA_NAME: &str = "ParsingResponse";
const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(60);
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct LyricsPipeline {
    chunker: LyricChunker,
    backend: Arc<dyn GenerationBackend>,
    prompts: Arc<PromptStore>,
    schema_name: String,
    chunk_timeout: Duration,
    persistence: LexiconPersistence,
    songs: Arc<dyn SongDao>,
    metrics: Arc<Metrics>,
}

impl LyricsPipeline {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        persistence: LexiconPersistence,
        songs: Arc<dyn SongDao>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            chunker: LyricChunker::default(),
            backend,
            prompts: Arc::new(PromptStore::builtin()),
            schema_name: DEFAULT_SCHEMA_NAME.to_string(),
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
            persistence,
            songs,
            metrics,
        }
    }

    #[must_use]
    pub fn with_chunker(mut self, chunker: LyricChunker) -> Self {
        self.chunker = chunker;
        self
    }

    #[must_use]
    pub fn with_prompts(mut self, prompts: Arc<PromptStore>) -> Self {
        self.prompts = prompts;
        self
    }

    #[must_use]
    pub fn with_schema_name(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = schema_name.into();
        self
    }

    #[must_use]
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    pub fn persistence(&self) -> &LexiconPersistence {
        &self.persistence
    }

    /// 歌詞全体を解析して4コレクションの統合結果を返す。
    ///
    /// 生成バックエンドがすべて失敗しても、空の4配列を持つ結果を返す。
    #[instrument(skip_all, fields(run_id = %uuid::Uuid::now_v7(), chars = raw.len()))]
    pub async fn parse(&self, raw: &str) -> MergedResult {
        let timer = self.metrics.parse_duration.start_timer();
        let chunks = self.chunker.chunk(raw);
        if chunks.is_empty() {
            info!("lyrics too short after cleaning; nothing to extract");
            timer.observe_duration();
            return MergedResult::default();
        }

        let total = chunks.len();
        info!(chunks = total, "parsing lyrics");
        let prompt = self.prompts.lyrics_prompt().await;

        // Strictly one chunk in flight at a time. The backend is rate limited
        // and per-chunk logs must stay in order; keep this a sequential loop.
        let mut accumulator = Accumulator::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let fragment = self.extract_chunk(&prompt, chunk, index + 1, total).await;
            accumulator.accumulate(&fragment);
        }

        let mut result = accumulator.to_json();
        let changed = normalize_levels(&mut result);
        self.metrics.levels_normalized.inc_by(count(changed));
        timer.observe_duration();

        info!(
            chunks = total,
            words = result.words.len(),
            expressions = result.expressions.len(),
            idioms = result.idioms.len(),
            sentences = result.sentences.len(),
            levels_normalized = changed,
            "parsed lyrics"
        );
        result
    }

    /// 既に保存済みならバックエンドを呼ばずに保存内容を返す。
    /// 未保存なら解析・保存し、解析結果をそのまま返す。
    ///
    /// # Errors
    /// 永続化層の失敗をそのまま返す。途中まで保存された行は残る。
    pub async fn parse_and_save(
        &self,
        scope: &SongScope,
        raw: &str,
    ) -> Result<MergedResult, PipelineError> {
        if let Some(stored) = self.stored_view(scope).await? {
            return Ok(stored);
        }

        let result = self.parse(raw).await;
        self.save(scope, &result).await?;
        Ok(result)
    }

    /// 曲IDから保存済みの歌詞を読み込んで解析・保存し、保存後の内容を返す。
    ///
    /// 既に保存済みなら曲や歌詞は参照せず、保存内容をそのまま返す。
    ///
    /// # Errors
    /// 未保存で曲が存在しなければ `NotFound`、歌詞が空なら `InvalidInput`。
    pub async fn parse_and_save_by_song(
        &self,
        scope: &SongScope,
    ) -> Result<MergedResult, PipelineError> {
        if let Some(stored) = self.stored_view(scope).await? {
            return Ok(stored);
        }

        let song = self
            .songs
            .find_song(&scope.song_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("song {}", scope.song_id)))?;
        let Some(lyrics) = song.lyrics.filter(|lyrics| !lyrics.trim().is_empty()) else {
            return Err(PipelineError::InvalidInput(format!(
                "song {} has no lyrics",
                scope.song_id
            )));
        };

        let result = self.parse(&lyrics).await;
        self.save(scope, &result).await?;
        Ok(self.persistence.load_as_json(scope).await?)
    }

    async fn stored_view(&self, scope: &SongScope) -> Result<Option<MergedResult>, PipelineError> {
        if !self.persistence.exists_any(scope).await? {
            return Ok(None);
        }
        self.metrics.generation_skipped.inc();
        info!(song_id = %scope.song_id, "lexicon already stored; skipping generation");
        Ok(Some(self.persistence.load_as_json(scope).await?))
    }

    async fn save(&self, scope: &SongScope, result: &MergedResult) -> Result<(), PipelineError> {
        let report = self.persistence.save_all(scope, result).await?;
        self.metrics.items_saved.inc_by(count(report.inserted));
        self.metrics.items_skipped.inc_by(count(report.skipped()));
        Ok(())
    }

    async fn extract_chunk(&self, prompt: &str, chunk: &str, ordinal: usize, total: usize) -> Value {
        self.metrics.chunks_processed.inc();
        debug!(chunk = ordinal, total, chars = chunk.len(), "sending chunk");

        let request =
            GenerationRequest::with_schema(Some(prompt), chunk, &self.schema_name, &EXTRACTION_SCHEMA);
        let timer = self.metrics.generation_latency.start_timer();
        let outcome = tokio::time::timeout(self.chunk_timeout, self.backend.generate(request)).await;
        timer.observe_duration();

        let text = match outcome {
            Ok(Ok(text)) => text,
            Ok(Err(error)) => {
                warn!(chunk = ordinal, total, error = %error, "generation failed; using empty fragment");
                self.metrics.generation_failures.inc();
                return self.fallback();
            }
            Err(_) => {
                warn!(
                    chunk = ordinal,
                    total,
                    timeout_ms = self.chunk_timeout.as_millis(),
                    "generation timed out; using empty fragment"
                );
                self.metrics.generation_failures.inc();
                return self.fallback();
            }
        };

        let fragment = match serde_json::from_str::<Value>(text.trim()) {
            Ok(fragment) => fragment,
            Err(error) => {
                warn!(
                    chunk = ordinal,
                    total,
                    error = %error,
                    preview = %clip(&text, PREVIEW_CHARS),
                    "response is not JSON; using empty fragment"
                );
                return self.fallback();
            }
        };

        let validation = validate_json(&EXTRACTION_SCHEMA, &fragment);
        if !validation.valid {
            let errors: Vec<&String> = validation.errors.iter().take(5).collect();
            warn!(
                chunk = ordinal,
                total,
                errors = ?errors,
                preview = %clip(&text, PREVIEW_CHARS),
                "response violates extraction schema; using empty fragment"
            );
            return self.fallback();
        }

        debug!(chunk = ordinal, total, "chunk extracted");
        fragment
    }

    fn fallback(&self) -> Value {
        self.metrics.chunk_fallbacks.inc();
        empty_fragment()
    }
}

#[allow(clippy::cast_precision_loss)]
fn count(n: usize) -> f64 {
    n as f64
}
