/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // 抽出パイプライン
    pub chunks_processed: Counter,
    pub chunk_fallbacks: Counter,
    pub generation_failures: Counter,
    pub levels_normalized: Counter,
    pub items_saved: Counter,
    pub items_skipped: Counter,
    pub generation_skipped: Counter,

    // 翻訳
    pub translations_started: Counter,
    pub translations_rejected: Counter,
    pub lines_translated: Counter,
    pub translation_cache_hits: Counter,
    pub line_failures: Counter,

    // ヒストグラム
    pub generation_latency: Histogram,
    pub parse_duration: Histogram,

    // ゲージ
    pub active_translations: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            chunks_processed: register_counter_with_registry!(
                "lexicon_chunks_processed_total",
                "Total number of lyric chunks sent to the generation backend",
                registry
            )?,
            chunk_fallbacks: register_counter_with_registry!(
                "lexicon_chunk_fallbacks_total",
                "Chunks replaced by an empty fragment after a failed or malformed response",
                registry
            )?,
            generation_failures: register_counter_with_registry!(
                "lexicon_generation_failures_total",
                "Generation backend calls that failed or timed out",
                registry
            )?,
            levels_normalized: register_counter_with_registry!(
                "lexicon_levels_normalized_total",
                "Level fields rewritten or removed by normalization",
                registry
            )?,
            items_saved: register_counter_with_registry!(
                "lexicon_items_saved_total",
                "Extracted items inserted into storage",
                registry
            )?,
            items_skipped: register_counter_with_registry!(
                "lexicon_items_skipped_total",
                "Extracted items skipped on save (existing key or missing meaning)",
                registry
            )?,
            generation_skipped: register_counter_with_registry!(
                "lexicon_generation_skipped_total",
                "Parse-and-save calls answered from storage without generation",
                registry
            )?,
            translations_started: register_counter_with_registry!(
                "lexicon_translations_started_total",
                "Realtime song translations started",
                registry
            )?,
            translations_rejected: register_counter_with_registry!(
                "lexicon_translations_rejected_total",
                "Realtime song translations rejected because one was already running",
                registry
            )?,
            lines_translated: register_counter_with_registry!(
                "lexicon_lines_translated_total",
                "Lyric lines translated and persisted",
                registry
            )?,
            translation_cache_hits: register_counter_with_registry!(
                "lexicon_translation_cache_hits_total",
                "Line translations served from the cache",
                registry
            )?,
            line_failures: register_counter_with_registry!(
                "lexicon_line_failures_total",
                "Line translations that failed, timed out or came back blank",
                registry
            )?,
            generation_latency: register_histogram_with_registry!(
                "lexicon_generation_latency_seconds",
                "Latency of one generation backend call",
                registry
            )?,
            parse_duration: register_histogram_with_registry!(
                "lexicon_parse_duration_seconds",
                "Duration of a full lyrics parse",
                registry
            )?,
            active_translations: register_gauge_with_registry!(
                "lexicon_active_translations",
                "Songs currently being translated",
                registry
            )?,
        })
    }
}
