//! 歌詞行の翻訳。
//!
//! 曲単位で1件ずつ実行されるリアルタイム翻訳（進捗イベント付き）と、
//! 未翻訳行をまとめて埋める同期バッチ翻訳の2系統を持つ。

pub mod batch;
pub mod cache;
pub mod events;
pub mod line;
pub mod publisher;
pub mod realtime;

pub use batch::BatchTranslator;
pub use cache::{InMemoryTranslationCache, TranslationCache, line_cache_key};
pub use events::{TranslationProgressEvent, TranslationStatus};
pub use line::{GenerationLineTranslator, LineTranslator, SongContext};
pub use publisher::{BroadcastPublisher, ProgressPublisher};
pub use realtime::{RealtimeTranslator, StartOutcome};
