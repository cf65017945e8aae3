//! 歌詞からの語彙抽出パイプライン。
//!
//! 正規化・チャンク分割 → チャンクごとの生成呼び出し → チャンク横断マージ →
//! レベル正規化 → 任意の永続化、の順に処理する。

pub mod accumulator;
pub mod chunker;
pub mod items;
pub mod level;
pub mod orchestrator;

pub use accumulator::Accumulator;
pub use chunker::{ChunkLimits, LyricChunker};
pub use items::{Collection, ExtractedItem, MergedResult};
pub use level::{CefrLevel, normalize_level, normalize_levels};
pub use orchestrator::{LyricsPipeline, PipelineError};
