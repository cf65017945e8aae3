use serde::{Deserialize, Serialize};

use crate::store::LyricLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranslationStatus {
    Started,
    Progress,
    Completed,
    Error,
}

/// 翻訳進捗の通知。購読側は `song_id` で自分の曲を絞り込む。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationProgressEvent {
    pub song_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time_ms: Option<i64>,
    pub total_lines: usize,
    pub completed_lines: usize,
    pub status: TranslationStatus,
}

impl TranslationProgressEvent {
    fn summary(
        song_id: &str,
        total_lines: usize,
        completed_lines: usize,
        status: TranslationStatus,
    ) -> Self {
        Self {
            song_id: song_id.to_string(),
            line_id: None,
            source_text: None,
            target_text: None,
            start_time_ms: None,
            total_lines,
            completed_lines,
            status,
        }
    }

    #[must_use]
    pub fn started(song_id: &str, total_lines: usize) -> Self {
        Self::summary(song_id, total_lines, 0, TranslationStatus::Started)
    }

    #[must_use]
    pub fn progress(
        line: &LyricLine,
        target_text: &str,
        total_lines: usize,
        completed_lines: usize,
    ) -> Self {
        Self {
            song_id: line.song_id.clone(),
            line_id: Some(line.id.clone()),
            source_text: line.source_text.clone(),
            target_text: Some(target_text.to_string()),
            start_time_ms: line.start_time_ms,
            total_lines,
            completed_lines,
            status: TranslationStatus::Progress,
        }
    }

    #[must_use]
    pub fn completed(song_id: &str, total_lines: usize, completed_lines: usize) -> Self {
        Self::summary(song_id, total_lines, completed_lines, TranslationStatus::Completed)
    }

    #[must_use]
    pub fn error(song_id: &str, total_lines: usize, completed_lines: usize) -> Self {
        Self::summary(song_id, total_lines, completed_lines, TranslationStatus::Error)
    }
}
