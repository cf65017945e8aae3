use serde::{Deserialize, Serialize};

/// 保存・検索の範囲。曲 ID に加えて任意で状況（situation / location）を持つ。
///
/// 読み取りと自然キーの存在確認では、`None` のフィールドはワイルドカードとして扱う。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SongScope {
    pub song_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl SongScope {
    #[must_use]
    pub fn song(song_id: impl Into<String>) -> Self {
        Self {
            song_id: song_id.into(),
            situation: None,
            location: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, situation: Option<String>, location: Option<String>) -> Self {
        self.situation = crate::util::text::non_blank(situation.as_deref());
        self.location = crate::util::text::non_blank(location.as_deref());
        self
    }

    /// Whether a row stored under `stored` is visible through this scope.
    #[must_use]
    pub fn matches(&self, stored: &SongScope) -> bool {
        self.song_id == stored.song_id
            && self
                .situation
                .as_ref()
                .is_none_or(|s| stored.situation.as_ref() == Some(s))
            && self
                .location
                .as_ref()
                .is_none_or(|l| stored.location.as_ref() == Some(l))
    }
}

/// 曲のメタデータと全文歌詞。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRecord {
    pub song_id: String,
    pub lyrics: Option<String>,
    pub title: Option<String>,
    pub artists: Option<String>,
    pub album: Option<String>,
}

/// 時刻付きの歌詞行。翻訳フローが更新するのは `target_text` のみ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricLine {
    pub id: String,
    pub song_id: String,
    pub start_time_ms: Option<i64>,
    pub source_text: Option<String>,
    pub target_text: Option<String>,
}

impl LyricLine {
    /// Has source text but no translation yet.
    #[must_use]
    pub fn needs_translation(&self) -> bool {
        !crate::util::text::is_blank(self.source_text.as_deref())
            && crate::util::text::is_blank(self.target_text.as_deref())
    }

    #[must_use]
    pub fn is_translated(&self) -> bool {
        !crate::util::text::is_blank(self.source_text.as_deref())
            && !crate::util::text::is_blank(self.target_text.as_deref())
    }
}

/// Outcome counts of one `save_all` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub inserted: usize,
    pub skipped_existing: usize,
    pub skipped_blank_key: usize,
    pub skipped_missing_core: usize,
}

impl SaveReport {
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped_existing + self.skipped_blank_key + self.skipped_missing_core
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(source: Option<&str>, target: Option<&str>) -> LyricLine {
        LyricLine {
            id: "l1".into(),
            song_id: "s1".into(),
            start_time_ms: Some(0),
            source_text: source.map(str::to_string),
            target_text: target.map(str::to_string),
        }
    }

    #[test]
    fn song_scope_without_context_matches_any_context() {
        let query = SongScope::song("s1");
        let stored = SongScope::song("s1").with_context(Some("cafe".into()), None);
        assert!(query.matches(&stored));
        assert!(!SongScope::song("s2").matches(&stored));
    }

    #[test]
    fn song_scope_with_context_matches_exactly() {
        let query = SongScope::song("s1").with_context(Some("cafe".into()), Some("seoul".into()));
        let same = query.clone();
        let other = SongScope::song("s1").with_context(Some("office".into()), Some("seoul".into()));
        let bare = SongScope::song("s1");
        assert!(query.matches(&same));
        assert!(!query.matches(&other));
        assert!(!query.matches(&bare));
    }

    #[test]
    fn with_context_drops_blank_values() {
        let scope = SongScope::song("s1").with_context(Some("  ".into()), Some(" park ".into()));
        assert!(scope.situation.is_none());
        assert_eq!(scope.location.as_deref(), Some("park"));
    }

    #[test]
    fn translation_state_of_lines() {
        assert!(line(Some("hello"), None).needs_translation());
        assert!(line(Some("hello"), Some(" ")).needs_translation());
        assert!(!line(None, None).needs_translation());
        assert!(line(Some("hello"), Some("안녕")).is_translated());
    }
}
