//! 未翻訳行の一括翻訳（同期）。

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::line::{LineTranslator, load_context};
use crate::pipeline::PipelineError;
use crate::store::{LyricLine, SongDao};

const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BatchTranslator {
    songs: Arc<dyn SongDao>,
    translator: Arc<dyn LineTranslator>,
    timeout: Duration,
}

impl BatchTranslator {
    pub fn new(songs: Arc<dyn SongDao>, translator: Arc<dyn LineTranslator>) -> Self {
        Self {
            songs,
            translator,
            timeout: DEFAULT_BATCH_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 訳文のない行を1回の呼び出しでまとめて翻訳し、曲の全行を返す。
    ///
    /// 翻訳呼び出しが失敗・タイムアウトした場合は1行も更新せずに現在の行を返す。
    ///
    /// # Errors
    /// 行が1つもなければ `NotFound`。保存の失敗は `Store`。
    pub async fn fill_missing_translations(
        &self,
        song_id: &str,
    ) -> Result<Vec<LyricLine>, PipelineError> {
        let lines = self.songs.find_lines(song_id).await?;
        if lines.is_empty() {
            return Err(PipelineError::NotFound(format!("lyric lines for song {song_id}")));
        }

        let targets: Vec<&LyricLine> = lines.iter().filter(|line| line.needs_translation()).collect();
        if targets.is_empty() {
            return Ok(lines);
        }

        let sources: Vec<String> = targets
            .iter()
            .map(|line| line.source_text.as_deref().unwrap_or_default().trim().to_string())
            .collect();
        let context = load_context(self.songs.as_ref(), song_id).await;

        let translations = match tokio::time::timeout(
            self.timeout,
            self.translator.translate_lines(&sources, context.as_ref()),
        )
        .await
        {
            Ok(Ok(translations)) => translations,
            Ok(Err(error)) => {
                warn!(song_id, lines = sources.len(), error = %error, "batch translation failed");
                return Ok(lines);
            }
            Err(_) => {
                warn!(
                    song_id,
                    lines = sources.len(),
                    timeout_ms = self.timeout.as_millis(),
                    "batch translation timed out"
                );
                return Ok(lines);
            }
        };

        let mut updated = 0;
        for (line, translation) in targets.iter().zip(translations.iter()) {
            let translation = translation.trim();
            if translation.is_empty() {
                continue;
            }
            self.songs.update_line_translation(&line.id, translation).await?;
            updated += 1;
        }
        info!(song_id, requested = sources.len(), updated, "filled missing translations");

        Ok(self.songs.find_lines(song_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{Result, bail};
    use async_trait::async_trait;

    use super::*;
    use crate::store::InMemoryStore;
    use crate::translation::line::SongContext;

    enum Mode {
        Echo,
        Fail,
        Stall,
    }

    struct FakeTranslator(Mode);

    #[async_trait]
    impl LineTranslator for FakeTranslator {
        async fn translate_line(&self, source: &str, _context: Option<&SongContext>) -> Result<String> {
            Ok(format!("[{source}]"))
        }

        async fn translate_lines(
            &self,
            sources: &[String],
            _context: Option<&SongContext>,
        ) -> Result<Vec<String>> {
            match self.0 {
                Mode::Echo => Ok(sources.iter().map(|s| format!("[{s}]")).collect()),
                Mode::Fail => bail!("backend down"),
                Mode::Stall => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for (id, start, source, target) in [
            ("l1", 0, Some("hello"), None),
            ("l2", 1000, Some("there"), Some("거기")),
            ("l3", 2000, Some("friend"), Some(" ")),
            ("l4", 3000, None, None),
        ] {
            store
                .put_line(LyricLine {
                    id: id.into(),
                    song_id: "s1".into(),
                    start_time_ms: Some(start),
                    source_text: source.map(str::to_string),
                    target_text: target.map(str::to_string),
                })
                .await;
        }
        store
    }

    #[tokio::test]
    async fn fills_only_lines_without_translation() {
        let store = seeded_store().await;
        let batch = BatchTranslator::new(store.clone(), Arc::new(FakeTranslator(Mode::Echo)));

        let lines = batch.fill_missing_translations("s1").await.expect("fill");

        let targets: Vec<Option<&str>> = lines.iter().map(|l| l.target_text.as_deref()).collect();
        assert_eq!(targets, vec![Some("[hello]"), Some("거기"), Some("[friend]"), None]);
    }

    #[tokio::test]
    async fn translator_failure_leaves_lines_untouched() {
        let store = seeded_store().await;
        let batch = BatchTranslator::new(store, Arc::new(FakeTranslator(Mode::Fail)));

        let lines = batch.fill_missing_translations("s1").await.expect("fill");
        assert!(lines[0].target_text.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_leaves_lines_untouched() {
        let store = seeded_store().await;
        let batch = BatchTranslator::new(store, Arc::new(FakeTranslator(Mode::Stall)));

        let lines = batch.fill_missing_translations("s1").await.expect("fill");
        assert!(lines[0].target_text.is_none());
    }

    #[tokio::test]
    async fn unknown_song_is_not_found() {
        let batch = BatchTranslator::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(FakeTranslator(Mode::Echo)),
        );
        let error = batch
            .fill_missing_translations("missing")
            .await
            .expect_err("no lines");
        assert!(matches!(error, PipelineError::NotFound(_)));
    }
}
