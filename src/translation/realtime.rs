//! 曲単位のシングルフライト・リアルタイム翻訳。
//!
//! 同じ曲の翻訳は同時に1つだけ実行する。実行中の曲への再要求は待たずに
//! 即座に棄却し、進捗はイベントとしてのみ外部へ伝える。

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::cache::{TranslationCache, line_cache_key};
use super::events::TranslationProgressEvent;
use super::line::{LineTranslator, SongContext, load_context};
use super::publisher::ProgressPublisher;
use crate::observability::metrics::Metrics;
use crate::store::{LyricLine, SongDao};

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_LINE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct RealtimeSettings {
    pub cache_ttl: Duration,
    pub line_timeout: Duration,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            line_timeout: DEFAULT_LINE_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub enum StartOutcome {
    /// A background task was spawned; the handle resolves when it finishes.
    Started(JoinHandle<()>),
    AlreadyRunning,
}

impl StartOutcome {
    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started(_))
    }
}

#[derive(Clone)]
pub struct RealtimeTranslator {
    inner: Arc<Inner>,
}

struct Inner {
    songs: Arc<dyn SongDao>,
    translator: Arc<dyn LineTranslator>,
    cache: Arc<dyn TranslationCache>,
    publisher: Arc<dyn ProgressPublisher>,
    settings: RealtimeSettings,
    metrics: Arc<Metrics>,
    active: Mutex<HashSet<String>>,
}

/// Holds one song's slot in the active set and frees it on drop.
struct ActiveSongGuard {
    inner: Arc<Inner>,
    song_id: String,
}

impl ActiveSongGuard {
    fn acquire(inner: &Arc<Inner>, song_id: &str) -> Option<Self> {
        let inserted = inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(song_id.to_string());
        if !inserted {
            return None;
        }
        inner.metrics.active_translations.inc();
        Some(Self {
            inner: Arc::clone(inner),
            song_id: song_id.to_string(),
        })
    }
}

impl Drop for ActiveSongGuard {
    fn drop(&mut self) {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.song_id);
        self.inner.metrics.active_translations.dec();
        debug!(song_id = %self.song_id, "released translation slot");
    }
}

impl RealtimeTranslator {
    pub fn new(
        songs: Arc<dyn SongDao>,
        translator: Arc<dyn LineTranslator>,
        cache: Arc<dyn TranslationCache>,
        publisher: Arc<dyn ProgressPublisher>,
        settings: RealtimeSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                songs,
                translator,
                cache,
                publisher,
                settings,
                metrics,
                active: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// 曲の翻訳をバックグラウンドで開始する。
    ///
    /// 同じ曲が実行中なら何もせず `AlreadyRunning` を返す。
    pub fn start(&self, song_id: &str) -> StartOutcome {
        let Some(guard) = ActiveSongGuard::acquire(&self.inner, song_id) else {
            self.inner.metrics.translations_rejected.inc();
            info!(song_id, "translation already in progress; ignoring duplicate request");
            return StartOutcome::AlreadyRunning;
        };

        self.inner.metrics.translations_started.inc();
        let inner = Arc::clone(&self.inner);
        let song_id = song_id.to_string();
        StartOutcome::Started(tokio::spawn(async move {
            let _guard = guard;
            inner.run(&song_id).await;
        }))
    }

    #[must_use]
    pub fn is_running(&self, song_id: &str) -> bool {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(song_id)
    }
}

impl Inner {
    async fn run(&self, song_id: &str) {
        let lines = match self.songs.find_lines(song_id).await {
            Ok(lines) => lines,
            Err(error) => {
                error!(song_id, error = %error, "failed to load lyric lines");
                self.publish(&TranslationProgressEvent::error(song_id, 0, 0));
                return;
            }
        };
        if lines.is_empty() {
            warn!(song_id, "song has no lyric lines to translate");
            self.publish(&TranslationProgressEvent::error(song_id, 0, 0));
            return;
        }

        let already = lines.iter().filter(|line| line.is_translated()).count();
        let targets: Vec<&LyricLine> = lines.iter().filter(|line| line.needs_translation()).collect();
        if targets.is_empty() {
            info!(song_id, translated = already, "all lines already translated");
            self.publish(&TranslationProgressEvent::completed(song_id, already, already));
            return;
        }

        let total = targets.len();
        let context = load_context(self.songs.as_ref(), song_id).await;
        info!(song_id, total, already, "translation started");
        self.publish(&TranslationProgressEvent::started(song_id, total));

        let mut completed = 0;
        for line in targets {
            if let Some(target) = self.translate(line, context.as_ref()).await {
                completed += 1;
                self.publish(&TranslationProgressEvent::progress(line, &target, total, completed));
            }
        }

        info!(song_id, total, completed, "translation completed");
        self.publish(&TranslationProgressEvent::completed(song_id, total, completed));
    }

    /// Translation for one line, or `None` when it failed and was logged.
    async fn translate(&self, line: &LyricLine, context: Option<&SongContext>) -> Option<String> {
        let source = line.source_text.as_deref()?.trim();
        let key = line_cache_key(&line.song_id, &line.id);

        match self.cache.get(&key).await {
            Ok(Some(cached)) if !cached.trim().is_empty() => {
                self.metrics.translation_cache_hits.inc();
                debug!(line_id = %line.id, "translation cache hit");
                return self.persist(line, cached).await;
            }
            Ok(_) => {}
            Err(error) => {
                warn!(line_id = %line.id, error = %error, "translation cache read failed");
            }
        }

        let outcome = tokio::time::timeout(
            self.settings.line_timeout,
            self.translator.translate_line(source, context),
        )
        .await;
        let target = match outcome {
            Ok(Ok(target)) if !target.trim().is_empty() => target.trim().to_string(),
            Ok(Ok(_)) => {
                warn!(line_id = %line.id, "blank translation returned");
                self.metrics.line_failures.inc();
                return None;
            }
            Ok(Err(error)) => {
                warn!(line_id = %line.id, error = %error, "line translation failed");
                self.metrics.line_failures.inc();
                return None;
            }
            Err(_) => {
                warn!(
                    line_id = %line.id,
                    timeout_ms = self.settings.line_timeout.as_millis(),
                    "line translation timed out"
                );
                self.metrics.line_failures.inc();
                return None;
            }
        };

        if let Err(error) = self
            .cache
            .set(&key, &target, self.settings.cache_ttl)
            .await
        {
            warn!(line_id = %line.id, error = %error, "translation cache write failed");
        }
        self.persist(line, target).await
    }

    async fn persist(&self, line: &LyricLine, target: String) -> Option<String> {
        match self.songs.update_line_translation(&line.id, &target).await {
            Ok(()) => {
                self.metrics.lines_translated.inc();
                Some(target)
            }
            Err(error) => {
                warn!(line_id = %line.id, error = %error, "failed to save line translation");
                self.metrics.line_failures.inc();
                None
            }
        }
    }

    fn publish(&self, event: &TranslationProgressEvent) {
        if let Err(error) = self.publisher.publish(event) {
            warn!(
                channel = self.publisher.channel(),
                song_id = %event.song_id,
                error = %error,
                "failed to publish translation event"
            );
        }
    }
}
