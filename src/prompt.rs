//! 開発者プロンプトの読み込み。
//!
//! ファイルパスが設定されていればそこから読み込み、`reload` が無効なら初回の
//! 内容をキャッシュする。読み込みに失敗した場合は組み込みのプロンプトを返す。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const DEFAULT_LYRICS_PROMPT: &str = "\
You extract study material from English song lyrics for Korean learners of English.
Return ONLY a JSON object with four arrays, no prose and no markdown:
- words: { word, phonetic?, meaning, pos?, examples?, level?, tags? }
- expressions: { expression, meaning, context?, examples?, tags?, level? }
- idioms: { phrase, meaning, examples?, level?, tags? }
- sentences: { sentence, translation, tags?, level? }

Rules:
1. Only include items that actually appear in the given lyrics. Never invent.
2. Prefer high recall: notable words (use the lemma), phrasal verbs and collocations,
   non-literal fixed phrases, and every natural sentence in order.
3. meaning: a short English gloss, then \" / \", then a short Korean gloss.
4. examples: one line; separate multiple short examples with \" | \".
5. tags: one comma-separated line.
6. level: one CEFR code (A1, A2, B1, B2, C1, C2) when you are confident, otherwise omit.
";

pub const TRANSLATION_PROMPT: &str = "\
You translate English song lyrics into natural Korean.
Translate each input line independently and keep the order.
Return ONLY a JSON object {\"translations\": [...]} with exactly one string per input line.
";

#[derive(Debug)]
pub struct PromptStore {
    lyrics_path: Option<PathBuf>,
    reload: bool,
    cached: RwLock<Option<String>>,
}

impl PromptStore {
    #[must_use]
    pub fn new(lyrics_path: Option<PathBuf>, reload: bool) -> Self {
        Self {
            lyrics_path,
            reload,
            cached: RwLock::new(None),
        }
    }

    /// Store that always serves the built-in prompt.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(None, false)
    }

    /// Returns the extraction developer prompt.
    pub async fn lyrics_prompt(&self) -> String {
        let Some(path) = &self.lyrics_path else {
            return DEFAULT_LYRICS_PROMPT.to_string();
        };

        if !self.reload {
            if let Some(cached) = self.cached.read().await.as_ref() {
                return cached.clone();
            }
        }

        match read_prompt(path).await {
            Ok(prompt) => {
                debug!(path = %path.display(), reload = self.reload, "loaded lyrics prompt");
                if !self.reload {
                    *self.cached.write().await = Some(prompt.clone());
                }
                prompt
            }
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "failed to load lyrics prompt; using built-in prompt"
                );
                DEFAULT_LYRICS_PROMPT.to_string()
            }
        }
    }
}

async fn read_prompt(path: &Path) -> Result<String> {
    let prompt = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read prompt file {}", path.display()))?;
    if prompt.trim().is_empty() {
        anyhow::bail!("prompt file {} is empty", path.display());
    }
    Ok(prompt)
}
