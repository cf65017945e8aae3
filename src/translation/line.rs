//! 生成バックエンドを使った行翻訳。

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::clients::{GenerationBackend, GenerationRequest};
use crate::prompt::TRANSLATION_PROMPT;
use crate::schema::translation::TRANSLATION_SCHEMA;
use crate::schema::validate_json;
use crate::store::{SongDao, SongRecord};
use crate::util::text::{clip, non_blank};

const DEFAULT_SCHEMA_NAME: &str = "lyrics_translation_v1";

/// 翻訳のヒントとして渡す曲情報。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artists: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
}

impl SongContext {
    /// `None` when the record carries no usable metadata.
    #[must_use]
    pub fn from_record(record: &SongRecord) -> Option<Self> {
        let context = Self {
            title: non_blank(record.title.as_deref()),
            artists: non_blank(record.artists.as_deref()),
            album: non_blank(record.album.as_deref()),
        };
        (context != Self::default()).then_some(context)
    }
}

/// Looks up song metadata; lookup failures only cost the hint.
pub(crate) async fn load_context(songs: &dyn SongDao, song_id: &str) -> Option<SongContext> {
    match songs.find_song(song_id).await {
        Ok(record) => record.as_ref().and_then(SongContext::from_record),
        Err(error) => {
            warn!(song_id, error = %error, "failed to load song metadata; translating without it");
            None
        }
    }
}

#[async_trait]
pub trait LineTranslator: Send + Sync {
    async fn translate_line(&self, source: &str, context: Option<&SongContext>) -> Result<String>;

    /// Translates every line in one request. The result has exactly one entry per input.
    async fn translate_lines(
        &self,
        sources: &[String],
        context: Option<&SongContext>,
    ) -> Result<Vec<String>>;
}

pub struct GenerationLineTranslator {
    backend: Arc<dyn GenerationBackend>,
    schema_name: String,
}

impl GenerationLineTranslator {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            schema_name: DEFAULT_SCHEMA_NAME.to_string(),
        }
    }

    #[must_use]
    pub fn with_schema_name(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = schema_name.into();
        self
    }
}

fn render_content(sources: &[String], context: Option<&SongContext>) -> Result<String> {
    let mut payload = json!({ "lines": sources });
    if let Some(context) = context {
        payload["song"] = serde_json::to_value(context).context("failed to encode song context")?;
    }
    serde_json::to_string(&payload).context("failed to encode translation request")
}

fn parse_translations(text: &str) -> Result<Vec<String>> {
    let value: Value = serde_json::from_str(text.trim())
        .with_context(|| format!("translation response is not JSON: {}", clip(text, 200)))?;
    let validation = validate_json(&TRANSLATION_SCHEMA, &value);
    if !validation.valid {
        bail!(
            "translation response violates schema: {}",
            validation.errors.join("; ")
        );
    }
    Ok(value["translations"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| item.as_str().unwrap_or_default().trim().to_string())
                .collect()
        })
        .unwrap_or_default())
}

#[async_trait]
impl LineTranslator for GenerationLineTranslator {
    async fn translate_line(&self, source: &str, context: Option<&SongContext>) -> Result<String> {
        let mut translations = self.translate_lines(&[source.to_string()], context).await?;
        Ok(translations.swap_remove(0))
    }

    async fn translate_lines(
        &self,
        sources: &[String],
        context: Option<&SongContext>,
    ) -> Result<Vec<String>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let content = render_content(sources, context)?;
        let request = GenerationRequest::with_schema(
            Some(TRANSLATION_PROMPT),
            &content,
            &self.schema_name,
            &TRANSLATION_SCHEMA,
        );
        let text = self.backend.generate(request).await?;
        let mut translations = parse_translations(&text)?;

        if translations.len() != sources.len() {
            warn!(
                expected = sources.len(),
                received = translations.len(),
                "translation count mismatch; aligning to input"
            );
        }
        translations.resize(sources.len(), String::new());
        debug!(lines = sources.len(), "translated lines");
        Ok(translations)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::clients::GenerationError;

    struct CannedBackend {
        reply: String,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerationBackend for CannedBackend {
        async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError> {
            self.seen
                .lock()
                .expect("seen")
                .push(request.content.to_string());
            Ok(self.reply.clone())
        }
    }

    fn translator(reply: Value) -> (Arc<CannedBackend>, GenerationLineTranslator) {
        let backend = Arc::new(CannedBackend {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        });
        (backend.clone(), GenerationLineTranslator::new(backend))
    }

    #[tokio::test]
    async fn translate_lines_aligns_to_input_length() {
        let (_, translator) = translator(json!({ "translations": ["하나"] }));
        let sources = vec!["one".to_string(), "two".to_string()];

        let translated = translator
            .translate_lines(&sources, None)
            .await
            .expect("translate");
        assert_eq!(translated, vec!["하나".to_string(), String::new()]);
    }

    #[tokio::test]
    async fn context_is_sent_with_lines() {
        let (backend, translator) = translator(json!({ "translations": [" 안녕 "] }));
        let context = SongContext {
            title: Some("Greeting".into()),
            ..SongContext::default()
        };

        let translated = translator
            .translate_line("hello", Some(&context))
            .await
            .expect("translate");
        assert_eq!(translated, "안녕");

        let sent: Value =
            serde_json::from_str(&backend.seen.lock().expect("seen")[0]).expect("json body");
        assert_eq!(sent["song"]["title"], "Greeting");
        assert_eq!(sent["lines"], json!(["hello"]));
    }

    #[tokio::test]
    async fn rejects_responses_outside_the_schema() {
        let (_, translator) = translator(json!({ "text": "안녕" }));
        assert!(translator.translate_line("hello", None).await.is_err());
    }

    #[test]
    fn context_from_record_ignores_blank_metadata() {
        let blank = SongRecord {
            song_id: "s1".into(),
            title: Some("  ".into()),
            ..SongRecord::default()
        };
        assert!(SongContext::from_record(&blank).is_none());

        let named = SongRecord {
            artists: Some("Band".into()),
            ..blank
        };
        assert_eq!(
            SongContext::from_record(&named).and_then(|c| c.artists),
            Some("Band".to_string())
        );
    }
}
