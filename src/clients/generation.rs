//! 生成バックエンド（chat completions 互換 API）クライアント。
mod client;
mod models;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::util::text::truncate_error_message;

pub use client::{GenerationClient, GenerationSettings};

/// Name and body of a JSON schema attached as `response_format`.
#[derive(Debug, Clone, Copy)]
pub struct NamedSchema<'a> {
    pub name: &'a str,
    pub schema: &'a Value,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// Developer (system) prompt. `None` uses the generic assistant prompt.
    pub developer_prompt: Option<&'a str>,
    pub content: &'a str,
    pub schema: Option<NamedSchema<'a>>,
}

impl<'a> GenerationRequest<'a> {
    #[must_use]
    pub fn chat(developer_prompt: Option<&'a str>, content: &'a str) -> Self {
        Self {
            developer_prompt,
            content,
            schema: None,
        }
    }

    #[must_use]
    pub fn with_schema(
        developer_prompt: Option<&'a str>,
        content: &'a str,
        name: &'a str,
        schema: &'a Value,
    ) -> Self {
        Self {
            developer_prompt,
            content,
            schema: Some(NamedSchema { name, schema }),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation backend returned {status}: {}", truncate_error_message(.body))]
    Status { status: u16, body: String },
    #[error("generation request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("generation request timed out after {0:?}")]
    Timeout(Duration),
}

/// プロンプトとスキーマからテキストを生成するバックエンド。
///
/// 実装はリトライしない。呼び出し側がタイムアウトとフォールバックを持つ。
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError>;
}
