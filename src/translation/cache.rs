//! 行翻訳のTTLキャッシュ。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// キー・値・有効期限のみを扱う最小のキャッシュ。
#[async_trait]
pub trait TranslationCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

#[must_use]
pub fn line_cache_key(song_id: &str, line_id: &str) -> String {
    format!("lyrics:translation:{song_id}:{line_id}")
}

/// プロセス内キャッシュ。期限切れのエントリは読み出し時と書き込み時に捨てる。
#[derive(Debug, Default)]
pub struct InMemoryTranslationCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemoryTranslationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranslationCache for InMemoryTranslationCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, expires_at)) if *expires_at > Instant::now() => {
                    return Ok(Some(value.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // expired
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }
}
