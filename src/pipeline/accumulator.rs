//! チャンク横断のアキュムレータ。
//!
//! 自然キー（trim + 小文字化）で重複を除去し、後続チャンクは欠けている
//! フィールドだけを補完する。挿入順は最初に出現した順を保つ。

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::items::{Expression, Idiom, LexiconItem, MergedResult, Sentence, Word};

#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    words: IndexMap<String, Word>,
    expressions: IndexMap<String, Expression>,
    idioms: IndexMap<String, Idiom>,
    sentences: IndexMap<String, Sentence>,
}

impl Accumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one chunk fragment (`{"words": [...], ...}`) into the accumulator.
    ///
    /// Missing or non-array collections, non-object items and items without a
    /// natural key are ignored.
    pub fn accumulate(&mut self, fragment: &Value) -> &mut Self {
        merge_collection(&mut self.words, fragment);
        merge_collection(&mut self.expressions, fragment);
        merge_collection(&mut self.idioms, fragment);
        merge_collection(&mut self.sentences, fragment);
        self
    }

    /// Folds an already typed result, e.g. the output of another accumulator.
    pub fn accumulate_result(&mut self, result: &MergedResult) -> &mut Self {
        merge_items(&mut self.words, result.words.iter().cloned());
        merge_items(&mut self.expressions, result.expressions.iter().cloned());
        merge_items(&mut self.idioms, result.idioms.iter().cloned());
        merge_items(&mut self.sentences, result.sentences.iter().cloned());
        self
    }

    #[must_use]
    pub fn to_json(&self) -> MergedResult {
        MergedResult {
            words: self.words.values().cloned().collect(),
            expressions: self.expressions.values().cloned().collect(),
            idioms: self.idioms.values().cloned().collect(),
            sentences: self.sentences.values().cloned().collect(),
            levels_normalized: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len() + self.expressions.len() + self.idioms.len() + self.sentences.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[must_use]
pub fn natural_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn merge_collection<T>(target: &mut IndexMap<String, T>, fragment: &Value)
where
    T: LexiconItem + DeserializeOwned,
{
    let collection = T::COLLECTION;
    let Some(items) = fragment.get(collection.as_str()).and_then(Value::as_array) else {
        return;
    };

    let parsed = items.iter().filter_map(|raw| {
        if !raw.is_object() {
            debug!(collection = collection.as_str(), "skipping non-object item");
            return None;
        }
        match serde_json::from_value::<T>(raw.clone()) {
            Ok(item) => Some(item),
            Err(error) => {
                debug!(
                    collection = collection.as_str(),
                    error = %error,
                    "skipping item that does not fit the collection shape"
                );
                None
            }
        }
    });
    merge_items(target, parsed);
}

fn merge_items<T, I>(target: &mut IndexMap<String, T>, items: I)
where
    T: LexiconItem,
    I: IntoIterator<Item = T>,
{
    for mut item in items {
        let key = natural_key(item.natural_key());
        if key.is_empty() {
            continue;
        }
        match target.get_mut(&key) {
            Some(existing) => existing.enrich_from(&item),
            None => {
                let trimmed = item.natural_key().trim().to_string();
                *item.natural_key_mut() = trimmed;
                target.insert(key, item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_and_run_merge_without_overwrite() {
        let mut acc = Accumulator::new();
        acc.accumulate(&json!({
            "words": [{"word": "Run", "meaning": "to move fast"}]
        }))
        .accumulate(&json!({
            "words": [{"word": "run", "meaning": "to operate", "examples": "He runs daily"}]
        }));

        let result = acc.to_json();
        assert_eq!(result.words.len(), 1);
        let word = &result.words[0];
        assert_eq!(word.word, "Run");
        assert_eq!(word.meaning.as_deref(), Some("to move fast"));
        assert_eq!(word.examples.as_deref(), Some("He runs daily"));
    }

    #[test]
    fn skips_items_without_key_and_non_objects() {
        let mut acc = Accumulator::new();
        acc.accumulate(&json!({
            "words": [{"meaning": "orphan"}, "bare string", 42, {"word": "  "}],
            "idioms": [{"phrase": "break a leg", "meaning": "good luck"}]
        }));

        let result = acc.to_json();
        assert!(result.words.is_empty());
        assert_eq!(result.idioms.len(), 1);
    }

    #[test]
    fn ignores_missing_and_malformed_collections() {
        let mut acc = Accumulator::new();
        acc.accumulate(&json!({"words": "nope"}))
            .accumulate(&json!(null))
            .accumulate(&json!([]));

        assert!(acc.is_empty());
    }

    #[test]
    fn preserves_first_seen_order() {
        let mut acc = Accumulator::new();
        acc.accumulate(&json!({
            "sentences": [
                {"sentence": "b", "translation": "B"},
                {"sentence": "a", "translation": "A"}
            ]
        }))
        .accumulate(&json!({
            "sentences": [
                {"sentence": "c", "translation": "C"},
                {"sentence": "B", "translation": "ignored"}
            ]
        }));

        let keys: Vec<String> = acc
            .to_json()
            .sentences
            .into_iter()
            .map(|s| s.sentence)
            .collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn stores_trimmed_key() {
        let mut acc = Accumulator::new();
        acc.accumulate(&json!({"expressions": [{"expression": "  hang on ", "meaning": "wait"}]}));

        assert_eq!(acc.to_json().expressions[0].expression, "hang on");
    }

    #[test]
    fn unions_tags_and_examples_across_chunks() {
        let mut acc = Accumulator::new();
        acc.accumulate(&json!({
            "idioms": [{"phrase": "hit the road", "meaning": "leave", "tags": "travel", "examples": "Let's hit the road"}]
        }))
        .accumulate(&json!({
            "idioms": [{"phrase": "Hit the road", "tags": "travel, slang", "examples": "Let's hit the road | Time to hit the road"}]
        }));

        let result = acc.to_json();
        let idiom = &result.idioms[0];
        assert_eq!(idiom.tags.as_deref(), Some("travel, slang"));
        assert_eq!(
            idiom.examples.as_deref(),
            Some("Let's hit the road | Time to hit the road")
        );
    }

    #[test]
    fn merge_is_associative_over_fragments() {
        let f1 = json!({"words": [{"word": "run", "meaning": "m1", "tags": "a"}]});
        let f2 = json!({"words": [{"word": "RUN", "pos": "verb", "tags": "b"}, {"word": "go"}]});
        let f3 = json!({"words": [{"word": "go", "meaning": "m2", "tags": "c"}, {"word": "run", "tags": "a, c"}]});

        let mut left = Accumulator::new();
        left.accumulate(&f1).accumulate(&f2);
        let mut left_total = Accumulator::new();
        left_total
            .accumulate_result(&left.to_json())
            .accumulate(&f3);

        let mut right = Accumulator::new();
        right.accumulate(&f2).accumulate(&f3);
        let mut right_total = Accumulator::new();
        right_total
            .accumulate(&f1)
            .accumulate_result(&right.to_json());

        assert_eq!(left_total.to_json(), right_total.to_json());
    }
}
