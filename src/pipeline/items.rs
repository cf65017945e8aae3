//! 抽出アイテムの型定義。
//!
//! 単語・表現・イディオム・文の4コレクションと、それらを束ねる
//! [`MergedResult`] を定義します。

use serde::{Deserialize, Serialize};

use crate::util::lenient::{lenient_string, lenient_text};

pub const EXAMPLE_SEPARATOR: &str = " | ";
pub const TAG_SEPARATOR: &str = ", ";

/// 4つの抽出コレクション。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Words,
    Expressions,
    Idioms,
    Sentences,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Words,
        Collection::Expressions,
        Collection::Idioms,
        Collection::Sentences,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Words => "words",
            Collection::Expressions => "expressions",
            Collection::Idioms => "idioms",
            Collection::Sentences => "sentences",
        }
    }

    /// Name of the natural-key field inside an item of this collection.
    #[must_use]
    pub fn key_field(self) -> &'static str {
        match self {
            Collection::Words => "word",
            Collection::Expressions => "expression",
            Collection::Idioms => "phrase",
            Collection::Sentences => "sentence",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    #[serde(default, deserialize_with = "lenient_text")]
    pub word: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub phonetic: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub examples: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expression {
    #[serde(default, deserialize_with = "lenient_text")]
    pub expression: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub examples: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idiom {
    #[serde(default, deserialize_with = "lenient_text")]
    pub phrase: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub examples: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    #[serde(default, deserialize_with = "lenient_text")]
    pub sentence: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// 4種のアイテムに共通する操作。
pub trait LexiconItem {
    const COLLECTION: Collection;

    fn natural_key(&self) -> &str;

    /// Mutable access to the natural key, used to store it trimmed.
    fn natural_key_mut(&mut self) -> &mut String;

    /// `meaning` for words, expressions and idioms; `translation` for sentences.
    fn core_text(&self) -> Option<&str>;

    fn level_mut(&mut self) -> &mut Option<String>;

    /// Fills fields that are absent on `self` from `other` and unions list-like fields.
    /// Present values on `self` are never overwritten.
    fn enrich_from(&mut self, other: &Self);
}

impl LexiconItem for Word {
    const COLLECTION: Collection = Collection::Words;

    fn natural_key(&self) -> &str {
        &self.word
    }

    fn natural_key_mut(&mut self) -> &mut String {
        &mut self.word
    }

    fn core_text(&self) -> Option<&str> {
        self.meaning.as_deref()
    }

    fn level_mut(&mut self) -> &mut Option<String> {
        &mut self.level
    }

    fn enrich_from(&mut self, other: &Self) {
        fill_if_absent(&mut self.meaning, other.meaning.as_deref());
        fill_if_absent(&mut self.pos, other.pos.as_deref());
        fill_if_absent(&mut self.phonetic, other.phonetic.as_deref());
        fill_if_absent(&mut self.level, other.level.as_deref());
        union_into(&mut self.examples, other.examples.as_deref(), EXAMPLE_SEPARATOR);
        union_into(&mut self.tags, other.tags.as_deref(), TAG_SEPARATOR);
    }
}

impl LexiconItem for Expression {
    const COLLECTION: Collection = Collection::Expressions;

    fn natural_key(&self) -> &str {
        &self.expression
    }

    fn natural_key_mut(&mut self) -> &mut String {
        &mut self.expression
    }

    fn core_text(&self) -> Option<&str> {
        self.meaning.as_deref()
    }

    fn level_mut(&mut self) -> &mut Option<String> {
        &mut self.level
    }

    fn enrich_from(&mut self, other: &Self) {
        fill_if_absent(&mut self.meaning, other.meaning.as_deref());
        fill_if_absent(&mut self.context, other.context.as_deref());
        fill_if_absent(&mut self.level, other.level.as_deref());
        union_into(&mut self.examples, other.examples.as_deref(), EXAMPLE_SEPARATOR);
        union_into(&mut self.tags, other.tags.as_deref(), TAG_SEPARATOR);
    }
}

impl LexiconItem for Idiom {
    const COLLECTION: Collection = Collection::Idioms;

    fn natural_key(&self) -> &str {
        &self.phrase
    }

    fn natural_key_mut(&mut self) -> &mut String {
        &mut self.phrase
    }

    fn core_text(&self) -> Option<&str> {
        self.meaning.as_deref()
    }

    fn level_mut(&mut self) -> &mut Option<String> {
        &mut self.level
    }

    fn enrich_from(&mut self, other: &Self) {
        fill_if_absent(&mut self.meaning, other.meaning.as_deref());
        fill_if_absent(&mut self.level, other.level.as_deref());
        union_into(&mut self.examples, other.examples.as_deref(), EXAMPLE_SEPARATOR);
        union_into(&mut self.tags, other.tags.as_deref(), TAG_SEPARATOR);
    }
}

impl LexiconItem for Sentence {
    const COLLECTION: Collection = Collection::Sentences;

    fn natural_key(&self) -> &str {
        &self.sentence
    }

    fn natural_key_mut(&mut self) -> &mut String {
        &mut self.sentence
    }

    fn core_text(&self) -> Option<&str> {
        self.translation.as_deref()
    }

    fn level_mut(&mut self) -> &mut Option<String> {
        &mut self.level
    }

    fn enrich_from(&mut self, other: &Self) {
        fill_if_absent(&mut self.translation, other.translation.as_deref());
        fill_if_absent(&mut self.level, other.level.as_deref());
        union_into(&mut self.tags, other.tags.as_deref(), TAG_SEPARATOR);
    }
}

/// Tagged view over one item of any collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedItem {
    Word(Word),
    Expression(Expression),
    Idiom(Idiom),
    Sentence(Sentence),
}

impl ExtractedItem {
    #[must_use]
    pub fn collection(&self) -> Collection {
        match self {
            ExtractedItem::Word(_) => Collection::Words,
            ExtractedItem::Expression(_) => Collection::Expressions,
            ExtractedItem::Idiom(_) => Collection::Idioms,
            ExtractedItem::Sentence(_) => Collection::Sentences,
        }
    }

    #[must_use]
    pub fn natural_key(&self) -> &str {
        match self {
            ExtractedItem::Word(item) => item.natural_key(),
            ExtractedItem::Expression(item) => item.natural_key(),
            ExtractedItem::Idiom(item) => item.natural_key(),
            ExtractedItem::Sentence(item) => item.natural_key(),
        }
    }

    pub(crate) fn natural_key_mut(&mut self) -> &mut String {
        match self {
            ExtractedItem::Word(item) => item.natural_key_mut(),
            ExtractedItem::Expression(item) => item.natural_key_mut(),
            ExtractedItem::Idiom(item) => item.natural_key_mut(),
            ExtractedItem::Sentence(item) => item.natural_key_mut(),
        }
    }

    #[must_use]
    pub fn core_text(&self) -> Option<&str> {
        match self {
            ExtractedItem::Word(item) => item.core_text(),
            ExtractedItem::Expression(item) => item.core_text(),
            ExtractedItem::Idiom(item) => item.core_text(),
            ExtractedItem::Sentence(item) => item.core_text(),
        }
    }
}

/// 4コレクションの統合結果。
///
/// ワイヤ形式・保存形式・再構築形式はすべて同じ形になる。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergedResult {
    #[serde(default)]
    pub words: Vec<Word>,
    #[serde(default)]
    pub expressions: Vec<Expression>,
    #[serde(default)]
    pub idioms: Vec<Idiom>,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
    /// Number of level fields rewritten or removed by the last normalization pass.
    #[serde(skip)]
    pub levels_normalized: usize,
}

impl PartialEq for MergedResult {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words
            && self.expressions == other.expressions
            && self.idioms == other.idioms
            && self.sentences == other.sentences
    }
}

impl MergedResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }

    #[must_use]
    pub fn total_items(&self) -> usize {
        self.words.len() + self.expressions.len() + self.idioms.len() + self.sentences.len()
    }

    /// Iterates every item in collection order (words, expressions, idioms, sentences).
    pub fn items(&self) -> impl Iterator<Item = ExtractedItem> + '_ {
        self.words
            .iter()
            .cloned()
            .map(ExtractedItem::Word)
            .chain(self.expressions.iter().cloned().map(ExtractedItem::Expression))
            .chain(self.idioms.iter().cloned().map(ExtractedItem::Idiom))
            .chain(self.sentences.iter().cloned().map(ExtractedItem::Sentence))
    }

    pub fn push(&mut self, item: ExtractedItem) {
        match item {
            ExtractedItem::Word(word) => self.words.push(word),
            ExtractedItem::Expression(expression) => self.expressions.push(expression),
            ExtractedItem::Idiom(idiom) => self.idioms.push(idiom),
            ExtractedItem::Sentence(sentence) => self.sentences.push(sentence),
        }
    }

    /// Every level slot across the four collections.
    pub(crate) fn level_slots(&mut self) -> impl Iterator<Item = &mut Option<String>> {
        self.words
            .iter_mut()
            .map(LexiconItem::level_mut)
            .chain(self.expressions.iter_mut().map(LexiconItem::level_mut))
            .chain(self.idioms.iter_mut().map(LexiconItem::level_mut))
            .chain(self.sentences.iter_mut().map(LexiconItem::level_mut))
    }
}

fn fill_if_absent(target: &mut Option<String>, candidate: Option<&str>) {
    let target_blank = target.as_deref().is_none_or(|v| v.trim().is_empty());
    if !target_blank {
        return;
    }
    if let Some(value) = candidate.filter(|v| !v.trim().is_empty()) {
        *target = Some(value.to_string());
    }
}

fn union_into(target: &mut Option<String>, incoming: Option<&str>, separator: &str) {
    *target = join_unique(target.as_deref(), incoming, separator);
}

/// Order-preserving, duplicate-free union of two separator-joined lists.
///
/// Parts are split on the trimmed separator (so `"a|b"` and `"a | b"` read
/// the same), trimmed, and re-joined with the canonical separator. Returns
/// `None` when both sides are blank.
#[must_use]
pub fn join_unique(existing: Option<&str>, incoming: Option<&str>, separator: &str) -> Option<String> {
    let split_on = separator.trim();
    let mut parts: indexmap::IndexSet<&str> = indexmap::IndexSet::new();
    for side in [existing, incoming].into_iter().flatten() {
        for part in side.split(split_on).map(str::trim).filter(|p| !p.is_empty()) {
            parts.insert(part);
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.into_iter().collect::<Vec<_>>().join(separator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(Some("a | b"), Some("b | c"), Some("a | b | c"))]
    #[case(Some("a|b"), Some("a"), Some("a | b"))]
    #[case(None, Some("x"), Some("x"))]
    #[case(Some("  "), None, None)]
    #[case(None, None, None)]
    fn join_unique_examples(
        #[case] existing: Option<&str>,
        #[case] incoming: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(
            join_unique(existing, incoming, EXAMPLE_SEPARATOR).as_deref(),
            expected
        );
    }

    #[test]
    fn join_unique_tags_use_comma() {
        assert_eq!(
            join_unique(Some("verb, motion"), Some("motion,sport"), TAG_SEPARATOR).as_deref(),
            Some("verb, motion, sport")
        );
    }

    #[test]
    fn enrich_never_overwrites_present_fields() {
        let mut first = Word {
            word: "Run".into(),
            meaning: Some("to move fast".into()),
            ..Word::default()
        };
        let second = Word {
            word: "run".into(),
            meaning: Some("to operate".into()),
            pos: Some("verb".into()),
            examples: Some("He runs daily".into()),
            ..Word::default()
        };

        first.enrich_from(&second);

        assert_eq!(first.word, "Run");
        assert_eq!(first.meaning.as_deref(), Some("to move fast"));
        assert_eq!(first.pos.as_deref(), Some("verb"));
        assert_eq!(first.examples.as_deref(), Some("He runs daily"));
    }

    #[test]
    fn enrich_treats_blank_as_absent() {
        let mut first = Sentence {
            sentence: "I run".into(),
            translation: Some("  ".into()),
            ..Sentence::default()
        };
        let second = Sentence {
            sentence: "i run".into(),
            translation: Some("나는 달린다".into()),
            ..Sentence::default()
        };

        first.enrich_from(&second);

        assert_eq!(first.translation.as_deref(), Some("나는 달린다"));
    }

    #[test]
    fn merged_result_serializes_four_arrays() {
        let value = serde_json::to_value(MergedResult::default()).expect("serialize");
        assert_eq!(
            value,
            json!({"words": [], "expressions": [], "idioms": [], "sentences": []})
        );
    }

    #[test]
    fn merged_result_equality_ignores_diagnostics() {
        let a = MergedResult {
            levels_normalized: 3,
            ..MergedResult::default()
        };
        assert_eq!(a, MergedResult::default());
    }

    #[test]
    fn items_iterates_in_collection_order() {
        let mut result = MergedResult::default();
        result.push(ExtractedItem::Sentence(Sentence {
            sentence: "s".into(),
            ..Sentence::default()
        }));
        result.push(ExtractedItem::Word(Word {
            word: "w".into(),
            ..Word::default()
        }));

        let order: Vec<Collection> = result.items().map(|item| item.collection()).collect();
        assert_eq!(order, vec![Collection::Words, Collection::Sentences]);
    }
}
