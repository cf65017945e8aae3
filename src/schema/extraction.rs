//! 抽出レスポンスのスキーマ。
//!
//! 4つの配列（words / expressions / idioms / sentences）を必須とし、
//! 各アイテムは `additionalProperties: false` で閉じる。

use once_cell::sync::Lazy;
use serde_json::{Map, Value, json};

use crate::pipeline::items::Collection;

pub static EXTRACTION_SCHEMA: Lazy<Value> = Lazy::new(build_schema);

/// (field, required) pairs per collection, in the order the model should emit them.
fn fields(collection: Collection) -> &'static [(&'static str, bool)] {
    match collection {
        Collection::Words => &[
            ("word", true),
            ("phonetic", false),
            ("meaning", true),
            ("pos", false),
            ("examples", false),
            ("level", false),
            ("tags", false),
        ],
        Collection::Expressions => &[
            ("expression", true),
            ("meaning", true),
            ("context", false),
            ("examples", false),
            ("tags", false),
            ("level", false),
        ],
        Collection::Idioms => &[
            ("phrase", true),
            ("meaning", true),
            ("examples", false),
            ("level", false),
            ("tags", false),
        ],
        Collection::Sentences => &[
            ("sentence", true),
            ("translation", true),
            ("tags", false),
            ("level", false),
        ],
    }
}

fn item_schema(collection: Collection) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (name, is_required) in fields(collection) {
        properties.insert((*name).to_string(), json!({ "type": "string" }));
        if *is_required {
            required.push(Value::String((*name).to_string()));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Builds the extraction response schema. Pure and deterministic.
#[must_use]
pub fn build_schema() -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for collection in Collection::ALL {
        properties.insert(
            collection.as_str().to_string(),
            json!({ "type": "array", "items": item_schema(collection) }),
        );
        required.push(Value::String(collection.as_str().to_string()));
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Fragment used in place of a chunk whose response could not be used.
#[must_use]
pub fn empty_fragment() -> Value {
    json!({ "words": [], "expressions": [], "idioms": [], "sentences": [] })
}
