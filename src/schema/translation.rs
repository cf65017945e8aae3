//! 行翻訳レスポンスのスキーマ。

use once_cell::sync::Lazy;
use serde_json::{Value, json};

pub static TRANSLATION_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "translations": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["translations"],
        "additionalProperties": false
    })
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate_json;

    #[test]
    fn accepts_string_array() {
        let payload = json!({"translations": ["안녕", "세상"]});
        assert!(validate_json(&TRANSLATION_SCHEMA, &payload).valid);
    }

    #[test]
    fn rejects_non_string_entries() {
        let payload = json!({"translations": [1, 2]});
        assert!(!validate_json(&TRANSLATION_SCHEMA, &payload).valid);
    }
}
