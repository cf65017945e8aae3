use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accepts any JSON scalar for an optional text field.
///
/// Model output occasionally carries numbers or booleans where strings are
/// expected; those are stringified, while objects and arrays are dropped.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        _ => None,
    })
}

/// Same as [`lenient_string`] for required text fields; absent values become empty.
pub fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}
