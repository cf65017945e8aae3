use serde::Serialize;
use serde_json::Value;

pub(crate) const DEFAULT_DEVELOPER_PROMPT: &str = "You are a helpful assistant.";

/// Chat completions リクエスト本体。
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) max_tokens: u32,
    pub(crate) temperature: f64,
    pub(crate) user: &'a str,
    pub(crate) messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) response_format: Option<ResponseFormat<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub(crate) role: &'static str,
    pub(crate) content: &'a str,
}

impl<'a> ChatMessage<'a> {
    pub(crate) fn developer(content: &'a str) -> Self {
        Self {
            role: "developer",
            content,
        }
    }

    pub(crate) fn user(content: &'a str) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    pub(crate) kind: &'static str,
    pub(crate) json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JsonSchemaFormat<'a> {
    pub(crate) name: &'a str,
    pub(crate) schema: &'a Value,
}

impl<'a> ResponseFormat<'a> {
    pub(crate) fn json_schema(name: &'a str, schema: &'a Value) -> Self {
        Self {
            kind: "json_schema",
            json_schema: JsonSchemaFormat { name, schema },
        }
    }
}

/// Pulls the assistant text out of a chat/responses style body.
///
/// Looks at `output_text`, then `choices[0].message.content` (string or the first
/// non-blank `{text}` part), then `output[0].content[].text`. Falls back to the raw
/// body when none of these carry text.
pub(crate) fn extract_assistant_text(body: &str) -> String {
    let Ok(root) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };

    if let Some(text) = root
        .get("output_text")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
    {
        return text.to_string();
    }

    if let Some(content) = root.pointer("/choices/0/message/content") {
        match content {
            Value::String(text) if !text.trim().is_empty() => return text.clone(),
            Value::Array(parts) => {
                if let Some(text) = first_text_part(parts) {
                    return text;
                }
            }
            _ => {}
        }
    }

    if let Some(parts) = root.pointer("/output/0/content").and_then(Value::as_array) {
        if let Some(text) = first_text_part(parts) {
            return text;
        }
    }

    body.to_string()
}

fn first_text_part(parts: &[Value]) -> Option<String> {
    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .find(|text| !text.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!({"output_text": "direct"}), "direct")]
    #[case(json!({"choices": [{"message": {"content": "{\"words\":[]}"}}]}), "{\"words\":[]}")]
    #[case(
        json!({"choices": [{"message": {"content": [{"text": "  "}, {"text": "part one"}, {"text": "part two"}]}}]}),
        "part one"
    )]
    #[case(json!({"output": [{"content": [{"type": "output_text", "text": "from output"}]}]}), "from output")]
    #[case(
        json!({"output_text": "  ", "choices": [{"message": {"content": "fallback"}}]}),
        "fallback"
    )]
    fn extract_assistant_text_follows_precedence(#[case] body: Value, #[case] expected: &str) {
        assert_eq!(extract_assistant_text(&body.to_string()), expected);
    }

    #[test]
    fn extract_assistant_text_returns_raw_body_otherwise() {
        assert_eq!(extract_assistant_text("not json"), "not json");
        let body = json!({"id": "x"}).to_string();
        assert_eq!(extract_assistant_text(&body), body);
    }

    #[test]
    fn chat_request_serializes_schema_format() {
        let schema = json!({"type": "object"});
        let request = ChatRequest {
            model: "gpt-4o-mini",
            max_tokens: 1500,
            temperature: 0.2,
            user: "service:parsing",
            messages: [ChatMessage::developer("sys"), ChatMessage::user("hi")],
            response_format: Some(ResponseFormat::json_schema("ParsingResponse", &schema)),
        };

        let value = serde_json::to_value(&request).expect("serialize");

        assert_eq!(value["messages"][0]["role"], "developer");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["response_format"]["type"], "json_schema");
        assert_eq!(value["response_format"]["json_schema"]["name"], "ParsingResponse");
        assert_eq!(value["response_format"]["json_schema"]["schema"], schema);
    }
}
