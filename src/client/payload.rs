//! Request payload builders.
//!
//! Each builder starts from a set of defaults, then deep-merges caller
//! overrides on top. The [`RequestClient`](super::RequestClient) merges its own
//! options (usually the configured `model`) last.

use serde::Serialize;
use serde_json::{json, Map, Value};

/// An opaque JSON request body.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload(Value);

impl Payload {
    /// Borrow the underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume into the underlying JSON value.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Field lookup on the top-level object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deep-merge `options` into this payload; `options` win on conflict.
    pub fn merged_with(mut self, options: &Map<String, Value>) -> Self {
        merge_deep(&mut self.0, &Value::Object(options.clone()));
        self
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// `system`, `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl Message {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// A `user` message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    /// A `system` message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    /// An `assistant` message, for replaying earlier turns.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }
}

/// Merge `source` into `target`.
///
/// Nested objects are merged key by key; every other value in `source`
/// replaces the one in `target`. Non-object roots are left untouched.
pub fn merge_deep(target: &mut Value, source: &Value) {
    let (Value::Object(target), Value::Object(source)) = (target, source) else {
        return;
    };
    for (key, value) in source {
        if value.is_object() {
            let slot = target
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            merge_deep(slot, value);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn build(mut defaults: Value, overrides: Value) -> Payload {
    merge_deep(&mut defaults, &overrides);
    Payload(defaults)
}

/// Chat completion: `max_tokens` 256, `temperature` 0.7, `seed` 0.
///
/// ```rust
/// use serde_json::json;
/// use tokio_prompt_loadtest::client::payload::{chat_completion, Message};
///
/// let p = chat_completion(&[Message::user("hi")], json!({"max_tokens": 20}));
/// assert_eq!(p.get("max_tokens"), Some(&json!(20)));
/// assert_eq!(p.get("temperature"), Some(&json!(0.7)));
/// ```
pub fn chat_completion(messages: &[Message], overrides: Value) -> Payload {
    build(
        json!({
            "model": "gpt-3.5-turbo",
            "max_tokens": 256,
            "temperature": 0.7,
            "seed": 0,
            "messages": messages,
        }),
        overrides,
    )
}

/// Plain text completion: `max_tokens` 256, `temperature` 0.7, `seed` 0.
pub fn standard_completion(prompt: &str, overrides: Value) -> Payload {
    build(
        json!({
            "max_tokens": 256,
            "temperature": 0.7,
            "seed": 0,
            "prompt": prompt,
        }),
        overrides,
    )
}

/// Fill-in-the-middle completion using `<|fim_prefix|>` / `<|fim_suffix|>` /
/// `<|fim_middle|>` markers: `max_tokens` 512, `temperature` 0.
pub fn fim_completion(prefix: &str, suffix: &str, overrides: Value) -> Payload {
    build(
        json!({
            "max_tokens": 512,
            "temperature": 0,
            "seed": 0,
            "frequency_penalty": 1.25,
            "prompt": format!("<|fim_prefix|>{prefix}<|fim_suffix|>{suffix}<|fim_middle|>"),
        }),
        overrides,
    )
}

/// Embedding of one input text.
pub fn single_text_embedding(input: &str, overrides: Value) -> Payload {
    build(
        json!({
            "input": input,
            "model": "text-embedding-3-small",
        }),
        overrides,
    )
}

/// Batch embedding of several input texts.
pub fn multi_text_embedding<S: AsRef<str>>(inputs: &[S], overrides: Value) -> Payload {
    let inputs: Vec<&str> = inputs.iter().map(AsRef::as_ref).collect();
    build(
        json!({
            "input": inputs,
            "model": "text-embedding-3-small",
        }),
        overrides,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_completion_defaults() {
        let p = chat_completion(&[Message::user("hello")], Value::Null);
        assert_eq!(p.get("max_tokens"), Some(&json!(256)));
        assert_eq!(p.get("seed"), Some(&json!(0)));
        assert_eq!(p.get("messages"), Some(&json!([{"role": "user", "content": "hello"}])));
    }

    #[test]
    fn test_overrides_replace_scalars() {
        let p = chat_completion(
            &[Message::user("x")],
            json!({"max_tokens": 50, "temperature": 0.5}),
        );
        assert_eq!(p.get("max_tokens"), Some(&json!(50)));
        assert_eq!(p.get("temperature"), Some(&json!(0.5)));
    }

    #[test]
    fn test_fim_prompt_wraps_prefix_and_suffix() {
        let p = fim_completion("fn main() {", "}", Value::Null);
        assert_eq!(
            p.get("prompt"),
            Some(&json!("<|fim_prefix|>fn main() {<|fim_suffix|>}<|fim_middle|>"))
        );
        assert_eq!(p.get("max_tokens"), Some(&json!(512)));
        assert_eq!(p.get("temperature"), Some(&json!(0)));
    }

    #[test]
    fn test_standard_completion_carries_prompt() {
        let p = standard_completion("Once upon a time", Value::Null);
        assert_eq!(p.get("prompt"), Some(&json!("Once upon a time")));
    }

    #[test]
    fn test_multi_text_embedding_sends_array_input() {
        let p = multi_text_embedding(&["a", "b"], Value::Null);
        assert_eq!(p.get("input"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn test_merge_deep_merges_nested_objects() {
        let mut target = json!({"a": {"x": 1, "y": 2}, "b": 1});
        merge_deep(&mut target, &json!({"a": {"y": 3, "z": 4}, "c": 5}));
        assert_eq!(target, json!({"a": {"x": 1, "y": 3, "z": 4}, "b": 1, "c": 5}));
    }

    #[test]
    fn test_merge_deep_replaces_scalar_with_object() {
        let mut target = json!({"a": 1});
        merge_deep(&mut target, &json!({"a": {"b": 2}}));
        assert_eq!(target, json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_client_options_win_over_builder_defaults() {
        let mut options = Map::new();
        options.insert("model".into(), json!("llama-3"));
        let p = single_text_embedding("text", Value::Null).merged_with(&options);
        assert_eq!(p.get("model"), Some(&json!("llama-3")));
    }
}
