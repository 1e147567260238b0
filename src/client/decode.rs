//! Response decoding for OpenAI-compatible bodies.
//!
//! Two layers: [`parse_json`] / [`decode_usage`] never fail (a non-JSON body,
//! e.g. a 502 page from a load balancer, simply yields `None`), while
//! [`get_content`] / [`get_embeddings`] return [`HarnessError::Decode`] when
//! the body does not have one of the expected shapes.

use super::Response;
use crate::HarnessError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of characters of a body included in logs and errors.
pub const PREVIEW_CHARS: usize = 500;

/// Token accounting reported in a response's `usage` object.
///
/// Missing fields default to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt (or embedding input).
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Tokens generated.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Prompt plus completion.
    #[serde(default)]
    pub total_tokens: u64,
}

/// Extracted response content.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Completion text or chat message content.
    Text(String),
    /// The first embedding vector.
    Vector(Vec<f64>),
}

impl Content {
    /// Characters of text, or dimensions of a vector.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.chars().count(),
            Self::Vector(v) => v.len(),
        }
    }

    /// `true` for empty text or a zero-dimension vector.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The text, if this is text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Vector(_) => None,
        }
    }

    /// The vector, if this is embedding content.
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Self::Text(_) => None,
            Self::Vector(v) => Some(v),
        }
    }
}

/// Parse a body as JSON. Empty or non-JSON bodies yield `None`.
pub fn parse_json(body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice(body).ok()
}

/// The `usage` object of an already-parsed body, if present.
pub fn usage_of(body: &Value) -> Option<Usage> {
    body.get("usage")
        .filter(|u| u.is_object())
        .and_then(|u| Usage::deserialize(u).ok())
}

/// Decode `usage` straight from raw bytes.
pub fn decode_usage(body: &[u8]) -> Option<Usage> {
    parse_json(body).as_ref().and_then(usage_of)
}

/// First [`PREVIEW_CHARS`] characters of a body, lossily decoded.
pub fn preview(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(PREVIEW_CHARS)
        .collect()
}

fn vector(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

fn first_choice(body: &Value) -> Option<&Value> {
    body.get("choices")?.as_array()?.first()
}

/// Extract completion text, chat content, or the first embedding vector.
///
/// Checked in that order: non-empty `choices[0].text`, then
/// `choices[0].message.content`, then `data[0].embedding`.
///
/// # Errors
///
/// [`HarnessError::Decode`] for an empty or non-JSON body, or when none of
/// the three shapes match.
pub fn get_content(response: &Response) -> Result<Content, HarnessError> {
    let body = parse_json(&response.body)
        .ok_or_else(|| HarnessError::Decode("empty or non-JSON response body".into()))?;

    if let Some(choice) = first_choice(&body) {
        if let Some(text) = choice.get("text").and_then(Value::as_str) {
            if !text.is_empty() {
                return Ok(Content::Text(text.to_string()));
            }
        }
        if let Some(content) = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
        {
            return Ok(Content::Text(content.to_string()));
        }
    }

    if let Some(embedding) = body
        .get("data")
        .and_then(Value::as_array)
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
    {
        let v = vector(embedding)
            .ok_or_else(|| HarnessError::Decode("embedding is not a numeric array".into()))?;
        return Ok(Content::Vector(v));
    }

    Err(HarnessError::Decode(format!(
        "unknown response format: {}",
        preview(&response.body)
    )))
}

/// Extract every embedding vector from a (batch) embeddings response.
///
/// # Errors
///
/// [`HarnessError::Decode`] if `data` is absent or empty, or any item lacks
/// a numeric `embedding` array.
pub fn get_embeddings(response: &Response) -> Result<Vec<Vec<f64>>, HarnessError> {
    let not_embeddings = || {
        HarnessError::Decode(format!(
            "not an embeddings response: {}",
            preview(&response.body)
        ))
    };

    let body = parse_json(&response.body).ok_or_else(not_embeddings)?;
    let data = body
        .get("data")
        .and_then(Value::as_array)
        .filter(|d| !d.is_empty())
        .ok_or_else(not_embeddings)?;

    data.iter()
        .enumerate()
        .map(|(i, item)| {
            item.get("embedding").and_then(vector).ok_or_else(|| {
                HarnessError::Decode(format!("data[{i}] has no numeric embedding"))
            })
        })
        .collect()
}
