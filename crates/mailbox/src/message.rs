//! Normalized message bodies
//!
//! The provider returns `text` and `html` either as a single string or as a
//! list of fragments. Both shapes are flattened here so extraction only ever
//! sees one string.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One message as fetched from `GET /messages/{id}`, text and html merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody {
    pub id: String,
    pub subject: String,
    content: String,
}

impl MessageBody {
    pub fn new(id: impl Into<String>, subject: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            content: content.into(),
        }
    }

    /// Build from the provider's message detail JSON.
    ///
    /// Content is `text` followed by `html`; missing fields count as empty.
    pub fn from_detail(id: &str, detail: &Value) -> Self {
        let subject = detail
            .get("subject")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let mut content = flatten(detail.get("text"));
        content.push_str(&flatten(detail.get("html")));
        Self::new(id, subject, content)
    }

    /// Text followed by html, fragments concatenated.
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// String as-is, list as the concatenation of its items, anything else empty.
fn flatten(field: Option<&Value>) -> String {
    match field {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => String::new(),
    }
}

/// Collection envelope used by `GET /messages` and `GET /domains`.
#[derive(Debug, Deserialize)]
pub(crate) struct Collection<T> {
    #[serde(rename = "hydra:member", alias = "member", default = "Vec::new")]
    pub members: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageSummary {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
}

/// Message ids arrive as strings from most providers and as integers from some.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct DomainEntry {
    #[serde(default)]
    pub domain: Option<String>,
}
