//! JSON:API wire envelopes: the `{"data": ...}` document shape and the
//! error objects the API answers conflicts and failures with.

use serde::Deserialize;
use serde_json::{json, Value};
use strata_core::JsonApiData;

/// Primary data of a document: a single resource or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    One(JsonApiData),
    Many(Vec<JsonApiData>),
}

impl PrimaryData {
    pub fn into_rows(self) -> Vec<JsonApiData> {
        match self {
            PrimaryData::One(d) => vec![d],
            PrimaryData::Many(ds) => ds,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorMeta {
    #[serde(rename = "duplicateResource")]
    pub duplicate_resource: Option<JsonApiData>,
}

/// One member of a JSON:API `errors` array. Only the fields the adapter
/// consumes are modeled; everything else is ignored on parse.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireError {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub meta: Option<ErrorMeta>,
}

impl WireError {
    /// The most specific human-readable message available.
    pub fn message(&self) -> Option<&str> {
        self.detail.as_deref().or(self.title.as_deref())
    }
}

/// A parsed response document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub data: Option<PrimaryData>,
    #[serde(default)]
    pub errors: Vec<WireError>,
}

impl Document {
    /// Parse a response body; an empty body is an empty document.
    pub fn parse(body: &str) -> Option<Document> {
        if body.trim().is_empty() {
            return Some(Document::default());
        }
        serde_json::from_str(body).ok()
    }

    pub fn first_error_message(&self) -> Option<&str> {
        self.errors.iter().find_map(|e| e.message())
    }

    /// The duplicate resource a conflict response points at, when present.
    pub fn duplicate_resource(&self) -> Option<JsonApiData> {
        self.errors
            .first()
            .and_then(|e| e.meta.as_ref())
            .and_then(|m| m.duplicate_resource.clone())
    }
}

/// Wrap outbound resource data in the `{"data": ...}` envelope.
pub fn envelope(data: &JsonApiData) -> Value {
    json!({ "data": data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_and_collection_documents() {
        let one = Document::parse(r#"{"data": {"type": "people", "id": "1"}}"#).unwrap();
        assert_eq!(one.data.unwrap().into_rows().len(), 1);

        let many =
            Document::parse(r#"{"data": [{"type": "people", "id": "1"}, {"type": "people", "id": "2"}]}"#)
                .unwrap();
        assert_eq!(many.data.unwrap().into_rows().len(), 2);

        let empty = Document::parse("").unwrap();
        assert!(empty.data.is_none());
        assert!(empty.errors.is_empty());
    }

    #[test]
    fn test_conflict_document_exposes_the_duplicate() {
        let doc = Document::parse(
            r#"{"errors": [{
                "title": "Duplicate Resource",
                "detail": "That email is taken",
                "meta": {"duplicateResource": {"type": "people", "id": "77"}}
            }]}"#,
        )
        .unwrap();
        assert_eq!(doc.first_error_message(), Some("That email is taken"));
        assert_eq!(doc.duplicate_resource().unwrap().id.as_deref(), Some("77"));
    }
}
