use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form document metadata (`type`, `country`, `visa_type`, ...).
pub type Metadata = Map<String, Value>;

/// A knowledge document or one of its chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbDocument {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl KbDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
        }
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Build metadata from string pairs.
pub fn metadata(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

/// A similarity hit from the cache or the remote index.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub id: String,
    /// Absent for remote matches, whose text lives locally.
    pub text: Option<String>,
    pub score: f32,
    pub metadata: Metadata,
}

/// Exact-match filters applied at retrieval time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalFilter {
    pub country: Option<String>,
    pub visa_type: Option<String>,
}

impl RetrievalFilter {
    pub fn new(country: Option<&str>, visa_type: Option<&str>) -> Self {
        let clean = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        Self {
            country: clean(country),
            visa_type: clean(visa_type),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.visa_type.is_none()
    }

    pub fn to_metadata(&self) -> Metadata {
        let mut map = Metadata::new();
        if let Some(country) = &self.country {
            map.insert("country".into(), Value::String(country.clone()));
        }
        if let Some(visa_type) = &self.visa_type {
            map.insert("visa_type".into(), Value::String(visa_type.clone()));
        }
        map
    }
}

/// Where retrieved context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    Pinecone,
    Cache,
    None,
}

/// One retrieved document as presented to prompts and API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagDocument {
    pub source: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub score: f32,
    pub content: String,
}

impl RagDocument {
    /// Label a match: country, else topic, else `Unknown`.
    pub fn from_match(matched: &ScoredMatch, content: String) -> Self {
        let field = |key: &str| matched.metadata.get(key).and_then(Value::as_str);
        Self {
            source: field("country")
                .or_else(|| field("topic"))
                .unwrap_or("Unknown")
                .to_string(),
            doc_type: field("type").unwrap_or("unknown").to_string(),
            score: matched.score,
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub documents: Vec<RagDocument>,
    pub query: String,
    pub sources: Vec<String>,
    pub count: usize,
    pub source: RetrievalSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RetrievedContext {
    pub fn new(query: &str, documents: Vec<RagDocument>, source: RetrievalSource) -> Self {
        let sources = documents.iter().map(|d| d.source.clone()).collect();
        Self {
            count: documents.len(),
            documents,
            query: query.to_string(),
            sources,
            source,
            error: None,
        }
    }

    pub fn empty(query: &str) -> Self {
        Self::new(query, Vec::new(), RetrievalSource::None)
    }

    pub fn failed(query: &str, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::empty(query)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(meta: Metadata) -> ScoredMatch {
        ScoredMatch {
            id: "x".into(),
            text: None,
            score: 0.5,
            metadata: meta,
        }
    }

    #[test]
    fn label_prefers_country_then_topic() {
        let m = scored(metadata(&[("country", "USA"), ("topic", "Fees"), ("type", "visa_info")]));
        let doc = RagDocument::from_match(&m, "text".into());
        assert_eq!(doc.source, "USA");
        assert_eq!(doc.doc_type, "visa_info");

        let m = scored(metadata(&[("topic", "Fees")]));
        assert_eq!(RagDocument::from_match(&m, String::new()).source, "Fees");

        let doc = RagDocument::from_match(&scored(Metadata::new()), String::new());
        assert_eq!(doc.source, "Unknown");
        assert_eq!(doc.doc_type, "unknown");
    }

    #[test]
    fn filter_drops_blank_values() {
        let f = RetrievalFilter::new(Some(" "), Some("Work"));
        assert_eq!(f.country, None);
        assert_eq!(f.to_metadata().len(), 1);
        assert!(RetrievalFilter::default().is_empty());
    }

    #[test]
    fn context_serializes_type_and_source() {
        let ctx = RetrievedContext::new(
            "q",
            vec![RagDocument {
                source: "UK".into(),
                doc_type: "faq".into(),
                score: 0.9,
                content: "c".into(),
            }],
            RetrievalSource::Cache,
        );
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["documents"][0]["type"], "faq");
        assert_eq!(json["source"], "cache");
        assert_eq!(json["sources"][0], "UK");
        assert_eq!(json["count"], 1);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failed_context_carries_error() {
        let ctx = RetrievedContext::failed("q", "boom");
        assert_eq!(ctx.source, RetrievalSource::None);
        assert_eq!(ctx.error.as_deref(), Some("boom"));
        assert!(ctx.is_empty());
    }
}
