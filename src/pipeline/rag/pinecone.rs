//! Pinecone data-plane client over the REST API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::index::{IndexStats, RemoteIndex, VectorRecord};
use super::types::{Metadata, ScoredMatch};
use super::RagError;

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const TIMEOUT_SECS: u64 = 30;

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Metadata>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct IndexDescription {
    host: String,
}

pub struct PineconeIndex {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl PineconeIndex {
    /// `host` is the index data-plane host, with or without scheme.
    pub fn new(host: &str, api_key: &str) -> Result<Self, RagError> {
        let host = host.trim().trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        Ok(Self {
            client: build_client()?,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    /// Look up the data-plane host of `index_name` through the control plane.
    pub fn connect(index_name: &str, api_key: &str) -> Result<Self, RagError> {
        Self::connect_via(CONTROL_PLANE_URL, index_name, api_key)
    }

    pub fn connect_via(control_url: &str, index_name: &str, api_key: &str) -> Result<Self, RagError> {
        let client = build_client()?;
        let url = format!("{}/indexes/{index_name}", control_url.trim_end_matches('/'));
        let response = client
            .get(&url)
            .header("Api-Key", api_key)
            .send()
            .map_err(|e| RagError::Index(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RagError::Index(format!("Pinecone index '{index_name}' not found")));
        }
        let description: IndexDescription = check(response)?
            .json()
            .map_err(|e| RagError::Index(format!("Invalid index description: {e}")))?;
        Self::new(&description.host, api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::blocking::Response, RagError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .map_err(|e| RagError::Index(e.to_string()))?;
        check(response)
    }
}

fn build_client() -> Result<reqwest::blocking::Client, RagError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(TIMEOUT_SECS))
        .build()
        .map_err(|e| RagError::Index(format!("HTTP client: {e}")))
}

fn check(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, RagError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(RagError::Index(format!("HTTP {status}: {body}")))
}

impl RemoteIndex for PineconeIndex {
    fn describe(&self) -> Result<IndexStats, RagError> {
        self.post("/describe_index_stats", &Value::Object(Default::default()))?
            .json()
            .map_err(|e| RagError::Index(format!("Invalid stats response: {e}")))
    }

    fn upsert(&self, records: &[VectorRecord]) -> Result<usize, RagError> {
        let parsed: UpsertResponse = self
            .post("/vectors/upsert", &UpsertRequest { vectors: records })?
            .json()
            .map_err(|e| RagError::Index(format!("Invalid upsert response: {e}")))?;
        Ok(parsed.upserted_count)
    }

    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<ScoredMatch>, RagError> {
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            filter: filter.filter(|f| !f.is_empty()),
        };
        let parsed: QueryResponse = self
            .post("/query", &body)?
            .json()
            .map_err(|e| RagError::Index(format!("Invalid query response: {e}")))?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| ScoredMatch {
                id: m.id,
                text: None,
                score: m.score,
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("Api-Key").and_then(|v| v.to_str().ok()) == Some("pc-key")
    }

    async fn spawn_pinecone() -> String {
        let app = Router::new()
            .route(
                "/describe_index_stats",
                post(|headers: HeaderMap| async move {
                    if !authorized(&headers) {
                        return Err(StatusCode::UNAUTHORIZED);
                    }
                    Ok(Json(json!({"totalVectorCount": 42, "dimension": 1536})))
                }),
            )
            .route(
                "/vectors/upsert",
                post(|Json(body): Json<Value>| async move {
                    let n = body["vectors"].as_array().map(|v| v.len()).unwrap_or(0);
                    Json(json!({ "upsertedCount": n }))
                }),
            )
            .route(
                "/query",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["topK"], 2);
                    assert_eq!(body["includeMetadata"], true);
                    let country = body["filter"]["country"].clone();
                    Json(json!({
                        "matches": [
                            {"id": "visa_us_b1/b2_chunk_1", "score": 0.91,
                             "metadata": {"country": country, "type": "visa_info"}},
                            {"id": "faq_0_chunk_1", "score": 0.4}
                        ]
                    }))
                }),
            )
            .route(
                "/indexes/:name",
                get(|axum::extract::Path(name): axum::extract::Path<String>| async move {
                    if name != "visabuddy-visa-kb" {
                        return Err(StatusCode::NOT_FOUND);
                    }
                    Ok(Json(json!({ "host": "127.0.0.1:1" })))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn data_plane_round_trip() {
        let base = spawn_pinecone().await;
        tokio::task::spawn_blocking(move || {
            let index = PineconeIndex::new(&base, "pc-key").unwrap();
            assert_eq!(index.describe().unwrap().total_vector_count, 42);

            let records = vec![VectorRecord {
                id: "a".into(),
                values: vec![0.1, 0.2],
                metadata: Metadata::new(),
            }];
            assert_eq!(index.upsert(&records).unwrap(), 1);

            let filter = crate::pipeline::rag::types::metadata(&[("country", "USA")]);
            let hits = index.query(&[0.1, 0.2], 2, Some(&filter)).unwrap();
            assert_eq!(hits.len(), 2);
            assert_eq!(hits[0].metadata["country"], "USA");
            assert!(hits[1].metadata.is_empty());
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn wrong_key_is_index_error() {
        let base = spawn_pinecone().await;
        let result = tokio::task::spawn_blocking(move || {
            PineconeIndex::new(&base, "nope").unwrap().describe()
        })
        .await
        .unwrap();
        assert!(matches!(result, Err(RagError::Index(msg)) if msg.contains("401")));
    }

    #[tokio::test]
    async fn control_plane_resolves_host() {
        let base = spawn_pinecone().await;
        tokio::task::spawn_blocking(move || {
            let index = PineconeIndex::connect_via(&base, "visabuddy-visa-kb", "pc-key").unwrap();
            assert_eq!(index.base_url(), "https://127.0.0.1:1");
            let missing = PineconeIndex::connect_via(&base, "other", "pc-key");
            assert!(matches!(missing, Err(RagError::Index(msg)) if msg.contains("not found")));
        })
        .await
        .unwrap();
    }

    #[test]
    fn host_without_scheme_gets_https() {
        let index = PineconeIndex::new("idx-abc.svc.pinecone.io/", "k").unwrap();
        assert_eq!(index.base_url(), "https://idx-abc.svc.pinecone.io");
    }
}
