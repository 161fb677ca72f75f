//! Reference retrieval over HTTP.
//!
//! The index is owned by a separate service and injected by URL. Without a URL
//! the retriever returns no references and prompts carry the no-references sentinel.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use twin_core::error::RetrievalError;
use twin_core::pipeline::Retriever;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpRetriever {
    client: reqwest::Client,
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    documents: Vec<String>,
}

impl HttpRetriever {
    pub fn new(client: reqwest::Client, url: Option<String>) -> Self {
        Self {
            client,
            url: url.filter(|u| !u.trim().is_empty()),
        }
    }

    pub fn from_env(client: reqwest::Client) -> Self {
        Self::new(client, std::env::var("TWIN_RETRIEVAL_URL").ok())
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

impl Retriever for HttpRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>, RetrievalError> {
        let Some(url) = &self.url else {
            return Ok(Vec::new());
        };

        let response = self
            .client
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .json(&RetrieveRequest { query, top_k })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| RetrievalError::Transport(e.to_string()))?;

        let parsed: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Malformed(e.to_string()))?;

        Ok(parsed
            .documents
            .into_iter()
            .filter(|doc| !doc.trim().is_empty())
            .take(top_k)
            .collect())
    }
}
