//! Authenticated Table API client.
//!
//! Record queries never fail outward: transport errors, non-2xx statuses and
//! undecodable bodies are logged and come back as an empty result. Only a
//! failure to obtain a token is propagated.

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;

use crate::auth::CredentialManager;
use crate::error::AuthError;
use crate::types::TableQuery;

/// Records returned by one Table API call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub records: Vec<Value>,
    pub count: usize,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Normalize a Table API payload. A single-object `result` becomes a
    /// one-element list; an absent or empty one yields no records.
    pub fn from_payload(payload: &Value) -> Self {
        let records = match payload.get("result") {
            Some(Value::Array(items)) => items.clone(),
            Some(other) if is_truthy(other) => vec![other.clone()],
            _ => Vec::new(),
        };
        let count = records.len();
        Self { records, count }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub struct RecordClient {
    auth: Arc<CredentialManager>,
    http: reqwest::Client,
}

impl RecordClient {
    pub fn new(auth: Arc<CredentialManager>, http: reqwest::Client) -> Self {
        Self { auth, http }
    }

    /// GET `endpoint` on the instance with `params` as the query string.
    pub async fn execute(
        &self,
        endpoint: &str,
        params: &TableQuery,
    ) -> Result<QueryResult, AuthError> {
        let headers = self.auth.headers().await?;
        let url = format!("{}{}", self.auth.credential().instance_url(), endpoint);

        match self.fetch(&url, headers, params).await {
            Ok(payload) => {
                let result = QueryResult::from_payload(&payload);
                tracing::debug!("{} returned {} record(s)", endpoint, result.count);
                Ok(result)
            }
            Err(e) => {
                tracing::warn!("Record API request failed: {:#}", e);
                Ok(QueryResult::empty())
            }
        }
    }

    async fn fetch(&self, url: &str, headers: HeaderMap, params: &TableQuery) -> Result<Value> {
        let resp = self
            .http
            .get(url)
            .headers(headers)
            .query(&params.to_pairs())
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Record API error ({}): {}", status, body);
        }

        resp.json().await.context("Failed to parse record API response")
    }
}
