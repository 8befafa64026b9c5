//! HTTP dataset backend.
//!
//! Talks JSON (and multipart, for uploads) to the dataset service:
//!
//! | Operation           | Request                        |
//! |---------------------|--------------------------------|
//! | list                | `GET /datasets`                |
//! | upload              | `POST /upload_csv` (multipart) |
//! | delete              | `DELETE /datasets?key=...`     |
//! | begin_preprocessing | `POST /begin_preprocessing`    |
//! | top_rows            | `POST /top_rows`               |

use crate::auth::Token;
use crate::backend::DatasetBackend;
use crate::error::{ErrorKind, Result};
use crate::models::{PreprocessReport, PreviewRow, RawItem, UploadReceipt};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, header::AUTHORIZATION};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::instrument;

/// Generous default; preprocessing large datasets server-side is slow.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TopRows {
    #[serde(default)]
    top_rows: Vec<PreviewRow>,
}

/// Dataset backend speaking to the service over HTTP(S).
///
/// # Examples
///
/// ```no_run
/// use tabula_storage::backend::HttpBackend;
/// use std::time::Duration;
///
/// # fn example() -> tabula_storage::error::Result<()> {
/// let backend = HttpBackend::new("api", "http://localhost:8000", Some(Duration::from_secs(30)))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpBackend {
    name: String,
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a new HTTP backend rooted at `base_url` (trailing slashes are ignored).
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| ErrorKind::BackendError(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            name: name.into(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach `Authorization: Bearer ...` only when there is a token to attach.
    fn authorize(request: RequestBuilder, token: Option<&Token>) -> RequestBuilder {
        match token {
            Some(token) => request.header(AUTHORIZATION, token.bearer()),
            None => request,
        }
    }

    async fn send(request: RequestBuilder, token: Option<&Token>) -> Result<Response> {
        let response =
            Self::authorize(request, token).send().await.map_err(|e| ErrorKind::Network(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = detail_from_body(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
        exn::bail!(ErrorKind::from_status(status.as_u16(), detail))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        Ok(response.json::<T>().await.map_err(|e| ErrorKind::InvalidResponse(e.to_string()))?)
    }
}

/// Pull the human-readable message out of an error body.
///
/// The service reports `{"detail": "..."}`; anything else non-empty is passed
/// through verbatim.
fn detail_from_body(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(fields)) => match fields.get("detail") {
            Some(Value::String(detail)) => Some(detail.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(body.to_string()),
        },
        _ => Some(body.to_string()),
    }
}

#[async_trait]
impl DatasetBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(backend = %self.name))]
    async fn list(&self, token: Option<&Token>) -> Result<Vec<RawItem>> {
        let response = Self::send(self.client.get(self.url("/datasets")), token).await?;
        let values: Vec<Value> = Self::decode(response).await?;
        let total = values.len();
        let items: Vec<RawItem> = values.into_iter().filter_map(RawItem::from_value).collect();
        if items.len() != total {
            tracing::warn!(skipped = total - items.len(), "Listing contained non-object records");
        }
        tracing::debug!(count = items.len(), "Listed datasets");
        Ok(items)
    }

    #[instrument(skip(self, token, data), fields(backend = %self.name, bytes = data.len()))]
    async fn upload(&self, token: Option<&Token>, file_name: &str, data: Vec<u8>) -> Result<UploadReceipt> {
        let form = Form::new().part("file", Part::bytes(data).file_name(file_name.to_string()));
        let response = Self::send(self.client.post(self.url("/upload_csv")).multipart(form), token).await?;
        Self::decode(response).await
    }

    #[instrument(skip(self, token), fields(backend = %self.name))]
    async fn delete(&self, token: Option<&Token>, key: &str) -> Result<()> {
        Self::send(self.client.delete(self.url("/datasets")).query(&[("key", key)]), token).await?;
        Ok(())
    }

    #[instrument(skip(self, token), fields(backend = %self.name))]
    async fn begin_preprocessing(&self, token: Option<&Token>, dataset_id: &str) -> Result<PreprocessReport> {
        let body = json!({ "dataset_id": dataset_id });
        let response = Self::send(self.client.post(self.url("/begin_preprocessing")).json(&body), token).await?;
        Self::decode(response).await
    }

    #[instrument(skip(self, token), fields(backend = %self.name))]
    async fn top_rows(
        &self,
        token: Option<&Token>,
        dataset_id: &str,
        target_column: Option<&str>,
    ) -> Result<Vec<PreviewRow>> {
        let body = json!({ "dataset_id": dataset_id, "target_column": target_column });
        let response = Self::send(self.client.post(self.url("/top_rows")).json(&body), token).await?;
        let rows: TopRows = Self::decode(response).await?;
        Ok(rows.top_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"detail": "Not your dataset"}"#, Some("Not your dataset"))]
    #[case(r#"{"detail": ["bad", "field"]}"#, Some(r#"["bad","field"]"#))]
    #[case("Internal Server Error", Some("Internal Server Error"))]
    #[case("   ", None)]
    fn test_detail_from_body(#[case] body: &str, #[case] expected: Option<&str>) {
        assert_eq!(detail_from_body(body).as_deref(), expected);
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let backend = HttpBackend::new("api", "http://localhost:8000///", None).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8000");
        assert_eq!(backend.url("/datasets"), "http://localhost:8000/datasets");
    }
}
