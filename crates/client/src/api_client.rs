//! HTTP API client for the chat server's REST surface.

use onechat_shared::{ApiError, FieldError};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// HTTP client for the `/api/v1` REST surface.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        crate::log_debug!("{} {}", method, url);
        let rb = self.client.request(method, url);
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    async fn execute(&self, rb: RequestBuilder) -> Result<String, ApiError> {
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            let err = ApiError::from_response(status, &text);
            crate::log_warn!("Request failed: {}", err);
            return Err(err);
        }
        Ok(text)
    }

    /// GET, unwrapping `content.data`
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let text = self.execute(self.request(Method::GET, path)).await?;
        decode_envelope(&text)
    }

    /// POST with an optional JSON body, unwrapping `content.data`
    pub async fn post_json<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&TReq>,
    ) -> Result<TRes, ApiError> {
        let mut rb = self.request(Method::POST, path);
        if let Some(body) = body {
            rb = rb.json(body);
        }
        let text = self.execute(rb).await?;
        decode_envelope(&text)
    }

    /// POST whose response is not wrapped in the `content` envelope (auth).
    pub async fn post_raw<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let text = self.execute(self.request(Method::POST, path).json(body)).await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// PATCH with JSON body, unwrapping `content.data`
    pub async fn patch_json<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let text = self.execute(self.request(Method::PATCH, path).json(body)).await?;
        decode_envelope(&text)
    }

    /// DELETE; whatever `content.data` holds is returned as-is.
    pub async fn delete_json(&self, path: &str) -> Result<Value, ApiError> {
        let text = self.execute(self.request(Method::DELETE, path)).await?;
        decode_envelope(&text)
    }

    /// Multipart POST carrying a single file field
    pub async fn post_multipart<TRes: DeserializeOwned>(
        &self,
        path: &str,
        field: &str,
        file_name: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<TRes, ApiError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|e| {
                ApiError::Validation(vec![FieldError {
                    param: Some(field.to_string()),
                    code: "INVALID_MIME".to_string(),
                    message: e.to_string(),
                }])
            })?;
        let form = Form::new().part(field.to_string(), part);

        let text = self
            .execute(self.request(Method::POST, path).multipart(form))
            .await?;
        decode_envelope(&text)
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode one dynamic path segment.
pub fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

/// Pull `content.data` out of a success body. An empty body or a missing
/// `data` decodes as `null`.
pub fn decode_envelope<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    let data = if text.trim().is_empty() {
        Value::Null
    } else {
        let mut body: Value =
            serde_json::from_str(text).map_err(|e| ApiError::Deserialize(e.to_string()))?;
        body.pointer_mut("/content/data")
            .map(Value::take)
            .unwrap_or(Value::Null)
    };
    serde_json::from_value(data).map_err(|e| ApiError::Deserialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use onechat_shared::{Group, UploadedFile};

    #[test]
    fn test_url_joins_base_and_path() {
        let api = ApiClient::new().with_base_url("http://localhost:3000/api/v1/");
        assert_eq!(api.url("/group/create"), "http://localhost:3000/api/v1/group/create");
        assert_eq!(api.url("user/"), "http://localhost:3000/api/v1/user/");
        assert_eq!(api.url("https://cdn.example/x"), "https://cdn.example/x");
    }

    #[test]
    fn test_segment_escapes_reserved_characters() {
        assert_eq!(segment("a/b c"), "a%2Fb%20c");
        assert_eq!(segment("g1"), "g1");
    }

    #[test]
    fn test_decode_envelope_unwraps_data() {
        let group: Group =
            decode_envelope(r#"{"content":{"data":{"id":"g1","name":"General"},"meta":{}}}"#)
                .unwrap();
        assert_eq!(group, Group::new("g1", "General"));

        let file: UploadedFile =
            decode_envelope(r#"{"content":{"data":{"url":"https://cdn/a.png"}}}"#).unwrap();
        assert_eq!(file.url, "https://cdn/a.png");
    }

    #[test]
    fn test_decode_envelope_tolerates_missing_data() {
        let empty: Value = decode_envelope("").unwrap();
        assert!(empty.is_null());
        let missing: Option<UploadedFile> = decode_envelope(r#"{"content":{}}"#).unwrap();
        assert!(missing.is_none());
        assert!(matches!(
            decode_envelope::<Group>("{broken"),
            Err(ApiError::Deserialize(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_retryable_network_error() {
        let api = ApiClient::new().with_base_url("http://127.0.0.1:9/api/v1");
        let err = api.get_json::<Value>("/user/").await.unwrap_err();
        assert!(err.is_retryable(), "{err:?}");
    }
}
