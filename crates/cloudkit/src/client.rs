//! JSON client for the management API.

use crate::error::{Error, Result};
use crate::retry::{is_throttled, with_retry};
use crate::transport::{Method, Request, Response, Transport};
use crate::types::RetryConfig;
use serde_json::Value;
use std::sync::Arc;

/// Sends JSON requests through a [`Transport`] and decodes the answers.
///
/// Throttled calls ("Rate exceeded") are retried with exponential backoff.
/// Any other failure is returned to the caller as is.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> String {
        self.transport.endpoint()
    }

    /// Fetch a document. A 404 or an empty body means the object is absent.
    pub async fn get_json(&self, path: &str) -> Result<Option<Value>> {
        let response = match self.call(Method::Get, path, None).await {
            Ok(response) => response,
            Err(Error::Http { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        decode(path, &response)
    }

    /// Create an object. Returns the response document, if any.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        let response = self.call(Method::Post, path, Some(body.clone())).await?;
        decode(path, &response)
    }

    /// Replace an object. Returns the response document, if any.
    pub async fn put_json(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        let response = self.call(Method::Put, path, Some(body.clone())).await?;
        decode(path, &response)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.call(Method::Delete, path, None).await.map(|_| ())
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Response> {
        let label = format!("{method} {path}");
        with_retry(&self.retry, &label, || {
            let mut request = Request::new(method, path);
            request.body = body.clone();
            async move {
                log::trace!("{} {}", request.method, request.path);
                let response = self.transport.send(request).await?;
                log::trace!("{method} {path} -> {}", response.status);
                if response.is_success() {
                    return Ok(response);
                }
                let err = Error::Http {
                    path: path.to_string(),
                    status: response.status,
                    message: response.body.trim().to_string(),
                };
                if is_throttled(&err) {
                    log::debug!("{method} {path}: throttled");
                }
                Err(err)
            }
        })
        .await
    }
}

fn decode(path: &str, response: &Response) -> Result<Option<Value>> {
    if response.is_empty_body() {
        return Ok(None);
    }
    serde_json::from_str(&response.body)
        .map(|value: Value| (!value.is_null()).then_some(value))
        .map_err(|e| Error::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use serde_json::json;
    use std::time::Duration;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(1),
        }
    }

    fn client(transport: MemoryTransport) -> (Client, Arc<MemoryTransport>) {
        let transport = Arc::new(transport);
        (Client::new(transport.clone()).with_retry(fast_retry()), transport)
    }

    #[tokio::test]
    async fn test_get_json_absent_on_404_and_null() {
        let (client, _) = client(
            MemoryTransport::new().route(|r: &Request| (r.path == "v3/null").then(|| Response::new(200, "null"))),
        );
        assert_eq!(client.get_json("v3/missing").await.unwrap(), None);
        assert_eq!(client.get_json("v3/null").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_json_decodes_document() {
        let (client, _) = client(
            MemoryTransport::new().route(|_: &Request| Some(Response::json(&json!({"Status": "Deployed"})))),
        );
        let doc = client.get_json("v3/x").await.unwrap().unwrap();
        assert_eq!(doc["Status"], "Deployed");
    }

    #[tokio::test]
    async fn test_undecodable_body_is_decode_error() {
        let (client, _) = client(MemoryTransport::new().route(|_: &Request| Some(Response::new(200, "<html>"))));
        assert!(matches!(client.get_json("v3/x").await, Err(Error::Decode { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_exceeded_is_retried() {
        let (client, transport) = client(MemoryTransport::new().route(|_: &Request| Some(Response::new(200, ""))));
        transport.script(Method::Post, "v3/", Response::new(400, "Rate exceeded"));
        transport.script(Method::Post, "v3/", Response::new(429, ""));

        assert_eq!(client.post_json("v3/x", &json!({})).await.unwrap(), None);
        assert_eq!(transport.count(Method::Post), 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let (client, transport) = client(MemoryTransport::new());
        transport.script(Method::Put, "v3/", Response::new(400, "origin is invalid"));

        let err = client.put_json("v3/x", &json!({})).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("origin is invalid"));
        assert_eq!(transport.count(Method::Put), 1);
    }

    #[tokio::test]
    async fn test_delete_not_found_is_error() {
        let (client, _) = client(MemoryTransport::new());
        let err = client.delete("v3/x").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}
