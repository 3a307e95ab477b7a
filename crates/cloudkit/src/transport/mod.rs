//! Transport abstraction.
//!
//! A transport moves one JSON request to the management API and returns
//! the raw status and body. It knows nothing about retries or resource
//! kinds; [`crate::Client`] layers those on top.

mod http;
mod memory;

pub use http::HttpTransport;
pub use memory::{Collection, MemoryTransport, Route};

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// HTTP verbs the management API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One API call. `path` is relative to the host, without a leading slash.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw answer of the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A 200 response carrying `value` as JSON.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::new(200, value.to_string())
    }

    pub fn not_found() -> Self {
        Self::new(404, "")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body carries no document: empty, `null` or `""`.
    pub fn is_empty_body(&self) -> bool {
        matches!(self.body.trim(), "" | "null" | "\"\"")
    }
}

/// Moves requests to the API.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request. Only failures to get any answer are errors; every
    /// HTTP status comes back as a [`Response`].
    async fn send(&self, request: Request) -> Result<Response>;

    /// Human-readable endpoint for log and error messages.
    fn endpoint(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_detection() {
        assert!(Response::new(200, "").is_empty_body());
        assert!(Response::new(200, " null ").is_empty_body());
        assert!(Response::new(200, "\"\"").is_empty_body());
        assert!(!Response::new(200, "{}").is_empty_body());
    }

    #[test]
    fn test_response_success_range() {
        assert!(Response::new(204, "").is_success());
        assert!(!Response::not_found().is_success());
        assert!(!Response::new(302, "").is_success());
    }

    #[test]
    fn test_method_display() {
        assert_eq!(Method::Delete.to_string(), "DELETE");
        let request = Request::new(Method::Post, "v3/x").with_body(serde_json::json!({"a": 1}));
        assert_eq!(request.body.unwrap()["a"], 1);
    }
}
