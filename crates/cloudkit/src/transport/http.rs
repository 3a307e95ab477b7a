//! HTTP transport backed by a `ureq` agent.

use super::{Method, Request, Response, Transport};
use crate::error::{Error, Result};
use crate::types::HttpSettings;
use async_trait::async_trait;

/// Header naming the user a call is made on behalf of.
const USER_HEADER: &str = "DuploUser";

/// Talks to the real management API.
///
/// `ureq` is blocking, so every call runs on tokio's blocking pool.
#[derive(Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    settings: HttpSettings,
}

impl HttpTransport {
    /// Create a transport, rejecting settings without a host or token.
    pub fn new(settings: HttpSettings) -> Result<Self> {
        let mut missing = Vec::new();
        if settings.host.trim().is_empty() {
            missing.push("host");
        }
        if settings.token.trim().is_empty() {
            missing.push("token");
        }
        if !missing.is_empty() {
            return Err(Error::Settings {
                message: format!("{} not set", missing.join(" and ")),
            });
        }

        let config = ureq::Agent::config_builder()
            .timeout_global(Some(settings.timeout))
            .http_status_as_error(false)
            .build();
        Ok(Self {
            agent: ureq::Agent::new_with_config(config),
            settings,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.host.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn call(agent: &ureq::Agent, settings: &HttpSettings, url: &str, request: &Request) -> Result<Response> {
        let network = |e: ureq::Error| Error::Network {
            path: request.path.clone(),
            message: e.to_string(),
        };
        let bearer = format!("Bearer {}", settings.token);
        let user = settings.user_account.as_deref().filter(|u| !u.is_empty());

        let mut response = match request.method {
            Method::Get | Method::Delete => {
                let mut builder = match request.method {
                    Method::Get => agent.get(url),
                    _ => agent.delete(url),
                };
                builder = builder
                    .header("Authorization", &bearer)
                    .header("Content-Type", "application/json");
                if let Some(user) = user {
                    builder = builder.header(USER_HEADER, user);
                }
                builder.call().map_err(network)?
            }
            Method::Post | Method::Put => {
                let mut builder = match request.method {
                    Method::Post => agent.post(url),
                    _ => agent.put(url),
                };
                builder = builder
                    .header("Authorization", &bearer)
                    .header("Content-Type", "application/json");
                if let Some(user) = user {
                    builder = builder.header(USER_HEADER, user);
                }
                match &request.body {
                    Some(body) => builder.send_json(body).map_err(network)?,
                    None => builder.send_empty().map_err(network)?,
                }
            }
        };

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| Error::Decode {
                path: request.path.clone(),
                message: e.to_string(),
            })?;
        Ok(Response { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let agent = self.agent.clone();
        let settings = self.settings.clone();
        let url = self.url(&request.path);
        let path = request.path.clone();
        tokio::task::spawn_blocking(move || Self::call(&agent, &settings, &url, &request))
            .await
            .map_err(|e| Error::Network {
                path,
                message: format!("request task failed: {e}"),
            })?
    }

    fn endpoint(&self) -> String {
        self.settings.host.clone()
    }
}
