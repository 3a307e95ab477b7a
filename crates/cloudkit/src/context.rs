//! Explicit per-run provider context.

use crate::client::Client;
use declarative::WaitObserver;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything a lifecycle operation needs besides the resource itself.
///
/// Built once by the caller and passed to every operation.
#[derive(Clone)]
pub struct ProviderContext {
    client: Client,
    cancel: CancellationToken,
    observer: Option<Arc<dyn WaitObserver>>,
    poll_interval: Option<Duration>,
    wait_timeout: Option<Duration>,
}

impl ProviderContext {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cancel: CancellationToken::new(),
            observer: None,
            poll_interval: None,
            wait_timeout: None,
        }
    }

    /// Use an externally owned cancellation token, e.g. one tied to Ctrl-C.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn WaitObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Override every resource kind's poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Override every per-operation wait deadline.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn observer(&self) -> Option<&dyn WaitObserver> {
        self.observer.as_deref()
    }

    pub fn poll_interval(&self, default: Duration) -> Duration {
        self.poll_interval.unwrap_or(default)
    }

    pub fn wait_timeout(&self, default: Duration) -> Duration {
        self.wait_timeout.unwrap_or(default)
    }
}
