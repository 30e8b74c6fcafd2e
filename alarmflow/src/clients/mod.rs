//! HTTP implementations of the ports.
//!
//! All clients share one `reqwest::Client` built by [`HttpSettings`], so
//! every outbound call carries the same timeout.

mod backend;
mod geoapify;
mod twilio;
mod vendor;

pub use backend::{clean_imei, BackendClient};
pub use geoapify::GeoapifyClient;
pub use twilio::TwilioClient;
pub use vendor::HttpPollTransport;

use crate::errors::AlarmflowError;
use std::time::Duration;

/// Default timeout for every outbound request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HTTP_TIMEOUT,
            user_agent: concat!("alarmflow/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpSettings {
    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds a `reqwest::Client` from these settings.
    pub fn build_client(&self) -> Result<reqwest::Client, AlarmflowError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| AlarmflowError::Config(format!("failed to build HTTP client: {e}")))
    }
}

/// Reads a response body for error reporting, never failing.
pub(crate) async fn body_text(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_default()
}
