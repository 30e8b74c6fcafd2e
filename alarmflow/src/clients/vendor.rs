//! Vendor polling transport.

use super::body_text;
use crate::errors::TransportError;
use crate::ports::PollTransport;
use async_trait::async_trait;

/// Issues polling requests with reqwest.
#[derive(Debug, Clone)]
pub struct HttpPollTransport {
    client: reqwest::Client,
}

impl HttpPollTransport {
    /// Wraps a configured client.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PollTransport for HttpPollTransport {
    async fn get(&self, url: &str, headers: &[(&'static str, String)]) -> Result<Vec<u8>, TransportError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: body_text(response).await,
            });
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| TransportError::from_reqwest(url, &e))
    }
}
