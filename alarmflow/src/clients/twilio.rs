//! Twilio WhatsApp delivery.

use super::body_text;
use crate::errors::DeliveryError;
use crate::ports::MessageDelivery;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct MessageResource {
    #[serde(default)]
    sid: String,
}

/// Sends WhatsApp messages through the Twilio Messages API.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioClient {
    /// Creates a client sending from the WhatsApp number `from`.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from: from.into(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url.trim_end_matches('/'),
            self.account_sid
        )
    }
}

/// Prefixes a number with the WhatsApp channel tag.
fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}

#[async_trait]
impl MessageDelivery for TwilioClient {
    async fn send(&self, recipient: &str, body: &str) -> Result<String, DeliveryError> {
        let to = whatsapp_address(recipient);
        let from = whatsapp_address(&self.from);
        let form = [("From", from.as_str()), ("To", to.as_str()), ("Body", body)];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| DeliveryError::Request {
                recipient: recipient.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                recipient: recipient.to_string(),
                status: status.as_u16(),
                body: body_text(response).await,
            });
        }

        let resource: MessageResource = response.json().await.map_err(|e| DeliveryError::Request {
            recipient: recipient.to_string(),
            message: e.to_string(),
        })?;

        Ok(resource.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whatsapp_address() {
        assert_eq!(whatsapp_address("+593991111111"), "whatsapp:+593991111111");
        assert_eq!(whatsapp_address("whatsapp:+14155238886"), "whatsapp:+14155238886");
    }

    #[test]
    fn test_messages_url() {
        let client = TwilioClient::new(reqwest::Client::new(), "https://api.twilio.com/", "AC123", "t", "+1");
        assert_eq!(
            client.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }
}
