//! IOPGPS token issuance.

use super::AccessToken;
use crate::errors::AuthError;
use crate::ports::TokenIssuer;
use crate::utils::now_unix;
use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Computes `md5_hex(md5_hex(login_key) + time)`.
#[must_use]
pub fn signature(login_key: &str, time: i64) -> String {
    let key_hash = hex::encode(Md5::digest(login_key.as_bytes()));
    hex::encode(Md5::digest(format!("{key_hash}{time}").as_bytes()))
}

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    appid: &'a str,
    time: i64,
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    code: i64,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    result: Option<String>,
}

/// Requests tokens from the IOPGPS auth endpoint.
#[derive(Debug, Clone)]
pub struct IopgpsTokenIssuer {
    client: reqwest::Client,
    url: String,
    app_id: String,
    login_key: String,
}

impl IopgpsTokenIssuer {
    /// Creates an issuer for the given endpoint and credentials.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        app_id: impl Into<String>,
        login_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            app_id: app_id.into(),
            login_key: login_key.into(),
        }
    }
}

#[async_trait]
impl TokenIssuer for IopgpsTokenIssuer {
    async fn issue(&self) -> Result<AccessToken, AuthError> {
        let time = now_unix();
        let request = AuthRequest {
            appid: &self.app_id,
            time,
            signature: signature(&self.login_key, time),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Request(format!("unexpected status code: {}", status.as_u16())));
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        if body.code != 0 {
            return Err(AuthError::Rejected {
                code: body.code,
                result: body.result.unwrap_or_default(),
            });
        }

        let value = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        tracing::debug!(expires_in = ?body.expires_in, "IOPGPS token issued");
        Ok(AccessToken::new(value, time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_nested_md5() {
        let key_hash = hex::encode(Md5::digest(b"secret"));
        assert_eq!(key_hash, "5ebe2294ecd0e0f08eab7690d2a6ee69");

        let expected = hex::encode(Md5::digest(format!("{key_hash}1700000000").as_bytes()));
        assert_eq!(signature("secret", 1_700_000_000), expected);
        assert_eq!(signature("secret", 1_700_000_000).len(), 32);
    }

    #[test]
    fn test_signature_depends_on_time() {
        assert_ne!(signature("secret", 1), signature("secret", 2));
    }

    #[test]
    fn test_auth_request_shape() {
        let request = AuthRequest {
            appid: "app",
            time: 5,
            signature: "sig".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"appid": "app", "time": 5, "signature": "sig"}));
    }
}
