//! Backend REST client: devices, alarms and contacts.

use super::body_text;
use crate::errors::ApiError;
use crate::model::{Alarm, Device};
use crate::ports::{AlarmStore, ContactDirectory, DeviceSource};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

/// Strips whitespace from an IMEI and checks that only digits remain.
pub fn clean_imei(raw: &str) -> Result<String, ApiError> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::InvalidImei(raw.to_string()));
    }
    Ok(cleaned)
}

#[derive(Debug, Deserialize)]
struct UserPhones {
    #[serde(default)]
    phone_numbers: Vec<PhoneNumber>,
}

#[derive(Debug, Deserialize)]
struct PhoneNumber {
    phone_number: String,
}

/// Client for the fleet backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl BackendClient {
    /// Creates a client. `base_url` is the API root, e.g. `https://host/api/v1/`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn auth(&self) -> String {
        format!("Token {}", self.api_key)
    }

    async fn send_get(&self, url: &str) -> Result<reqwest::Response, ApiError> {
        self.client
            .get(url)
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| ApiError::request(url, &e))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::unexpected_status(url, status.as_u16(), body_text(response).await));
        }
        response.json().await.map_err(|e| ApiError::decode(url, e.to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self.send_get(url).await?;
        Self::read_json(url, response).await
    }

    /// Like `get_json`, but a 404 means the resource does not exist.
    async fn get_optional<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<Option<T>, ApiError> {
        let response = self.send_get(url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::read_json(url, response).await.map(Some)
    }

    async fn post_json<T: serde::Serialize + Sync>(
        &self,
        url: &str,
        payload: &T,
        accepted: &[StatusCode],
    ) -> Result<StatusCode, ApiError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", self.auth())
            .json(payload)
            .send()
            .await
            .map_err(|e| ApiError::request(url, &e))?;

        let status = response.status();
        if accepted.contains(&status) {
            Ok(status)
        } else {
            Err(ApiError::unexpected_status(url, status.as_u16(), body_text(response).await))
        }
    }
}

#[async_trait]
impl DeviceSource for BackendClient {
    async fn list_tracked_devices(&self) -> Result<Vec<Device>, ApiError> {
        let url = self.url("devices/?is_tracking_alarms=true");
        self.get_json(&url).await
    }

    async fn update_device(&self, device: &Device) -> Result<(), ApiError> {
        let url = self.url("devices/");
        self.post_json(&url, device, &[StatusCode::CREATED]).await?;
        Ok(())
    }
}

#[async_trait]
impl AlarmStore for BackendClient {
    async fn create_alarm(&self, alarm: &Alarm) -> Result<(), ApiError> {
        let url = self.url("alarms/");
        let status = self
            .post_json(&url, alarm, &[StatusCode::CREATED, StatusCode::ALREADY_REPORTED])
            .await?;
        if status == StatusCode::ALREADY_REPORTED {
            tracing::debug!(device_id = %alarm.device_id, time = alarm.time, "Alarm already stored");
        }
        Ok(())
    }
}

#[async_trait]
impl ContactDirectory for BackendClient {
    async fn device(&self, device_id: &str) -> Result<Option<Device>, ApiError> {
        let imei = clean_imei(device_id)?;
        self.get_optional(&self.url(&format!("devices/{imei}/"))).await
    }

    async fn recipients(&self, device_id: &str) -> Result<Vec<String>, ApiError> {
        let imei = clean_imei(device_id)?;
        let users: Option<Vec<UserPhones>> = self.get_optional(&self.url(&format!("devices/{imei}/phones/"))).await?;

        Ok(users
            .unwrap_or_default()
            .into_iter()
            .flat_map(|u| u.phone_numbers)
            .map(|p| p.phone_number)
            .filter(|n| !n.trim().is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_imei_strips_spaces() {
        assert_eq!(clean_imei(" 8604 1905 0021378 ").unwrap(), "860419050021378");
    }

    #[test]
    fn test_clean_imei_rejects_non_digits() {
        assert!(matches!(clean_imei("86041A"), Err(ApiError::InvalidImei(_))));
        assert!(matches!(clean_imei("   "), Err(ApiError::InvalidImei(_))));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = BackendClient::new(reqwest::Client::new(), "https://host/api/v1/", "k");
        assert_eq!(client.url("alarms/"), "https://host/api/v1/alarms/");

        let client = BackendClient::new(reqwest::Client::new(), "https://host/api/v1", "k");
        assert_eq!(client.url("alarms/"), "https://host/api/v1/alarms/");
    }

    #[test]
    fn test_phone_payload_shape() {
        let json = r#"[{"user":"u1","phone_numbers":[{"phone_number":"+593991111111"}]},{"user":"u2","phone_numbers":[]}]"#;
        let users: Vec<UserPhones> = serde_json::from_str(json).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].phone_numbers[0].phone_number, "+593991111111");
    }
}
