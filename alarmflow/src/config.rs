//! Configuration types for the alarm pipeline and its clients.

use crate::errors::AlarmflowError;
use crate::model::{AlarmCode, CRITICAL_CODES};
use crate::providers::{ProviderEndpoints, DEFAULT_LOOKBACK_SECONDS};
use crate::retry::RetryConfig;
use crate::utils::{fixed_offset, GUAYAQUIL_OFFSET_SECONDS};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Backend REST API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// API root, ending in `/api/v1/`.
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Key sent as `Authorization: Token <key>`.
    #[serde(default)]
    pub api_key: String,
}

fn default_backend_url() -> String {
    "https://api.road-safety-ec.com/api/v1/".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            api_key: String::new(),
        }
    }
}

/// IOPGPS settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IopgpsConfig {
    /// Alarm query endpoint.
    #[serde(default = "default_iopgps_alarm_url")]
    pub alarm_url: String,
    /// Token endpoint.
    #[serde(default = "default_iopgps_auth_url")]
    pub auth_url: String,
    /// Application id.
    #[serde(default)]
    pub app_id: String,
    /// Login key used to sign token requests.
    #[serde(default)]
    pub login_key: String,
}

fn default_iopgps_alarm_url() -> String {
    "https://open.iopgps.com/api/device/alarm".to_string()
}

fn default_iopgps_auth_url() -> String {
    "https://open.iopgps.com/api/auth".to_string()
}

impl Default for IopgpsConfig {
    fn default() -> Self {
        Self {
            alarm_url: default_iopgps_alarm_url(),
            auth_url: default_iopgps_auth_url(),
            app_id: String::new(),
            login_key: String::new(),
        }
    }
}

/// WhatsGPS settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhatsGpsConfig {
    /// Alarm detail endpoint.
    #[serde(default = "default_whatsgps_alarm_url")]
    pub alarm_url: String,
    /// API token.
    #[serde(default)]
    pub token: String,
}

fn default_whatsgps_alarm_url() -> String {
    "https://www.whatsgps.com/alarmSta/queryDetail.do".to_string()
}

impl Default for WhatsGpsConfig {
    fn default() -> Self {
        Self {
            alarm_url: default_whatsgps_alarm_url(),
            token: String::new(),
        }
    }
}

/// Geoapify settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoapifyConfig {
    /// API host.
    #[serde(default = "default_geoapify_url")]
    pub url: String,
    /// API key. Empty disables geocoding.
    #[serde(default)]
    pub api_key: String,
}

fn default_geoapify_url() -> String {
    "https://api.geoapify.com".to_string()
}

impl Default for GeoapifyConfig {
    fn default() -> Self {
        Self {
            url: default_geoapify_url(),
            api_key: String::new(),
        }
    }
}

/// Twilio settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwilioConfig {
    /// API host.
    #[serde(default = "default_twilio_url")]
    pub url: String,
    /// Account SID.
    #[serde(default)]
    pub account_sid: String,
    /// Auth token.
    #[serde(default)]
    pub auth_token: String,
    /// Sending WhatsApp number.
    #[serde(default = "default_twilio_from")]
    pub from: String,
}

fn default_twilio_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_twilio_from() -> String {
    "+14155238886".to_string()
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            url: default_twilio_url(),
            account_sid: String::new(),
            auth_token: String::new(),
            from: default_twilio_from(),
        }
    }
}

/// Per-stage concurrency ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// URL builder fan-out.
    #[serde(default = "default_url_builder")]
    pub url_builder: usize,
    /// Concurrent IOPGPS polls.
    #[serde(default = "default_iopgps_polls")]
    pub iopgps: usize,
    /// Concurrent WhatsGPS polls.
    #[serde(default = "default_whatsgps_polls")]
    pub whatsgps: usize,
    /// Concurrent alarm submissions.
    #[serde(default = "default_persist")]
    pub persist: usize,
    /// Concurrent notifications.
    #[serde(default = "default_notify")]
    pub notify: usize,
}

fn default_url_builder() -> usize {
    22
}

fn default_iopgps_polls() -> usize {
    5
}

fn default_whatsgps_polls() -> usize {
    10
}

fn default_persist() -> usize {
    25
}

fn default_notify() -> usize {
    25
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            url_builder: default_url_builder(),
            iopgps: default_iopgps_polls(),
            whatsgps: default_whatsgps_polls(),
            persist: default_persist(),
            notify: default_notify(),
        }
    }
}

/// Scheduler intervals in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Pipeline tick.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Device list refresh.
    #[serde(default = "default_device_refresh")]
    pub device_refresh_seconds: u64,
    /// Token refresh.
    #[serde(default = "default_token_refresh")]
    pub token_refresh_seconds: u64,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_device_refresh() -> u64 {
    300
}

fn default_token_refresh() -> u64 {
    600
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            device_refresh_seconds: default_device_refresh(),
            token_refresh_seconds: default_token_refresh(),
        }
    }
}

impl ScheduleConfig {
    /// Pipeline tick as a duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }

    /// Device refresh interval as a duration.
    #[must_use]
    pub fn device_refresh(&self) -> Duration {
        Duration::from_secs(self.device_refresh_seconds.max(1))
    }

    /// Token refresh interval as a duration.
    #[must_use]
    pub fn token_refresh(&self) -> Duration {
        Duration::from_secs(self.token_refresh_seconds.max(1))
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmflowConfig {
    /// Backend API.
    #[serde(default)]
    pub backend: BackendConfig,
    /// IOPGPS vendor.
    #[serde(default)]
    pub iopgps: IopgpsConfig,
    /// WhatsGPS vendor.
    #[serde(default)]
    pub whatsgps: WhatsGpsConfig,
    /// Reverse geocoding.
    #[serde(default)]
    pub geoapify: GeoapifyConfig,
    /// Message delivery.
    #[serde(default)]
    pub twilio: TwilioConfig,
    /// Concurrency ceilings.
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    /// Poll retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Scheduler intervals.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Timeout for every outbound request, in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    /// Window length for devices that were never polled.
    #[serde(default = "default_lookback")]
    pub lookback_seconds: i64,
    /// Codes that trigger notifications.
    #[serde(default = "default_critical_codes")]
    pub critical_codes: Vec<AlarmCode>,
    /// Offset used for message timestamps.
    #[serde(default = "default_offset")]
    pub local_utc_offset_seconds: i32,
    /// Offset in which WhatsGPS datetimes are read and written.
    #[serde(default = "default_offset")]
    pub vendor_utc_offset_seconds: i32,
    /// Whether advanced watermarks are pushed to the backend.
    #[serde(default = "default_push_watermarks")]
    pub push_watermarks: bool,
    /// File holding the current token across restarts.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

fn default_http_timeout() -> u64 {
    10
}

fn default_lookback() -> i64 {
    DEFAULT_LOOKBACK_SECONDS
}

fn default_critical_codes() -> Vec<AlarmCode> {
    CRITICAL_CODES.to_vec()
}

fn default_offset() -> i32 {
    GUAYAQUIL_OFFSET_SECONDS
}

fn default_push_watermarks() -> bool {
    true
}

impl Default for AlarmflowConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            iopgps: IopgpsConfig::default(),
            whatsgps: WhatsGpsConfig::default(),
            geoapify: GeoapifyConfig::default(),
            twilio: TwilioConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            retry: RetryConfig::default(),
            schedule: ScheduleConfig::default(),
            http_timeout_seconds: default_http_timeout(),
            lookback_seconds: default_lookback(),
            critical_codes: default_critical_codes(),
            local_utc_offset_seconds: default_offset(),
            vendor_utc_offset_seconds: default_offset(),
            push_watermarks: default_push_watermarks(),
            token_file: None,
        }
    }
}

impl AlarmflowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backend URL and key.
    #[must_use]
    pub fn with_backend(mut self, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.backend = BackendConfig {
            url: url.into(),
            api_key: api_key.into(),
        };
        self
    }

    /// Sets the IOPGPS credentials.
    #[must_use]
    pub fn with_iopgps_credentials(mut self, app_id: impl Into<String>, login_key: impl Into<String>) -> Self {
        self.iopgps.app_id = app_id.into();
        self.iopgps.login_key = login_key.into();
        self
    }

    /// Sets the WhatsGPS token.
    #[must_use]
    pub fn with_whatsgps_token(mut self, token: impl Into<String>) -> Self {
        self.whatsgps.token = token.into();
        self
    }

    /// Sets the concurrency ceilings.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: ConcurrencyConfig) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the scheduler intervals.
    #[must_use]
    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = schedule;
        self
    }

    /// Sets the notification allow-list.
    #[must_use]
    pub fn with_critical_codes(mut self, codes: Vec<AlarmCode>) -> Self {
        self.critical_codes = codes;
        self
    }

    /// Enables or disables pushing watermarks to the backend.
    #[must_use]
    pub fn with_push_watermarks(mut self, push: bool) -> Self {
        self.push_watermarks = push;
        self
    }

    /// Sets the token file.
    #[must_use]
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Request timeout as a duration.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    /// Offset used for message timestamps.
    pub fn local_offset(&self) -> Result<FixedOffset, AlarmflowError> {
        fixed_offset(self.local_utc_offset_seconds).map_err(|e| AlarmflowError::Config(e.to_string()))
    }

    /// Offset used for WhatsGPS datetimes.
    pub fn vendor_offset(&self) -> Result<FixedOffset, AlarmflowError> {
        fixed_offset(self.vendor_utc_offset_seconds).map_err(|e| AlarmflowError::Config(e.to_string()))
    }

    /// Builds the polling endpoints.
    pub fn endpoints(&self) -> Result<ProviderEndpoints, AlarmflowError> {
        Ok(ProviderEndpoints {
            iopgps_alarm_url: self.iopgps.alarm_url.clone(),
            whatsgps_alarm_url: self.whatsgps.alarm_url.clone(),
            whatsgps_token: self.whatsgps.token.clone(),
            vendor_offset: self.vendor_offset()?,
        })
    }

    /// Checks that the configuration can drive a pipeline.
    pub fn validate(&self) -> Result<(), AlarmflowError> {
        if self.backend.api_key.is_empty() {
            return Err(AlarmflowError::Config("backend API key is required".to_string()));
        }
        if self.lookback_seconds <= 0 {
            return Err(AlarmflowError::Config("lookback must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(AlarmflowError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.http_timeout_seconds == 0 {
            return Err(AlarmflowError::Config("HTTP timeout must be positive".to_string()));
        }
        self.local_offset()?;
        self.vendor_offset()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AlarmflowConfig::default();
        assert_eq!(config.concurrency.url_builder, 22);
        assert_eq!(config.concurrency.iopgps, 5);
        assert_eq!(config.concurrency.whatsgps, 10);
        assert_eq!(config.concurrency.persist, 25);
        assert_eq!(config.concurrency.notify, 25);
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.schedule.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.schedule.device_refresh(), Duration::from_secs(300));
        assert_eq!(config.schedule.token_refresh(), Duration::from_secs(600));
        assert_eq!(config.http_timeout(), Duration::from_secs(10));
        assert_eq!(config.lookback_seconds, 86_400);
        assert_eq!(config.critical_codes, CRITICAL_CODES.to_vec());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AlarmflowConfig = serde_json::from_str(
            r#"{"backend": {"api_key": "k"}, "critical_codes": ["SOS"], "concurrency": {"iopgps": 2}}"#,
        )
        .unwrap();

        assert_eq!(config.backend.url, "https://api.road-safety-ec.com/api/v1/");
        assert_eq!(config.critical_codes, vec![AlarmCode::Sos]);
        assert_eq!(config.concurrency.iopgps, 2);
        assert_eq!(config.concurrency.whatsgps, 10);
    }

    #[test]
    fn test_validate_requires_backend_key() {
        let err = AlarmflowConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("API key"));

        assert!(AlarmflowConfig::default()
            .with_backend("http://localhost/api/v1/", "k")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_offset() {
        let mut config = AlarmflowConfig::default().with_backend("http://x/", "k");
        config.vendor_utc_offset_seconds = 200_000;
        assert!(matches!(config.validate(), Err(AlarmflowError::Config(_))));
    }

    #[test]
    fn test_endpoints_carry_vendor_settings() {
        let endpoints = AlarmflowConfig::default()
            .with_whatsgps_token("wg")
            .endpoints()
            .unwrap();
        assert_eq!(endpoints.whatsgps_token, "wg");
        assert_eq!(endpoints.vendor_offset.local_minus_utc(), -18_000);
    }
}
