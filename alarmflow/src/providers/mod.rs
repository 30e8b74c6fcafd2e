//! Vendor polling endpoints and payload adapters.
//!
//! Each vendor has its own URL scheme, response envelope and alarm schema.
//! [`ProviderEndpoints`] hides those differences behind two calls used by the
//! pipeline: [`ProviderEndpoints::build_url`] and [`ProviderEndpoints::decode`].

mod iopgps;
mod whatsgps;

pub use iopgps::{IopgpsAdapter, IopgpsAlarm, IopgpsEnvelope};
pub use whatsgps::{whatsgps_alarm_code, whatsgps_alarm_type, WhatsGpsAdapter, WhatsGpsAlarm, WhatsGpsEnvelope};

use crate::errors::{DecodeError, ProviderError};
use crate::model::{Alarm, Provider};
use crate::utils::format_vendor_datetime;
use chrono::FixedOffset;
use reqwest::Url;

/// Lookback used when a device has never been polled.
pub const DEFAULT_LOOKBACK_SECONDS: i64 = 86_400;

/// Maps one raw vendor record to exactly one canonical alarm.
pub trait AlarmAdapter {
    /// The vendor's raw alarm record.
    type Raw;

    /// Converts the raw record. Never fails; unknown codes map to a sentinel.
    fn to_alarm(&self, raw: &Self::Raw) -> Alarm;
}

/// A polling window in unix seconds, `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollWindow {
    /// Window start.
    pub start: i64,
    /// Window end.
    pub end: i64,
}

impl PollWindow {
    /// Computes the window for a device watermark.
    ///
    /// A zero watermark means the device was never polled and the window
    /// starts `lookback_seconds` before `now`.
    #[must_use]
    pub const fn for_watermark(watermark: i64, now: i64, lookback_seconds: i64) -> Self {
        let start = if watermark == 0 { now - lookback_seconds } else { watermark };
        Self { start, end: now }
    }

    /// Returns the same window with its end moved to `now`.
    #[must_use]
    pub const fn slide_to(self, now: i64) -> Self {
        Self {
            start: self.start,
            end: now,
        }
    }
}

/// Vendor polling endpoints and credentials.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    /// IOPGPS alarm query endpoint.
    pub iopgps_alarm_url: String,
    /// WhatsGPS alarm query endpoint.
    pub whatsgps_alarm_url: String,
    /// WhatsGPS API token, sent as a query parameter.
    pub whatsgps_token: String,
    /// Offset in which WhatsGPS reads and writes datetimes.
    pub vendor_offset: FixedOffset,
}

impl ProviderEndpoints {
    /// Builds the polling URL for a device and window.
    pub fn build_url(
        &self,
        provider: Provider,
        device_id: &str,
        window: PollWindow,
    ) -> Result<String, ProviderError> {
        match provider {
            Provider::WanWayTech => {
                let params = [
                    ("imei", device_id.to_string()),
                    ("startTime", window.start.to_string()),
                    ("endTime", window.end.to_string()),
                ];
                parse_with_params(&self.iopgps_alarm_url, &params)
            }
            Provider::WhatsGps => {
                let render = |unix| {
                    format_vendor_datetime(unix, self.vendor_offset).map_err(|e| {
                        ProviderError::InvalidWindow {
                            start: window.start,
                            end: window.end,
                            message: e.to_string(),
                        }
                    })
                };
                let params = [
                    ("token", self.whatsgps_token.clone()),
                    ("carId", device_id.to_string()),
                    ("startTime", render(window.start)?),
                    ("endTime", render(window.end)?),
                ];
                parse_with_params(&self.whatsgps_alarm_url, &params)
            }
            Provider::Unknown => Err(ProviderError::UnknownProvider {
                device_id: device_id.to_string(),
            }),
        }
    }

    /// Returns the header that carries the bearer token for a provider.
    ///
    /// WhatsGPS authenticates through its query string and needs none.
    #[must_use]
    pub const fn token_header(provider: Provider) -> Option<&'static str> {
        match provider {
            Provider::WanWayTech => Some("AccessToken"),
            Provider::WhatsGps | Provider::Unknown => None,
        }
    }

    /// Decodes a vendor response body into canonical alarms.
    pub fn decode(&self, provider: Provider, body: &[u8]) -> Result<Vec<Alarm>, DecodeError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(DecodeError::EmptyBody);
        }

        match provider {
            Provider::WanWayTech => {
                let details = IopgpsEnvelope::from_slice(body)?.into_details()?;
                let adapter = IopgpsAdapter;
                Ok(details.iter().map(|raw| adapter.to_alarm(raw)).collect())
            }
            Provider::WhatsGps => {
                let envelope = WhatsGpsEnvelope::from_slice(body)?;
                envelope.check()?;
                let adapter = WhatsGpsAdapter::new(self.vendor_offset);
                Ok(envelope.alarms().iter().map(|raw| adapter.to_alarm(raw)).collect())
            }
            Provider::Unknown => Err(DecodeError::Json {
                provider: provider.to_string(),
                message: "no adapter for provider".to_string(),
            }),
        }
    }
}

fn parse_with_params(base: &str, params: &[(&str, String)]) -> Result<String, ProviderError> {
    Url::parse_with_params(base, params.iter().map(|(k, v)| (*k, v.as_str())))
        .map(String::from)
        .map_err(|e| ProviderError::InvalidUrl {
            url: base.to_string(),
            message: e.to_string(),
        })
}
