//! Polling targets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Telematics vendor a device reports through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Provider {
    /// IOPGPS open API (WanWay hardware).
    #[serde(rename = "WanWayTech")]
    #[default]
    WanWayTech,
    /// WhatsGPS API.
    #[serde(rename = "WhatsGPS")]
    WhatsGps,
    /// Any provider tag this build does not support.
    #[serde(other)]
    Unknown,
}

impl Provider {
    /// Returns the provider tag as stored by the backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WanWayTech => "WanWayTech",
            Self::WhatsGps => "WhatsGPS",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked vehicle device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Vendor device identifier (IMEI or numeric car id).
    pub imei: String,
    /// Display name of the user the device belongs to.
    pub user_name: String,
    /// Vehicle owner.
    #[serde(default)]
    pub car_owner: Option<String>,
    /// License plate.
    #[serde(default)]
    pub license_number: Option<String>,
    /// Vehicle identification number.
    #[serde(default)]
    pub vin: Option<String>,
    /// Whether alarms are polled for this device.
    #[serde(default)]
    pub is_tracking_alarms: bool,
    /// Watermark: end of the last polled window, unix seconds. Zero means never.
    #[serde(default)]
    pub last_time_tracked: i64,
    /// Vendor the device reports through.
    #[serde(default)]
    pub provider: Provider,
}

impl Device {
    /// Creates a tracked device with no metadata and no watermark.
    #[must_use]
    pub fn new(imei: impl Into<String>, user_name: impl Into<String>, provider: Provider) -> Self {
        Self {
            imei: imei.into(),
            user_name: user_name.into(),
            car_owner: None,
            license_number: None,
            vin: None,
            is_tracking_alarms: true,
            last_time_tracked: 0,
            provider,
        }
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.car_owner = Some(owner.into());
        self
    }

    /// Sets the license plate.
    #[must_use]
    pub fn with_license_number(mut self, plate: impl Into<String>) -> Self {
        self.license_number = Some(plate.into());
        self
    }

    /// Sets the VIN.
    #[must_use]
    pub fn with_vin(mut self, vin: impl Into<String>) -> Self {
        self.vin = Some(vin.into());
        self
    }

    /// Sets the watermark.
    #[must_use]
    pub fn with_watermark(mut self, unix_seconds: i64) -> Self {
        self.last_time_tracked = unix_seconds;
        self
    }
}
