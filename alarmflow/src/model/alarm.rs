//! The canonical alarm record.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Symbolic alarm code in the canonical vocabulary.
///
/// Codes serialize as their upper-case wire names (`"SOS"`, `"LOWVOT"`, ...).
/// A non-empty vendor code outside the vocabulary is kept verbatim in
/// [`AlarmCode::Other`]; an empty one becomes [`AlarmCode::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum AlarmCode {
    /// Panic button.
    Sos,
    /// Power removal or tamper.
    Remove,
    /// Low battery voltage.
    LowVoltage,
    /// Vibration.
    Shake,
    /// Main power cut.
    PowerOff,
    /// Speed limit exceeded.
    Overspeed,
    /// Geofence entry.
    FenceIn,
    /// Geofence exit.
    FenceOut,
    /// Left the allowed area.
    AreaOut,
    /// Magnetic interference.
    Magnetism,
    /// Repeated removal.
    RemoveContinuously,
    /// Bluetooth alarm.
    Bluetooth,
    /// Signal jamming detected.
    SignalShielding,
    /// Fake base station detected.
    PseudoBaseStation,
    /// Ignition on.
    AccOn,
    /// Ignition off.
    AccOff,
    /// Unrecognized vendor code.
    #[default]
    Unknown,
    /// Vendor code outside the vocabulary, preserved as received.
    Other(String),
}

/// Codes that trigger a notification by default.
pub const CRITICAL_CODES: [AlarmCode; 3] = [AlarmCode::Sos, AlarmCode::Remove, AlarmCode::LowVoltage];

impl AlarmCode {
    /// Returns the wire name of the code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sos => "SOS",
            Self::Remove => "REMOVE",
            Self::LowVoltage => "LOWVOT",
            Self::Shake => "SHAKE",
            Self::PowerOff => "POWEROFF",
            Self::Overspeed => "OVERSPEED",
            Self::FenceIn => "FENCEIN",
            Self::FenceOut => "FENCEOUT",
            Self::AreaOut => "AREAOUT",
            Self::Magnetism => "MAGNETISM",
            Self::RemoveContinuously => "REMOVECONTINUOUSLY",
            Self::Bluetooth => "BLUETOOTH",
            Self::SignalShielding => "SIGNALSHIELDING",
            Self::PseudoBaseStation => "PSEUDOBASESTATION",
            Self::AccOn => "ACCON",
            Self::AccOff => "ACCOFF",
            Self::Unknown => "UNKNOWN",
            Self::Other(code) => code,
        }
    }

    /// Parses a vendor code string. Never fails.
    #[must_use]
    pub fn parse(code: &str) -> Self {
        let trimmed = code.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "" | "UNKNOWN" => Self::Unknown,
            "SOS" => Self::Sos,
            "REMOVE" => Self::Remove,
            "LOWVOT" => Self::LowVoltage,
            "SHAKE" => Self::Shake,
            "POWEROFF" => Self::PowerOff,
            "OVERSPEED" => Self::Overspeed,
            "FENCEIN" => Self::FenceIn,
            "FENCEOUT" => Self::FenceOut,
            "AREAOUT" => Self::AreaOut,
            "MAGNETISM" => Self::Magnetism,
            "REMOVECONTINUOUSLY" => Self::RemoveContinuously,
            "BLUETOOTH" => Self::Bluetooth,
            "SIGNALSHIELDING" => Self::SignalShielding,
            "PSEUDOBASESTATION" => Self::PseudoBaseStation,
            "ACCON" => Self::AccOn,
            "ACCOFF" => Self::AccOff,
            _ => Self::Other(trimmed.to_string()),
        }
    }
}

impl fmt::Display for AlarmCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for AlarmCode {
    fn from(code: &str) -> Self {
        Self::parse(code)
    }
}

impl Serialize for AlarmCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AlarmCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// A vendor-agnostic alarm event.
///
/// Serialized with snake_case names for the backend; absent optional fields
/// are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// Vendor device identifier (IMEI or car id).
    #[serde(rename = "device_imei")]
    pub device_id: String,
    /// Positioning source (e.g. "GPS", "LBS").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_type: Option<String>,
    /// Latitude, vendor precision preserved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<String>,
    /// Longitude, vendor precision preserved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<String>,
    /// Event time as unix seconds.
    pub time: i64,
    /// Resolved street address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Symbolic alarm code.
    pub alarm_code: AlarmCode,
    /// Numeric alarm type in the canonical numbering.
    pub alarm_type: i64,
    /// Heading in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<i64>,
    /// Device or provider type tag.
    pub device_type: i64,
    /// Speed in km/h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<i64>,
}

impl Alarm {
    /// Creates an alarm carrying only the mandatory fields.
    #[must_use]
    pub fn new(device_id: impl Into<String>, time: i64, alarm_code: AlarmCode, alarm_type: i64) -> Self {
        Self {
            device_id: device_id.into(),
            position_type: None,
            lat: None,
            lng: None,
            time,
            address: None,
            alarm_code,
            alarm_type,
            course: None,
            device_type: 0,
            speed: None,
        }
    }

    /// Sets the coordinates.
    #[must_use]
    pub fn with_coordinates(mut self, lat: impl Into<String>, lng: impl Into<String>) -> Self {
        self.lat = Some(lat.into());
        self.lng = Some(lng.into());
        self
    }

    /// Returns the coordinates when both are present and non-empty.
    #[must_use]
    pub fn coordinates(&self) -> Option<(&str, &str)> {
        let lat = self.lat.as_deref().filter(|s| !s.trim().is_empty())?;
        let lng = self.lng.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((lat, lng))
    }
}
