//! IOPGPS (WanWay) payloads. The vendor already speaks the canonical
//! vocabulary, so the adapter copies fields through.

use super::AlarmAdapter;
use crate::errors::DecodeError;
use crate::model::{Alarm, AlarmCode, Provider};
use serde::{Deserialize, Serialize};

/// Response envelope of the alarm query endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IopgpsEnvelope {
    /// Vendor result code.
    #[serde(default)]
    pub code: i64,
    /// Alarm records. Absent or null means no alarms.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub details: Vec<IopgpsAlarm>,
}

impl IopgpsEnvelope {
    /// Decodes an envelope from a response body.
    pub fn from_slice(body: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(body).map_err(|e| DecodeError::Json {
            provider: Provider::WanWayTech.to_string(),
            message: e.to_string(),
        })
    }

    /// Returns the records, or the vendor's result code when it is not 0.
    pub fn into_details(self) -> Result<Vec<IopgpsAlarm>, DecodeError> {
        if self.code != 0 {
            return Err(DecodeError::VendorCode {
                provider: Provider::WanWayTech.to_string(),
                code: self.code,
            });
        }
        Ok(self.details)
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One IOPGPS alarm record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IopgpsAlarm {
    /// Record result code.
    #[serde(default)]
    pub code: i64,
    /// Positioning source.
    #[serde(default)]
    pub position_type: Option<String>,
    /// Device IMEI.
    pub imei: String,
    /// Latitude as sent by the vendor.
    #[serde(default)]
    pub lat: Option<String>,
    /// Longitude as sent by the vendor.
    #[serde(default)]
    pub lng: Option<String>,
    /// Event time, unix seconds.
    #[serde(default)]
    pub time: i64,
    /// Speed in km/h.
    #[serde(default)]
    pub speed: Option<i64>,
    /// Heading in degrees.
    #[serde(default)]
    pub course: Option<i64>,
    /// Symbolic alarm code.
    #[serde(default)]
    pub alarm_code: String,
    /// Time the vendor raised the alarm, unix seconds.
    #[serde(default)]
    pub alarm_time: i64,
    /// Hardware model tag.
    #[serde(default)]
    pub device_type: i64,
    /// Numeric alarm type.
    #[serde(default)]
    pub alarm_type: i64,
}

/// Pass-through adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct IopgpsAdapter;

impl AlarmAdapter for IopgpsAdapter {
    type Raw = IopgpsAlarm;

    fn to_alarm(&self, raw: &IopgpsAlarm) -> Alarm {
        // `time` is the fix time; fall back to the alarm time when a record
        // arrives without a position.
        let time = if raw.time == 0 { raw.alarm_time } else { raw.time };

        Alarm {
            device_id: raw.imei.clone(),
            position_type: raw.position_type.clone(),
            lat: raw.lat.clone(),
            lng: raw.lng.clone(),
            time,
            address: None,
            alarm_code: AlarmCode::parse(&raw.alarm_code),
            alarm_type: raw.alarm_type,
            course: raw.course,
            device_type: raw.device_type,
            speed: raw.speed,
        }
    }
}
