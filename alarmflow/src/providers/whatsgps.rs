//! WhatsGPS payloads and the translation into the canonical vocabulary.

use super::AlarmAdapter;
use crate::errors::DecodeError;
use crate::model::{Alarm, AlarmCode, Provider};
use crate::utils::parse_vendor_datetime;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

/// Response envelope of the alarm detail endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhatsGpsEnvelope {
    /// Alarm records; the vendor sends `null` when there are none.
    #[serde(default)]
    pub data: Option<Vec<WhatsGpsAlarm>>,
    /// Vendor result flag.
    #[serde(default)]
    pub ret: i64,
    /// Number of records reported by the vendor.
    #[serde(default)]
    pub total: i64,
}

impl WhatsGpsEnvelope {
    /// Decodes an envelope from a response body.
    pub fn from_slice(body: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(body).map_err(|e| DecodeError::Json {
            provider: Provider::WhatsGps.to_string(),
            message: e.to_string(),
        })
    }

    /// Returns the records, empty when `data` was null.
    #[must_use]
    pub fn alarms(&self) -> &[WhatsGpsAlarm] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Fails unless `ret` is 1, the vendor's success flag.
    pub fn check(&self) -> Result<(), DecodeError> {
        if self.ret == 1 {
            Ok(())
        } else {
            Err(DecodeError::VendorCode {
                provider: Provider::WhatsGps.to_string(),
                code: self.ret,
            })
        }
    }
}

/// One WhatsGPS alarm record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsGpsAlarm {
    /// Alarm datetime in the vendor's local time; may be null.
    #[serde(default)]
    pub alarm_time: Option<String>,
    /// Vendor alarm type number.
    #[serde(default)]
    pub alarm_type: i64,
    /// Vendor car id.
    pub car_id: i64,
    /// Heading in degrees.
    #[serde(default)]
    pub dir: i64,
    /// Latitude.
    #[serde(default)]
    pub lat: f64,
    /// Corrected latitude.
    #[serde(default)]
    pub latc: f64,
    /// Longitude.
    #[serde(default)]
    pub lon: f64,
    /// Corrected longitude.
    #[serde(default)]
    pub lonc: f64,
    /// Position fix datetime in the vendor's local time.
    #[serde(default)]
    pub point_time: Option<String>,
    /// Positioning source number.
    #[serde(default)]
    pub point_type: i64,
    /// Free-text remark.
    #[serde(default)]
    pub remark: Option<String>,
    /// Speed in km/h.
    #[serde(default)]
    pub speed: i64,
    /// Account name.
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Maps a WhatsGPS alarm type to the canonical code.
#[must_use]
pub fn whatsgps_alarm_code(vendor_type: i64) -> AlarmCode {
    match vendor_type {
        1 => AlarmCode::Shake,
        2 => AlarmCode::PowerOff,
        3 | 8 => AlarmCode::LowVoltage,
        4 => AlarmCode::Sos,
        5 => AlarmCode::Overspeed,
        6 | 19 => AlarmCode::FenceOut,
        7 | 10 | 11 => AlarmCode::Remove,
        9 => AlarmCode::AreaOut,
        12 => AlarmCode::Magnetism,
        13 => AlarmCode::RemoveContinuously,
        14 => AlarmCode::Bluetooth,
        15 => AlarmCode::SignalShielding,
        16 => AlarmCode::PseudoBaseStation,
        17 | 18 => AlarmCode::FenceIn,
        31 => AlarmCode::AccOn,
        32 => AlarmCode::AccOff,
        _ => AlarmCode::Unknown,
    }
}

/// Maps a WhatsGPS alarm type to the canonical numeric type.
///
/// Unmapped vendor numbers pass through unchanged.
#[must_use]
pub fn whatsgps_alarm_type(vendor_type: i64) -> i64 {
    match vendor_type {
        1 => 3,
        2 => 92,
        3 | 8 => 2,
        4 => 99,
        5 => 12,
        6 | 19 => 16,
        7 => 1,
        9 => 18,
        10 => 11,
        11 => 10,
        12 => 103,
        13 => 6,
        14 => 102,
        15 => 101,
        16 => 14,
        17 | 18 => 17,
        31 => 44,
        32 => 45,
        other => other,
    }
}

/// Translating adapter.
#[derive(Debug, Clone, Copy)]
pub struct WhatsGpsAdapter {
    offset: FixedOffset,
}

impl WhatsGpsAdapter {
    /// Creates an adapter reading vendor datetimes at `offset`.
    #[must_use]
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Alarm time, else point time, else zero.
    fn event_time(&self, raw: &WhatsGpsAlarm) -> i64 {
        [raw.alarm_time.as_deref(), raw.point_time.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|value| parse_vendor_datetime(value, self.offset).ok())
            .unwrap_or(0)
    }
}

impl AlarmAdapter for WhatsGpsAdapter {
    type Raw = WhatsGpsAlarm;

    fn to_alarm(&self, raw: &WhatsGpsAlarm) -> Alarm {
        Alarm {
            device_id: raw.car_id.to_string(),
            position_type: Some("GPS".to_string()),
            lat: Some(format!("{:.7}", raw.lat)),
            lng: Some(format!("{:.7}", raw.lon)),
            time: self.event_time(raw),
            address: None,
            alarm_code: whatsgps_alarm_code(raw.alarm_type),
            alarm_type: whatsgps_alarm_type(raw.alarm_type),
            course: Some(0),
            device_type: 1,
            speed: Some(raw.speed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{fixed_offset, GUAYAQUIL_OFFSET_SECONDS};

    fn adapter() -> WhatsGpsAdapter {
        WhatsGpsAdapter::new(fixed_offset(GUAYAQUIL_OFFSET_SECONDS).unwrap())
    }

    fn raw(alarm_type: i64) -> WhatsGpsAlarm {
        WhatsGpsAlarm {
            alarm_time: Some("2024-03-01 08:15:00".to_string()),
            alarm_type,
            car_id: 52011,
            lat: -2.189_412_8,
            lon: -79.889_066_2,
            speed: 37,
            ..WhatsGpsAlarm::default()
        }
    }

    #[test]
    fn test_sos_translation() {
        let alarm = adapter().to_alarm(&raw(4));

        assert_eq!(alarm.device_id, "52011");
        assert_eq!(alarm.alarm_code, AlarmCode::Sos);
        assert_eq!(alarm.alarm_type, 99);
        assert_eq!(alarm.time, 1_709_298_900);
        assert_eq!(alarm.position_type.as_deref(), Some("GPS"));
        assert_eq!(alarm.course, Some(0));
        assert_eq!(alarm.device_type, 1);
        assert_eq!(alarm.speed, Some(37));
    }

    #[test]
    fn test_coordinates_have_seven_decimals() {
        let mut record = raw(4);
        record.lat = -2.5;
        record.lon = -79.123_456_789;
        let alarm = adapter().to_alarm(&record);
        assert_eq!(alarm.lat.as_deref(), Some("-2.5000000"));
        assert_eq!(alarm.lng.as_deref(), Some("-79.1234568"));
    }

    #[test]
    fn test_lookup_tables() {
        let cases = [
            (1, AlarmCode::Shake, 3),
            (2, AlarmCode::PowerOff, 92),
            (3, AlarmCode::LowVoltage, 2),
            (5, AlarmCode::Overspeed, 12),
            (6, AlarmCode::FenceOut, 16),
            (7, AlarmCode::Remove, 1),
            (8, AlarmCode::LowVoltage, 2),
            (9, AlarmCode::AreaOut, 18),
            (10, AlarmCode::Remove, 11),
            (11, AlarmCode::Remove, 10),
            (12, AlarmCode::Magnetism, 103),
            (13, AlarmCode::RemoveContinuously, 6),
            (14, AlarmCode::Bluetooth, 102),
            (15, AlarmCode::SignalShielding, 101),
            (16, AlarmCode::PseudoBaseStation, 14),
            (17, AlarmCode::FenceIn, 17),
            (18, AlarmCode::FenceIn, 17),
            (19, AlarmCode::FenceOut, 16),
            (31, AlarmCode::AccOn, 44),
            (32, AlarmCode::AccOff, 45),
        ];
        for (vendor, code, canonical) in cases {
            assert_eq!(whatsgps_alarm_code(vendor), code, "vendor type {vendor}");
            assert_eq!(whatsgps_alarm_type(vendor), canonical, "vendor type {vendor}");
        }
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let alarm = adapter().to_alarm(&raw(250));
        assert_eq!(alarm.alarm_code, AlarmCode::Unknown);
        assert_eq!(alarm.alarm_type, 250);
    }

    #[test]
    fn test_time_falls_back_to_point_time() {
        let mut record = raw(4);
        record.alarm_time = None;
        record.point_time = Some("2024-03-01 08:16:00".to_string());
        assert_eq!(adapter().to_alarm(&record).time, 1_709_298_960);

        record.point_time = None;
        assert_eq!(adapter().to_alarm(&record).time, 0);
    }

    #[test]
    fn test_envelope_with_null_data() {
        let envelope = WhatsGpsEnvelope::from_slice(br#"{"data":null,"ret":1,"total":0}"#).unwrap();
        assert!(envelope.alarms().is_empty());
    }

    #[test]
    fn test_failed_envelope_is_vendor_error() {
        let envelope = WhatsGpsEnvelope::from_slice(br#"{"ret":0,"data":null}"#).unwrap();
        assert!(matches!(envelope.check(), Err(DecodeError::VendorCode { code: 0, .. })));

        let envelope = WhatsGpsEnvelope::from_slice(br#"{"data":null,"ret":1,"total":0}"#).unwrap();
        assert!(envelope.check().is_ok());
    }

    #[test]
    fn test_envelope_with_null_alarm_time() {
        let body = br#"{"ret":1,"total":1,"data":[{"alarmTime":null,"pointTime":"2024-03-01 08:15:00","alarmType":3,"carId":9,"dir":90,"lat":-2.1,"latc":-2.1,"lon":-79.9,"lonc":-79.9,"pointType":1,"remark":null,"speed":0,"userName":"flota"}]}"#;
        let envelope = WhatsGpsEnvelope::from_slice(body).unwrap();
        let alarm = adapter().to_alarm(&envelope.alarms()[0]);
        assert_eq!(alarm.alarm_code, AlarmCode::LowVoltage);
        assert_eq!(alarm.time, 1_709_298_900);
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let first = serde_json::to_string(&adapter().to_alarm(&raw(7))).unwrap();
        let second = serde_json::to_string(&adapter().to_alarm(&raw(7))).unwrap();
        assert_eq!(first, second);
    }
}
