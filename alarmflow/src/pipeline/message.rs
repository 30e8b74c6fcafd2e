//! Notification text.

use crate::model::{Alarm, AlarmCode, Device};
use crate::utils::format_local;
use chrono::FixedOffset;

const UNKNOWN_LOCATION: &str = "Ubicación desconocida";
const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/?api=1&query=";

/// Composes the Spanish alert text sent to recipients.
#[derive(Debug, Clone, Copy)]
pub struct MessageBuilder {
    offset: FixedOffset,
}

impl MessageBuilder {
    /// Creates a builder rendering times at `offset`.
    #[must_use]
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Returns the alert header for an alarm.
    #[must_use]
    pub fn header(alarm: &Alarm) -> &'static str {
        match (&alarm.alarm_code, alarm.alarm_type) {
            (AlarmCode::Sos, _) => "🚨🚨 ALERTA DE SOS 🚨🚨",
            (AlarmCode::Remove, 1) => "🔧🔧 ALERTA DE DESMONTAJE 🔧🔧",
            (AlarmCode::Remove, 10) => "💡💡 ALERTA DE SENSOR DE LUZ 💡💡",
            (AlarmCode::Remove, _) => "⚡⚡ ALERTA DE CORTE DE CORRIENTE ⚡⚡",
            (AlarmCode::LowVoltage, _) => "⚡⚡ ALERTA DE CORRIENTE BAJA ⚡⚡",
            _ => "ALERTA DESCONOCIDA",
        }
    }

    /// Builds the message. `address` is the geocoded location, if any.
    #[must_use]
    pub fn build(&self, alarm: &Alarm, device: &Device, address: Option<&str>) -> String {
        let owner = non_empty(device.car_owner.as_deref());
        let plate = non_empty(device.license_number.as_deref());
        let vin = match (device.vin.as_deref(), device.license_number.as_deref()) {
            (Some(vin), Some(plate)) if vin == plate => None,
            (vin, _) => non_empty(vin),
        };

        let mut message = format!(
            "{}\nDatos del usuario:\nUsuario: {}",
            Self::header(alarm),
            device.user_name
        );
        push_detail(&mut message, "Propietario", owner);
        push_detail(&mut message, "Placa del vehículo", plate);
        push_detail(&mut message, "Vin", vin);

        let time = format_local(alarm.time, self.offset).unwrap_or_else(|_| alarm.time.to_string());
        message.push_str("\nHora de alarma: ");
        message.push_str(&time);

        match (alarm.coordinates(), non_empty(address)) {
            (Some((lat, lng)), Some(address)) => {
                push_detail(&mut message, "Ubicación", Some(address));
                message.push_str("\nEnlace a Google Maps: ");
                message.push_str(&format!("{MAPS_SEARCH_URL}{lat},{lng}"));
            }
            _ => {
                message.push('\n');
                message.push_str(UNKNOWN_LOCATION);
            }
        }

        message
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn push_detail(message: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value {
        message.push('\n');
        message.push_str(label);
        message.push_str(": ");
        message.push_str(value);
    }
}
