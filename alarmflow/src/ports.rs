//! Ports - the external collaborators the pipeline depends on.
//!
//! Each stage receives only the ports it needs. Concrete HTTP
//! implementations live in [`crate::clients`] and [`crate::auth`]; tests
//! substitute in-memory fakes.

use crate::auth::AccessToken;
use crate::errors::{ApiError, AuthError, DeliveryError, TransportError};
use crate::model::{Alarm, Device};
use async_trait::async_trait;
use std::sync::Arc;

/// Lists and updates polling targets.
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// Returns every device with alarm tracking enabled.
    async fn list_tracked_devices(&self) -> Result<Vec<Device>, ApiError>;

    /// Stores an updated device record (used for watermarks).
    async fn update_device(&self, device: &Device) -> Result<(), ApiError>;
}

/// Persists canonical alarms.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlarmStore: Send + Sync {
    /// Submits one alarm.
    async fn create_alarm(&self, alarm: &Alarm) -> Result<(), ApiError>;
}

/// Resolves device details and notification recipients.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Looks up a device by identifier. `Ok(None)` means not found.
    async fn device(&self, device_id: &str) -> Result<Option<Device>, ApiError>;

    /// Returns every phone number subscribed to a device.
    async fn recipients(&self, device_id: &str) -> Result<Vec<String>, ApiError>;
}

/// Reverse geocoding.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Returns a street address for the coordinates, if one is known.
    async fn address(&self, lat: &str, lng: &str) -> Option<String>;
}

/// Outbound message delivery.
#[async_trait]
pub trait MessageDelivery: Send + Sync {
    /// Sends `body` to one recipient and returns the delivery receipt id.
    async fn send(&self, recipient: &str, body: &str) -> Result<String, DeliveryError>;
}

/// Fetches vendor polling URLs.
#[async_trait]
pub trait PollTransport: Send + Sync {
    /// Issues a GET and returns the body of a 2xx response.
    async fn get(&self, url: &str, headers: &[(&'static str, String)]) -> Result<Vec<u8>, TransportError>;
}

/// Issues vendor access tokens.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Requests a fresh token.
    async fn issue(&self) -> Result<AccessToken, AuthError>;
}

/// Stores the current token across restarts.
#[async_trait]
pub trait TokenPersistence: Send + Sync {
    /// Loads the stored token, if any.
    async fn load(&self) -> Result<Option<AccessToken>, AuthError>;

    /// Stores the token.
    async fn save(&self, token: &AccessToken) -> Result<(), AuthError>;
}

/// The full set of ports needed to assemble a pipeline.
#[derive(Clone)]
pub struct PipelinePorts {
    /// Device listing and watermark updates.
    pub devices: Arc<dyn DeviceSource>,
    /// Alarm persistence.
    pub alarms: Arc<dyn AlarmStore>,
    /// Device and recipient lookup.
    pub contacts: Arc<dyn ContactDirectory>,
    /// Reverse geocoding.
    pub geocoder: Arc<dyn Geocoder>,
    /// Message delivery.
    pub delivery: Arc<dyn MessageDelivery>,
}

impl std::fmt::Debug for PipelinePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelinePorts").finish_non_exhaustive()
    }
}

/// A geocoder that never resolves an address.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeocoder;

#[async_trait]
impl Geocoder for NoGeocoder {
    async fn address(&self, _lat: &str, _lng: &str) -> Option<String> {
        None
    }
}
