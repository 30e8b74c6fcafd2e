//! Stage 1: the list of devices to poll.

use super::Stage;
use crate::errors::{ApiError, StageError};
use crate::model::Device;
use crate::ports::DeviceSource;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Caches the tracked device list between refreshes.
pub struct DeviceSourceStage {
    source: Arc<dyn DeviceSource>,
    devices: RwLock<Vec<Device>>,
    loaded: AtomicBool,
}

impl DeviceSourceStage {
    /// Creates a stage with an empty cache.
    #[must_use]
    pub fn new(source: Arc<dyn DeviceSource>) -> Self {
        Self {
            source,
            devices: RwLock::new(Vec::new()),
            loaded: AtomicBool::new(false),
        }
    }

    /// Replaces the cached list. On error the previous list is kept.
    pub async fn refresh(&self) -> Result<usize, ApiError> {
        match self.source.list_tracked_devices().await {
            Ok(devices) => {
                let tracked: Vec<Device> = devices.into_iter().filter(|d| d.is_tracking_alarms).collect();
                let count = tracked.len();
                *self.devices.write() = tracked;
                self.loaded.store(true, Ordering::SeqCst);
                tracing::info!(devices = count, "Device list refreshed");
                Ok(count)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    cached = self.devices.read().len(),
                    "Device list refresh failed, keeping previous list"
                );
                Err(e)
            }
        }
    }

    /// Returns true once a refresh has succeeded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Returns a copy of the cached list.
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        self.devices.read().clone()
    }
}

impl std::fmt::Debug for DeviceSourceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSourceStage")
            .field("devices", &self.devices.read().len())
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for DeviceSourceStage {
    type Input = ();
    type Output = Vec<Device>;

    fn name(&self) -> &'static str {
        "device_source"
    }

    async fn execute(&self, _input: ()) -> Result<Vec<Device>, StageError> {
        if !self.is_loaded() {
            // Failure is logged by refresh; an empty cache yields an empty batch.
            let _ = self.refresh().await;
        }
        Ok(self.devices())
    }
}
