//! Stage 2: per-device polling windows and URLs.

use super::Stage;
use crate::errors::StageError;
use crate::fanout::{ConcurrencyLimit, TaskGroup};
use crate::model::{Device, Provider};
use crate::ports::DeviceSource;
use crate::providers::{PollWindow, ProviderEndpoints};
use crate::utils::now_unix;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// One vendor request to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    /// Vendor device identifier.
    pub device_id: String,
    /// Vendor to poll.
    pub provider: Provider,
    /// Window the URL covers.
    pub window: PollWindow,
    /// Fully built URL.
    pub url: String,
}

/// Builds one [`PollRequest`] per device and advances its watermark.
pub struct UrlBuilderStage {
    endpoints: Arc<ProviderEndpoints>,
    source: Arc<dyn DeviceSource>,
    watermarks: Arc<DashMap<String, i64>>,
    lookback_seconds: i64,
    push_watermarks: bool,
    limit: ConcurrencyLimit,
}

impl UrlBuilderStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(
        endpoints: Arc<ProviderEndpoints>,
        source: Arc<dyn DeviceSource>,
        lookback_seconds: i64,
        fan_out: usize,
    ) -> Self {
        Self {
            endpoints,
            source,
            watermarks: Arc::new(DashMap::new()),
            lookback_seconds,
            push_watermarks: true,
            limit: ConcurrencyLimit::new(fan_out),
        }
    }

    /// Enables or disables pushing advanced watermarks to the backend.
    #[must_use]
    pub fn with_push_watermarks(mut self, push: bool) -> Self {
        self.push_watermarks = push;
        self
    }

    /// Returns the watermark recorded for a device.
    #[must_use]
    pub fn watermark(&self, device_id: &str) -> Option<i64> {
        self.watermarks.get(device_id).map(|w| *w)
    }

    /// Builds requests for every device as of `now`.
    pub async fn build_requests_at(&self, devices: Vec<Device>, now: i64) -> Vec<PollRequest> {
        let mut group = TaskGroup::new("url_builder");

        for device in devices {
            let endpoints = self.endpoints.clone();
            let source = self.source.clone();
            let watermarks = self.watermarks.clone();
            let lookback = self.lookback_seconds;
            let push = self.push_watermarks;

            group.spawn(&self.limit, async move {
                build_one(&endpoints, &source, &watermarks, device, now, lookback, push)
            });
        }

        group.join().await.into_iter().flatten().collect()
    }
}

fn build_one(
    endpoints: &ProviderEndpoints,
    source: &Arc<dyn DeviceSource>,
    watermarks: &DashMap<String, i64>,
    device: Device,
    now: i64,
    lookback_seconds: i64,
    push: bool,
) -> Option<PollRequest> {
    if device.provider == Provider::Unknown {
        tracing::warn!(device_id = %device.imei, "Skipping device with unknown provider");
        return None;
    }

    let booked = watermarks.get(&device.imei).map_or(0, |w| *w);
    let watermark = booked.max(device.last_time_tracked);
    let window = PollWindow::for_watermark(watermark, now, lookback_seconds);

    let url = match endpoints.build_url(device.provider, &device.imei, window) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(device_id = %device.imei, error = %e, "Failed to build polling URL");
            return None;
        }
    };

    watermarks.insert(device.imei.clone(), now);

    if push {
        let updated = device.clone().with_watermark(now);
        let source = source.clone();
        tokio::spawn(async move {
            if let Err(e) = source.update_device(&updated).await {
                tracing::warn!(device_id = %updated.imei, error = %e, "Failed to push watermark");
            }
        });
    }

    Some(PollRequest {
        device_id: device.imei,
        provider: device.provider,
        window,
        url,
    })
}

impl std::fmt::Debug for UrlBuilderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlBuilderStage")
            .field("watermarks", &self.watermarks.len())
            .field("lookback_seconds", &self.lookback_seconds)
            .field("push_watermarks", &self.push_watermarks)
            .field("fan_out", &self.limit.permits())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for UrlBuilderStage {
    type Input = Vec<Device>;
    type Output = Vec<PollRequest>;

    fn name(&self) -> &'static str {
        "url_builder"
    }

    async fn execute(&self, devices: Vec<Device>) -> Result<Vec<PollRequest>, StageError> {
        Ok(self.build_requests_at(devices, now_unix()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ApiError;
    use crate::utils::{fixed_offset, GUAYAQUIL_OFFSET_SECONDS};
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSource {
        updates: Mutex<Vec<Device>>,
    }

    #[async_trait]
    impl DeviceSource for RecordingSource {
        async fn list_tracked_devices(&self) -> Result<Vec<Device>, ApiError> {
            Ok(Vec::new())
        }

        async fn update_device(&self, device: &Device) -> Result<(), ApiError> {
            self.updates.lock().push(device.clone());
            Ok(())
        }
    }

    const T: i64 = 1_709_298_900;

    fn stage(source: Arc<RecordingSource>) -> UrlBuilderStage {
        let endpoints = ProviderEndpoints {
            iopgps_alarm_url: "https://open.iopgps.com/api/device/alarm".to_string(),
            whatsgps_alarm_url: "https://www.whatsgps.com/alarmSta/queryDetail.do".to_string(),
            whatsgps_token: "wg".to_string(),
            vendor_offset: fixed_offset(GUAYAQUIL_OFFSET_SECONDS).unwrap(),
        };
        UrlBuilderStage::new(Arc::new(endpoints), source, 86_400, 22)
    }

    #[tokio::test]
    async fn test_new_device_gets_lookback_window_and_watermark() {
        let stage = stage(Arc::new(RecordingSource::default())).with_push_watermarks(false);
        let devices = vec![Device::new("860419050021378", "u", Provider::WanWayTech)];

        let requests = stage.build_requests_at(devices, T).await;

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].window, PollWindow { start: T - 86_400, end: T });
        assert_eq!(
            requests[0].url,
            format!(
                "https://open.iopgps.com/api/device/alarm?imei=860419050021378&startTime={}&endTime={T}",
                T - 86_400
            )
        );
        assert_eq!(stage.watermark("860419050021378"), Some(T));
    }

    #[tokio::test]
    async fn test_next_window_starts_at_previous_end() {
        let stage = stage(Arc::new(RecordingSource::default())).with_push_watermarks(false);
        let device = Device::new("1", "u", Provider::WhatsGps);

        stage.build_requests_at(vec![device.clone()], T).await;
        let requests = stage.build_requests_at(vec![device], T + 30).await;

        assert_eq!(requests[0].window, PollWindow { start: T, end: T + 30 });
        assert_eq!(stage.watermark("1"), Some(T + 30));
    }

    #[tokio::test]
    async fn test_backend_watermark_is_honoured() {
        let stage = stage(Arc::new(RecordingSource::default())).with_push_watermarks(false);
        let device = Device::new("1", "u", Provider::WanWayTech).with_watermark(T - 600);

        let requests = stage.build_requests_at(vec![device], T).await;

        assert_eq!(requests[0].window.start, T - 600);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_skipped() {
        let stage = stage(Arc::new(RecordingSource::default())).with_push_watermarks(false);
        let devices = vec![
            Device::new("1", "u", Provider::Unknown),
            Device::new("2", "u", Provider::WanWayTech),
        ];

        let requests = stage.build_requests_at(devices, T).await;

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].device_id, "2");
        assert_eq!(stage.watermark("1"), None);
    }

    #[tokio::test]
    async fn test_watermark_is_pushed_to_backend() {
        let source = Arc::new(RecordingSource::default());
        let stage = stage(source.clone());

        stage
            .build_requests_at(vec![Device::new("1", "u", Provider::WanWayTech)], T)
            .await;

        for _ in 0..50 {
            if !source.updates.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let updates = source.updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].last_time_tracked, T);
    }

    #[tokio::test]
    async fn test_many_devices_fan_out() {
        let stage = stage(Arc::new(RecordingSource::default())).with_push_watermarks(false);
        let devices: Vec<Device> = (0..100)
            .map(|i| Device::new(i.to_string(), "u", Provider::WanWayTech))
            .collect();

        let requests = stage.build_requests_at(devices, T).await;

        assert_eq!(requests.len(), 100);
    }
}
