//! End-to-end cycles over in-memory ports.

use super::*;
use crate::errors::{ApiError, DeliveryError, TransportError};
use crate::model::{Alarm, Device, Provider};
use crate::ports::{AlarmStore, ContactDirectory, DeviceSource, MessageDelivery, NoGeocoder};
use crate::retry::{JitterStrategy, RetryConfig};
use parking_lot::Mutex;

#[derive(Default)]
struct Backend {
    devices: Vec<Device>,
    phones: Vec<String>,
    stored: Mutex<Vec<Alarm>>,
}

#[async_trait]
impl DeviceSource for Backend {
    async fn list_tracked_devices(&self) -> Result<Vec<Device>, ApiError> {
        Ok(self.devices.clone())
    }

    async fn update_device(&self, _device: &Device) -> Result<(), ApiError> {
        Ok(())
    }
}

#[async_trait]
impl AlarmStore for Backend {
    async fn create_alarm(&self, alarm: &Alarm) -> Result<(), ApiError> {
        self.stored.lock().push(alarm.clone());
        Ok(())
    }
}

#[async_trait]
impl ContactDirectory for Backend {
    async fn device(&self, device_id: &str) -> Result<Option<Device>, ApiError> {
        Ok(self.devices.iter().find(|d| d.imei == device_id).cloned())
    }

    async fn recipients(&self, _device_id: &str) -> Result<Vec<String>, ApiError> {
        Ok(self.phones.clone())
    }
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl MessageDelivery for Outbox {
    async fn send(&self, recipient: &str, _body: &str) -> Result<String, DeliveryError> {
        self.sent.lock().push(recipient.to_string());
        Ok("SM1".to_string())
    }
}

/// Answers by provider, based on the URL host.
struct Vendors {
    urls: Mutex<Vec<String>>,
}

#[async_trait]
impl PollTransport for Vendors {
    async fn get(&self, url: &str, _headers: &[(&'static str, String)]) -> Result<Vec<u8>, TransportError> {
        self.urls.lock().push(url.to_string());
        let body = if url.contains("iopgps") {
            r#"{"code":0,"details":[
                {"imei":"860419050021378","alarmCode":"SOS","alarmType":99,"time":1709298900,"lat":"-2.18","lng":"-79.88"},
                {"imei":"860419050021378","alarmCode":"OVERSPEED","alarmType":6,"time":1709298910}
            ]}"#
        } else {
            r#"{"ret":1,"total":1,"data":[
                {"carId":556677,"alarmType":3,"alarmTime":"2024-03-01 08:15:00","lat":-2.1,"lon":-79.9,"speed":0}
            ]}"#
        };
        Ok(body.as_bytes().to_vec())
    }
}

fn config() -> AlarmflowConfig {
    AlarmflowConfig::new()
        .with_backend("http://backend.test/api/v1/", "key")
        .with_whatsgps_token("wg")
        .with_retry(
            RetryConfig::new()
                .with_base_delay_ms(1)
                .with_jitter(JitterStrategy::None),
        )
        .with_push_watermarks(false)
}

fn pipeline(backend: Arc<Backend>, outbox: Arc<Outbox>, vendors: Arc<Vendors>) -> AlarmPipeline {
    let ports = PipelinePorts {
        devices: backend.clone(),
        alarms: backend.clone(),
        contacts: backend,
        geocoder: Arc::new(NoGeocoder),
        delivery: outbox,
    };
    AlarmPipeline::builder(config())
        .with_ports(ports)
        .with_transport(vendors)
        .build()
        .unwrap()
}

fn fleet() -> Vec<Device> {
    vec![
        Device::new("860419050021378", "Maria", Provider::WanWayTech),
        Device::new("556677", "Jorge", Provider::WhatsGps),
        Device::new("000", "Nadie", Provider::Unknown),
    ]
}

#[tokio::test]
async fn test_full_cycle() {
    let backend = Arc::new(Backend {
        devices: fleet(),
        phones: vec!["+593991111111".to_string()],
        ..Backend::default()
    });
    let outbox = Arc::new(Outbox::default());
    let vendors = Arc::new(Vendors { urls: Mutex::new(Vec::new()) });
    let pipeline = pipeline(backend.clone(), outbox.clone(), vendors.clone());

    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(report.devices, 3);
    assert_eq!(report.requests, 2);
    assert_eq!(report.alarms, 3);
    // SOS from IOPGPS and LOWVOT (WhatsGPS type 3); OVERSPEED is filtered.
    assert_eq!(report.notified, 2);
    assert_eq!(backend.stored.lock().len(), 3);
    assert_eq!(outbox.sent.lock().len(), 2);
    assert_eq!(vendors.urls.lock().len(), 2);
    assert!(pipeline.url_builder().watermark("860419050021378").is_some());
    assert!(pipeline.url_builder().watermark("000").is_none());
}

#[tokio::test]
async fn test_second_cycle_continues_from_watermark() {
    let backend = Arc::new(Backend {
        devices: fleet(),
        ..Backend::default()
    });
    let vendors = Arc::new(Vendors { urls: Mutex::new(Vec::new()) });
    let pipeline = pipeline(backend, Arc::new(Outbox::default()), vendors.clone());

    pipeline.run_cycle().await.unwrap();
    let watermark = pipeline.url_builder().watermark("860419050021378").unwrap();
    pipeline.run_cycle().await.unwrap();

    let urls = vendors.urls.lock();
    assert_eq!(urls.len(), 4);
    assert!(urls
        .iter()
        .any(|u| u.contains("imei=860419050021378") && u.contains(&format!("startTime={watermark}"))));
}

#[tokio::test]
async fn test_empty_fleet_cycle() {
    let vendors = Arc::new(Vendors { urls: Mutex::new(Vec::new()) });
    let pipeline = pipeline(Arc::new(Backend::default()), Arc::new(Outbox::default()), vendors.clone());

    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(report.devices, 0);
    assert_eq!(report.alarms, 0);
    assert!(vendors.urls.lock().is_empty());
}

#[test]
fn test_builder_requires_ports() {
    let err = AlarmPipeline::builder(config()).build().unwrap_err();
    assert!(matches!(err, AlarmflowError::Config(_)));
}

#[tokio::test]
async fn test_refresh_devices_counts_tracked() {
    let backend = Arc::new(Backend {
        devices: fleet(),
        ..Backend::default()
    });
    let pipeline = pipeline(
        backend,
        Arc::new(Outbox::default()),
        Arc::new(Vendors { urls: Mutex::new(Vec::new()) }),
    );

    assert_eq!(pipeline.refresh_devices().await.unwrap(), 3);
    assert_eq!(
        pipeline.run_cycle().await.unwrap().devices,
        3,
        "cycle reuses the refreshed list"
    );
}
