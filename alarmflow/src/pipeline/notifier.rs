//! Stage 5: alert subscribers about critical alarms.

use super::message::MessageBuilder;
use super::Stage;
use crate::errors::StageError;
use crate::fanout::{ConcurrencyLimit, TaskGroup};
use crate::model::{Alarm, AlarmCode, CRITICAL_CODES};
use crate::ports::{ContactDirectory, Geocoder, MessageDelivery};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Outcome counts for one notified batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotifyReport {
    /// Alarms that passed the critical-code filter.
    pub critical: usize,
    /// Messages accepted by the delivery service.
    pub delivered: usize,
    /// Messages the delivery service rejected.
    pub failed: usize,
}

/// Filters critical alarms and delivers a message per recipient.
pub struct Notifier {
    contacts: Arc<dyn ContactDirectory>,
    geocoder: Arc<dyn Geocoder>,
    delivery: Arc<dyn MessageDelivery>,
    messages: MessageBuilder,
    critical_codes: Vec<AlarmCode>,
    limit: ConcurrencyLimit,
}

impl Notifier {
    /// Creates a notifier with the default critical codes.
    #[must_use]
    pub fn new(
        contacts: Arc<dyn ContactDirectory>,
        geocoder: Arc<dyn Geocoder>,
        delivery: Arc<dyn MessageDelivery>,
        messages: MessageBuilder,
        permits: usize,
    ) -> Self {
        Self {
            contacts,
            geocoder,
            delivery,
            messages,
            critical_codes: CRITICAL_CODES.to_vec(),
            limit: ConcurrencyLimit::new(permits),
        }
    }

    /// Replaces the critical code allow-list.
    #[must_use]
    pub fn with_critical_codes(mut self, codes: Vec<AlarmCode>) -> Self {
        self.critical_codes = codes;
        self
    }

    /// Returns true if the alarm should be notified.
    #[must_use]
    pub fn is_critical(&self, alarm: &Alarm) -> bool {
        self.critical_codes.contains(&alarm.alarm_code)
    }

    /// Notifies every critical alarm and returns the filtered batch.
    pub async fn notify(&self, alarms: Vec<Alarm>) -> (Vec<Alarm>, NotifyReport) {
        let critical: Vec<Alarm> = alarms.into_iter().filter(|a| self.is_critical(a)).collect();
        let mut group = TaskGroup::new("notifier");

        for alarm in critical.iter().cloned() {
            let dispatch = Dispatch {
                contacts: self.contacts.clone(),
                geocoder: self.geocoder.clone(),
                delivery: self.delivery.clone(),
                messages: self.messages,
            };
            group.spawn(&self.limit, async move { dispatch.run(&alarm).await });
        }

        let mut report = NotifyReport {
            critical: critical.len(),
            ..NotifyReport::default()
        };
        for (delivered, failed) in group.join().await {
            report.delivered += delivered;
            report.failed += failed;
        }
        tracing::info!(
            critical = report.critical,
            delivered = report.delivered,
            failed = report.failed,
            "Notified alarm batch"
        );

        (critical, report)
    }
}

struct Dispatch {
    contacts: Arc<dyn ContactDirectory>,
    geocoder: Arc<dyn Geocoder>,
    delivery: Arc<dyn MessageDelivery>,
    messages: MessageBuilder,
}

impl Dispatch {
    /// Returns (delivered, failed).
    async fn run(&self, alarm: &Alarm) -> (usize, usize) {
        let device_id = alarm.device_id.as_str();

        let device = match self.contacts.device(device_id).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                tracing::warn!(device_id, "Device not found, skipping notification");
                return (0, 0);
            }
            Err(e) => {
                tracing::error!(device_id, error = %e, "Device lookup failed");
                return (0, 0);
            }
        };

        let recipients = match self.contacts.recipients(device_id).await {
            Ok(recipients) if recipients.is_empty() => {
                tracing::info!(device_id, "No recipients for device");
                return (0, 0);
            }
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::error!(device_id, error = %e, "Recipient lookup failed");
                return (0, 0);
            }
        };

        let address = match alarm.coordinates() {
            Some((lat, lng)) => self.geocoder.address(lat, lng).await,
            None => None,
        };

        let body = self.messages.build(alarm, &device, address.as_deref());
        if body.trim().is_empty() {
            tracing::warn!(device_id, "Empty message discarded");
            return (0, 0);
        }

        let sends = recipients.iter().map(|recipient| {
            let body = body.as_str();
            async move { (recipient, self.delivery.send(recipient, body).await) }
        });

        let mut delivered = 0;
        let mut failed = 0;
        for (recipient, result) in futures::future::join_all(sends).await {
            match result {
                Ok(receipt) => {
                    delivered += 1;
                    tracing::info!(device_id, recipient = %recipient, receipt = %receipt, "Notification sent");
                }
                Err(e) => {
                    failed += 1;
                    tracing::error!(device_id, recipient = %recipient, error = %e, "Notification failed");
                }
            }
        }
        (delivered, failed)
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("critical_codes", &self.critical_codes)
            .field("permits", &self.limit.permits())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for Notifier {
    type Input = Vec<Alarm>;
    type Output = Vec<Alarm>;

    fn name(&self) -> &'static str {
        "notifier"
    }

    async fn execute(&self, alarms: Vec<Alarm>) -> Result<Vec<Alarm>, StageError> {
        Ok(self.notify(alarms).await.0)
    }
}
