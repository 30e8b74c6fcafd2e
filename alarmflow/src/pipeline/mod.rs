//! The five-stage alarm pipeline.
//!
//! A cycle runs device source, URL builder, poll executor, persister and
//! notifier in order. Each stage is a barrier with a concurrent interior:
//! it fans one task out per item and hands its whole batch to the next
//! stage once every task has finished.

mod device_source;
mod executor;
mod message;
mod notifier;
mod persister;
mod url_builder;

#[cfg(test)]
mod integration_tests;

pub use device_source::DeviceSourceStage;
pub use executor::PollExecutor;
pub use message::MessageBuilder;
pub use notifier::{Notifier, NotifyReport};
pub use persister::{AlarmPersister, PersistReport};
pub use url_builder::{PollRequest, UrlBuilderStage};

use crate::auth::TokenStore;
use crate::config::AlarmflowConfig;
use crate::errors::{AlarmflowError, StageError};
use crate::ports::{PipelinePorts, PollTransport};
use crate::telemetry::SpanTimer;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// One step of the pipeline, consuming a typed batch and producing the next.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// The batch this stage consumes.
    type Input: Send + 'static;
    /// The batch this stage produces.
    type Output: Send + 'static;

    /// Returns the name of the stage.
    fn name(&self) -> &'static str;

    /// Executes the stage over a whole batch.
    ///
    /// Per-item failures are logged inside the stage. An error is returned
    /// only for a structurally invalid batch.
    async fn execute(&self, input: Self::Input) -> Result<Self::Output, StageError>;
}

/// Summary of one pipeline cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Identifier attached to every log line of the cycle.
    pub cycle_id: Uuid,
    /// Devices considered.
    pub devices: usize,
    /// Vendor requests issued.
    pub requests: usize,
    /// Alarms decoded and persisted.
    pub alarms: usize,
    /// Alarms that passed the critical filter.
    pub notified: usize,
    /// Wall-clock duration.
    pub duration_ms: u64,
}

/// The assembled pipeline.
#[derive(Debug)]
pub struct AlarmPipeline {
    device_source: DeviceSourceStage,
    url_builder: UrlBuilderStage,
    executor: PollExecutor,
    persister: AlarmPersister,
    notifier: Notifier,
}

impl AlarmPipeline {
    /// Starts building a pipeline from configuration.
    #[must_use]
    pub fn builder(config: AlarmflowConfig) -> AlarmPipelineBuilder {
        AlarmPipelineBuilder::new(config)
    }

    /// Reloads the device list. On failure the previous list is kept.
    pub async fn refresh_devices(&self) -> Result<usize, AlarmflowError> {
        Ok(self.device_source.refresh().await?)
    }

    /// Returns the URL builder, which owns the watermarks.
    #[must_use]
    pub fn url_builder(&self) -> &UrlBuilderStage {
        &self.url_builder
    }

    /// Runs stages 1 through 5 once.
    pub async fn run_cycle(&self) -> Result<CycleReport, AlarmflowError> {
        let cycle_id = Uuid::now_v7();
        let span = tracing::info_span!("cycle", %cycle_id);

        async move {
            let timer = SpanTimer::start("cycle");

            let devices = run_stage(&self.device_source, (), 0, Vec::len).await?;
            let device_count = devices.len();

            let requests = run_stage(&self.url_builder, devices, device_count, Vec::len).await?;
            let request_count = requests.len();

            let alarms = run_stage(&self.executor, requests, request_count, Vec::len).await?;
            let alarm_count = alarms.len();

            let alarms = run_stage(&self.persister, alarms, alarm_count, Vec::len).await?;
            let notified = run_stage(&self.notifier, alarms, alarm_count, Vec::len).await?;

            let report = CycleReport {
                cycle_id,
                devices: device_count,
                requests: request_count,
                alarms: alarm_count,
                notified: notified.len(),
                duration_ms: timer.elapsed_ms(),
            };
            tracing::info!(
                devices = report.devices,
                requests = report.requests,
                alarms = report.alarms,
                notified = report.notified,
                duration_ms = report.duration_ms,
                "Cycle completed"
            );
            Ok::<_, AlarmflowError>(report)
        }
        .instrument(span)
        .await
    }
}

async fn run_stage<S, F>(stage: &S, input: S::Input, items_in: usize, count: F) -> Result<S::Output, StageError>
where
    S: Stage,
    F: Fn(&S::Output) -> usize,
{
    let timer = SpanTimer::start(stage.name());
    let output = stage.execute(input).await?;
    timer.finish(items_in, count(&output));
    Ok(output)
}

/// Builder for [`AlarmPipeline`].
pub struct AlarmPipelineBuilder {
    config: AlarmflowConfig,
    ports: Option<PipelinePorts>,
    transport: Option<Arc<dyn PollTransport>>,
    tokens: Option<Arc<TokenStore>>,
}

impl AlarmPipelineBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(config: AlarmflowConfig) -> Self {
        Self {
            config,
            ports: None,
            transport: None,
            tokens: None,
        }
    }

    /// Sets the backend, geocoding and delivery ports.
    #[must_use]
    pub fn with_ports(mut self, ports: PipelinePorts) -> Self {
        self.ports = Some(ports);
        self
    }

    /// Sets the vendor transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn PollTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Shares a token store with the token refresh loop.
    #[must_use]
    pub fn with_tokens(mut self, tokens: Arc<TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Validates the configuration and assembles the stages.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the ports or transport are missing
    /// or the configuration is invalid.
    pub fn build(self) -> Result<AlarmPipeline, AlarmflowError> {
        self.config.validate()?;

        let ports = self
            .ports
            .ok_or_else(|| AlarmflowError::Config("pipeline ports are required".to_string()))?;
        let transport = self
            .transport
            .ok_or_else(|| AlarmflowError::Config("poll transport is required".to_string()))?;
        let tokens = self.tokens.unwrap_or_else(|| Arc::new(TokenStore::new()));

        let config = &self.config;
        let endpoints = Arc::new(config.endpoints()?);
        let concurrency = &config.concurrency;

        let device_source = DeviceSourceStage::new(ports.devices.clone());
        let url_builder = UrlBuilderStage::new(
            endpoints.clone(),
            ports.devices.clone(),
            config.lookback_seconds,
            concurrency.url_builder,
        )
        .with_push_watermarks(config.push_watermarks);
        let executor = PollExecutor::new(transport, endpoints, tokens, concurrency.iopgps, concurrency.whatsgps)
            .with_retry(config.retry.clone());
        let persister = AlarmPersister::new(ports.alarms.clone(), concurrency.persist);
        let notifier = Notifier::new(
            ports.contacts.clone(),
            ports.geocoder.clone(),
            ports.delivery.clone(),
            MessageBuilder::new(config.local_offset()?),
            concurrency.notify,
        )
        .with_critical_codes(config.critical_codes.clone());

        tracing::debug!(
            fan_out = concurrency.url_builder,
            iopgps = concurrency.iopgps,
            whatsgps = concurrency.whatsgps,
            "Pipeline assembled"
        );

        Ok(AlarmPipeline {
            device_source,
            url_builder,
            executor,
            persister,
            notifier,
        })
    }
}

impl Debug for AlarmPipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmPipelineBuilder")
            .field("has_ports", &self.ports.is_some())
            .field("has_transport", &self.transport.is_some())
            .field("has_tokens", &self.tokens.is_some())
            .finish_non_exhaustive()
    }
}
