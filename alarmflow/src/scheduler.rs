//! Periodic driver for the pipeline.
//!
//! Three independent timers run until shutdown: token refresh, device list
//! refresh, and pipeline ticks. At most one pipeline cycle is in flight; a
//! tick that arrives while one is running is skipped.

use crate::auth::TokenManager;
use crate::config::ScheduleConfig;
use crate::errors::AlarmflowError;
use crate::pipeline::{AlarmPipeline, CycleReport};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// What the scheduler drives.
#[async_trait]
pub trait PipelineRunner: Send + Sync {
    /// Runs one pipeline cycle.
    async fn run_cycle(&self) -> Result<CycleReport, AlarmflowError>;

    /// Reloads the device list.
    async fn refresh_devices(&self) -> Result<usize, AlarmflowError>;
}

#[async_trait]
impl PipelineRunner for AlarmPipeline {
    async fn run_cycle(&self) -> Result<CycleReport, AlarmflowError> {
        AlarmPipeline::run_cycle(self).await
    }

    async fn refresh_devices(&self) -> Result<usize, AlarmflowError> {
        AlarmPipeline::refresh_devices(self).await
    }
}

/// Clears the in-flight flag when a cycle ends, panics included.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs the pipeline on a fixed schedule.
pub struct Scheduler {
    runner: Arc<dyn PipelineRunner>,
    tokens: Option<Arc<TokenManager>>,
    schedule: ScheduleConfig,
    in_flight: Arc<AtomicBool>,
}

impl Scheduler {
    /// Creates a scheduler without token management.
    #[must_use]
    pub fn new(runner: Arc<dyn PipelineRunner>, schedule: ScheduleConfig) -> Self {
        Self {
            runner,
            tokens: None,
            schedule,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Adds the token refresh loop.
    #[must_use]
    pub fn with_token_manager(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Returns true while a cycle is running.
    #[must_use]
    pub fn is_cycle_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Starts a cycle unless one is already running.
    pub fn try_start_cycle(&self) -> Option<JoinHandle<()>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Previous cycle still running, skipping tick");
            return None;
        }

        let guard = InFlightGuard(self.in_flight.clone());
        let runner = self.runner.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = runner.run_cycle().await {
                tracing::error!(error = %e, "Pipeline cycle failed");
            }
        }))
    }

    /// Runs every loop until `shutdown` resolves, then waits for the cycle in
    /// flight to finish.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        if let Some(tokens) = &self.tokens {
            // Watermarks advance every cycle, so the first one must carry a token.
            if !tokens.load_persisted().await && tokens.refresh().await.is_err() {
                tracing::warn!("Starting without an access token");
            }
        }

        let mut token_tick = interval(self.schedule.token_refresh());
        let mut device_tick = interval(self.schedule.device_refresh());
        let mut poll_tick = interval(self.schedule.poll_interval());
        for tick in [&mut token_tick, &mut device_tick, &mut poll_tick] {
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        tracing::info!(
            poll_interval_seconds = self.schedule.poll_interval_seconds,
            device_refresh_seconds = self.schedule.device_refresh_seconds,
            token_refresh_seconds = self.schedule.token_refresh_seconds,
            "Scheduler started"
        );

        let mut current: Option<JoinHandle<()>> = None;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                _ = token_tick.tick() => {
                    if let Some(tokens) = self.tokens.clone() {
                        tokio::spawn(async move {
                            // Failures are logged by the manager.
                            let _ = tokens.refresh().await;
                        });
                    }
                }
                _ = device_tick.tick() => {
                    let runner = self.runner.clone();
                    tokio::spawn(async move {
                        if let Err(e) = runner.refresh_devices().await {
                            tracing::warn!(error = %e, "Scheduled device refresh failed");
                        }
                    });
                }
                _ = poll_tick.tick() => {
                    if let Some(handle) = self.try_start_cycle() {
                        current = Some(handle);
                    }
                }
            }
        }

        if let Some(handle) = current {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Cycle task ended abnormally");
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("schedule", &self.schedule)
            .field("in_flight", &self.is_cycle_in_flight())
            .field("has_tokens", &self.tokens.is_some())
            .finish_non_exhaustive()
    }
}
