//! # Alarmflow
//!
//! Periodic ingestion of vehicle alarm events from telematics vendor APIs,
//! with persistence and notification of critical alarms.
//!
//! Every cycle runs five stages in order:
//!
//! - **Device source**: the list of tracked devices, cached between refreshes
//! - **URL builder**: a polling window per device, advancing its watermark
//! - **Poll executor**: vendor requests with timeout retry and per-vendor limits
//! - **Persister**: canonical alarms submitted to the backend
//! - **Notifier**: critical alarms delivered to every subscribed phone
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use alarmflow::prelude::*;
//!
//! let pipeline = AlarmPipeline::builder(config)
//!     .with_ports(ports)
//!     .with_transport(transport)
//!     .with_tokens(tokens)
//!     .build()?;
//!
//! let scheduler = Scheduler::new(Arc::new(pipeline), config.schedule);
//! scheduler.run(tokio::signal::ctrl_c().map(|_| ())).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod auth;
pub mod clients;
pub mod config;
pub mod errors;
pub mod fanout;
pub mod model;
pub mod pipeline;
pub mod ports;
pub mod providers;
pub mod retry;
pub mod scheduler;
pub mod telemetry;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auth::{AccessToken, TokenManager, TokenStore};
    pub use crate::config::AlarmflowConfig;
    pub use crate::errors::{
        AlarmflowError, ApiError, AuthError, DecodeError, DeliveryError, ProviderError, StageError,
        TransportError,
    };
    pub use crate::model::{Alarm, AlarmCode, Device, Provider};
    pub use crate::pipeline::{AlarmPipeline, CycleReport, Stage};
    pub use crate::ports::{
        AlarmStore, ContactDirectory, DeviceSource, Geocoder, MessageDelivery, PipelinePorts,
        PollTransport,
    };
    pub use crate::scheduler::{PipelineRunner, Scheduler};
    pub use crate::telemetry::{init_tracing, LogFormat};
}
