//! Canonical data model shared by every pipeline stage.
//!
//! This module provides:
//! - The vendor-agnostic [`Alarm`] record and its [`AlarmCode`] vocabulary
//! - The [`Device`] polling target and its [`Provider`] tag

mod alarm;
mod device;

pub use alarm::{Alarm, AlarmCode, CRITICAL_CODES};
pub use device::{Device, Provider};
