//! Utility functions used across the pipeline.
//!
//! This module provides:
//! - Unix and vendor datetime conversions in fixed UTC offsets

mod timestamps;

pub use timestamps::{
    fixed_offset, format_local, format_vendor_datetime, now_unix, parse_vendor_datetime,
    TimestampError, GUAYAQUIL_OFFSET_SECONDS, VENDOR_DATETIME_FORMAT,
};
