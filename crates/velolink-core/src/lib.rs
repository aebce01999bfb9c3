//! Core utilities for the velolink device framework.
//!
//! This crate carries the transport-independent building blocks shared by
//! every adapter and protocol family:
//!
//! - **Queue**: general-purpose FIFO buffer for data en route
//! - **run_with_retries**: bounded polling retry wrapper for flaky
//!   hardware links
//! - **SettingValue / MetricValue**: typed values for cycling-mode
//!   settings and device samples

pub mod queue;
pub mod retry;
pub mod value;

pub use queue::Queue;
pub use retry::{run_with_retries, POLL_TICK};
pub use value::{MetricValue, SettingValue};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
