//! Telemetry and logging infrastructure
//!
//! Structured logging with tracing and presentation timing.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogConfig};
pub use metrics::{FrameProfiler, FrameStats};
