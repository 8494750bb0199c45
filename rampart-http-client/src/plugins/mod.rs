//! Ready-made plugins.

mod metrics;
mod request_logger;

pub use metrics::{MetricsCallbackFn, MetricsPlugin};
pub use request_logger::RequestLogger;
