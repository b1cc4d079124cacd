//! Observability for the Clubhouse service.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
