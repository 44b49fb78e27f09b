//! Telemetry wiring for the screambot endpoint.
//!
//! Installs the `tracing` subscriber once per process. When an exporter is
//! configured the span pipeline ships to an OTLP collector; otherwise the
//! process runs with console logging only, the "null telemetry client" of
//! the original deployment.

mod config;
mod tracing_init;

pub use config::{TelemetryConfig, TelemetryProtocol};
pub use tracing_init::{init_telemetry, telemetry_enabled, with_turn_fields};

use anyhow::Result;

/// Installs the subscriber configured from the environment.
pub fn install(service_name: &str) -> Result<()> {
    init_telemetry(TelemetryConfig::from_env(
        service_name,
        env!("CARGO_PKG_VERSION"),
    ))
}
