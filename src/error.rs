use thiserror::Error;

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Errors returned while validating runtime configuration.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("a device identity requires a non-empty device id")]
    EmptyDeviceId,
}
