//! Timing configuration for the overlay.

use std::time::Duration;

/// The four durations driving stabilization and liveness.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Pause between stabilization passes of a virtual node.
    pub stabilize_interval: Duration,
    /// How long a routing entry is trusted before it is re-probed.
    pub live_interval: Duration,
    /// Deadline for a single request/response exchange.
    pub command_timeout: Duration,
    /// Deadline for a content-fetch exchange.
    pub get_data_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            stabilize_interval: Duration::from_secs(1),
            live_interval: Duration::from_secs(1),
            command_timeout: Duration::from_secs(1),
            get_data_timeout: Duration::from_secs(1),
        }
    }
}

impl Timings {
    /// Override defaults with optional float-second values (CLI flags).
    pub fn from_secs_f64(
        stabilize_interval: Option<f64>,
        live_interval: Option<f64>,
        command_timeout: Option<f64>,
        get_data_timeout: Option<f64>,
    ) -> Self {
        let d = Self::default();
        let or = |opt: Option<f64>, fallback: Duration| {
            opt.map(Duration::from_secs_f64).unwrap_or(fallback)
        };
        Self {
            stabilize_interval: or(stabilize_interval, d.stabilize_interval),
            live_interval: or(live_interval, d.live_interval),
            command_timeout: or(command_timeout, d.command_timeout),
            get_data_timeout: or(get_data_timeout, d.get_data_timeout),
        }
    }
}
