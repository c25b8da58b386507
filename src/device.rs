//! Execution device, resolved once at startup.
//!
//! The resolved [`Device`] is handed to model construction and to the batch
//! loader. Batches carry the device they were prepared for and the model
//! refuses batches prepared for another one, so an input can never silently
//! skip a transfer.

use std::fmt;

use serde::Deserialize;
use tracing::{info, warn};

/// What the configuration asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRequest {
    Cpu,
    /// Use an accelerator when one is available, otherwise fall back to CPU
    Accelerator,
}

/// What the run actually executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// Devices this build can execute on.
pub fn available() -> Vec<Device> {
    vec![Device::Cpu]
}

impl Device {
    /// Capability check: maps a request onto an available device.
    ///
    /// An unavailable accelerator is not an error; the run continues on CPU
    /// and a warning is logged.
    pub fn resolve(request: DeviceRequest) -> Device {
        let device = match request {
            DeviceRequest::Cpu => Device::Cpu,
            DeviceRequest::Accelerator => {
                let accelerator = available().into_iter().find(|d| *d != Device::Cpu);
                accelerator.unwrap_or_else(|| {
                    warn!("no accelerator backend available, falling back to cpu");
                    Device::Cpu
                })
            }
        };
        info!(%device, "execution device selected");
        device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accelerator_request_falls_back_to_cpu() {
        assert_eq!(Device::resolve(DeviceRequest::Accelerator), Device::Cpu);
        assert_eq!(Device::resolve(DeviceRequest::Cpu), Device::Cpu);
    }
}
