// src/fingerprint/mod.rs
pub mod sdk;
pub mod simulated;

mod device;

pub use device::*;

use crate::config::{DeviceKind, FingerprintSettings};
use simulated::{SimulatedReader, SimulatedSdk};

/// Cria o adaptador do leitor conforme a configuração.
///
/// Com o leitor simulado devolve também o handle usado para "colocar dedos".
pub fn build_device(settings: &FingerprintSettings) -> (FingerprintDevice, Option<SimulatedReader>) {
    match settings.device {
        DeviceKind::Simulated => {
            let reader = SimulatedReader::default();
            let sdk = SimulatedSdk::new(reader.clone());
            (FingerprintDevice::new(Box::new(sdk), settings.poll_interval), Some(reader))
        }
        DeviceKind::None => (
            FingerprintDevice::new(Box::new(SimulatedSdk::without_devices()), settings.poll_interval),
            None,
        ),
    }
}
