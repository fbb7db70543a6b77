//! CPAL-backed directory for real hardware.
//!
//! CPAL covers device enumeration only; per-process session enumeration and
//! endpoint volume are platform mixer services that live behind the
//! directory boundary and report empty/unsupported here.

use cpal::traits::{DeviceTrait, HostTrait};
use log::{debug, warn};

use crate::directory::{AudioSession, DeviceDirection, DeviceDirectory, PhysicalDevice};

/// Input devices are offset into their own index range so the two
/// enumerations never collide.
const INPUT_INDEX_BASE: u32 = 1 << 16;

pub struct CpalDirectory;

impl CpalDirectory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpalDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDirectory for CpalDirectory {
    fn list_output_devices(&self) -> Vec<PhysicalDevice> {
        let host = cpal::default_host();
        let devices = match host.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("output device enumeration failed: {e}");
                return Vec::new();
            }
        };

        devices
            .enumerate()
            .map(|(i, device)| {
                let (channels, default_sample_rate) = device
                    .default_output_config()
                    .map(|c| (c.channels() as usize, c.sample_rate().0))
                    .unwrap_or((2, 48_000));
                PhysicalDevice {
                    index: i as u32,
                    name: device.name().unwrap_or_else(|_| format!("Output {i}")),
                    direction: DeviceDirection::Output,
                    channels,
                    default_sample_rate,
                }
            })
            .collect()
    }

    fn list_input_devices(&self) -> Vec<PhysicalDevice> {
        let host = cpal::default_host();
        let devices = match host.input_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("input device enumeration failed: {e}");
                return Vec::new();
            }
        };

        devices
            .enumerate()
            .map(|(i, device)| {
                let (channels, default_sample_rate) = device
                    .default_input_config()
                    .map(|c| (c.channels() as usize, c.sample_rate().0))
                    .unwrap_or((1, 48_000));
                PhysicalDevice {
                    index: INPUT_INDEX_BASE + i as u32,
                    name: device.name().unwrap_or_else(|_| format!("Input {i}")),
                    direction: DeviceDirection::Input,
                    channels,
                    default_sample_rate,
                }
            })
            .collect()
    }

    fn list_active_sessions(&self) -> Vec<AudioSession> {
        // Session enumeration is a platform mixer service; nothing to
        // report through CPAL.
        Vec::new()
    }

    fn set_session_volume(&self, pid: i32, _percent: u8) -> bool {
        debug!("session volume for pid {pid} unsupported by the CPAL directory");
        false
    }

    fn get_endpoint_volume(&self, device_index: u32) -> Option<u8> {
        debug!("endpoint volume for device {device_index} unsupported by the CPAL directory");
        None
    }

    fn set_endpoint_volume(&self, device_index: u32, _percent: u8) -> bool {
        debug!("endpoint volume for device {device_index} unsupported by the CPAL directory");
        false
    }
}
