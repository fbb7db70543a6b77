//! Scriptable in-memory directory for tests and host-less development.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::directory::{AudioSession, DeviceDirection, DeviceDirectory, PhysicalDevice};

#[derive(Default)]
struct MockState {
    devices: Vec<PhysicalDevice>,
    sessions: Vec<AudioSession>,
    endpoint_volumes: HashMap<u32, u8>,
    session_volume_calls: Vec<(i32, u8)>,
    fail_enumeration: bool,
}

/// A [`DeviceDirectory`] whose devices and sessions are scripted by the
/// test, with call recording for fan-out assertions.
#[derive(Default)]
pub struct MockDirectory {
    state: Mutex<MockState>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_output(&self, index: u32, name: &str) {
        self.lock().devices.push(PhysicalDevice {
            index,
            name: name.to_string(),
            direction: DeviceDirection::Output,
            channels: 2,
            default_sample_rate: 48_000,
        });
    }

    pub fn add_input(&self, index: u32, name: &str) {
        self.lock().devices.push(PhysicalDevice {
            index,
            name: name.to_string(),
            direction: DeviceDirection::Input,
            channels: 1,
            default_sample_rate: 48_000,
        });
    }

    pub fn remove_device(&self, index: u32) {
        self.lock().devices.retain(|d| d.index != index);
    }

    pub fn add_session(&self, pid: i32, name: &str, volume_percent: Option<u8>) {
        self.lock().sessions.push(AudioSession {
            pid,
            name: name.to_string(),
            volume_percent,
        });
    }

    pub fn clear_sessions(&self) {
        self.lock().sessions.clear();
    }

    /// Make every enumeration call return empty, simulating a platform
    /// failure mid-query.
    pub fn set_fail_enumeration(&self, fail: bool) {
        self.lock().fail_enumeration = fail;
    }

    /// Every `(pid, percent)` passed to `set_session_volume`, in order.
    pub fn session_volume_calls(&self) -> Vec<(i32, u8)> {
        self.lock().session_volume_calls.clone()
    }

    pub fn session_volume(&self, pid: i32) -> Option<u8> {
        self.lock()
            .sessions
            .iter()
            .find(|s| s.pid == pid)
            .and_then(|s| s.volume_percent)
    }

    pub fn endpoint_volume(&self, index: u32) -> Option<u8> {
        self.lock().endpoint_volumes.get(&index).copied()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceDirectory for MockDirectory {
    fn list_output_devices(&self) -> Vec<PhysicalDevice> {
        let state = self.lock();
        if state.fail_enumeration {
            return Vec::new();
        }
        state
            .devices
            .iter()
            .filter(|d| d.direction == DeviceDirection::Output)
            .cloned()
            .collect()
    }

    fn list_input_devices(&self) -> Vec<PhysicalDevice> {
        let state = self.lock();
        if state.fail_enumeration {
            return Vec::new();
        }
        state
            .devices
            .iter()
            .filter(|d| d.direction == DeviceDirection::Input)
            .cloned()
            .collect()
    }

    fn list_active_sessions(&self) -> Vec<AudioSession> {
        let state = self.lock();
        if state.fail_enumeration {
            return Vec::new();
        }
        state.sessions.clone()
    }

    fn set_session_volume(&self, pid: i32, percent: u8) -> bool {
        let mut state = self.lock();
        state.session_volume_calls.push((pid, percent));
        match state.sessions.iter_mut().find(|s| s.pid == pid) {
            Some(session) => {
                session.volume_percent = Some(percent);
                true
            }
            None => false,
        }
    }

    fn get_endpoint_volume(&self, device_index: u32) -> Option<u8> {
        self.lock().endpoint_volumes.get(&device_index).copied()
    }

    fn set_endpoint_volume(&self, device_index: u32, percent: u8) -> bool {
        let mut state = self.lock();
        if state.devices.iter().any(|d| d.index == device_index) {
            state.endpoint_volumes.insert(device_index, percent);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_enumeration_returns_empty_not_stale() {
        let directory = MockDirectory::new();
        directory.add_output(0, "Speakers");
        assert_eq!(directory.list_output_devices().len(), 1);

        directory.set_fail_enumeration(true);
        assert!(directory.list_output_devices().is_empty());
        assert!(directory.list_active_sessions().is_empty());
    }

    #[test]
    fn endpoint_volume_requires_a_known_device() {
        let directory = MockDirectory::new();
        directory.add_input(3, "Microphone");

        assert!(directory.set_endpoint_volume(3, 60));
        assert_eq!(directory.get_endpoint_volume(3), Some(60));
        assert!(!directory.set_endpoint_volume(9, 60));
    }
}
