pub mod mock;
pub mod system;
pub mod watcher;

use log::warn;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EngineError;
use crate::router::Category;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceDirection {
    Input,
    Output,
}

impl std::fmt::Display for DeviceDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Immutable snapshot of one physical endpoint, valid for the enumeration
/// that produced it. Never mutated by the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct PhysicalDevice {
    pub index: u32,
    pub name: String,
    pub direction: DeviceDirection,
    pub channels: usize,
    pub default_sample_rate: u32,
}

/// A process currently producing audio, as reported by the platform.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioSession {
    pub pid: i32,
    pub name: String,
    pub volume_percent: Option<u8>,
}

/// The narrow interface the engine requires from the platform's device and
/// session services. Enumeration calls return an empty list when the
/// platform fails mid-call (device unplugged during the query); they never
/// raise into the engine.
pub trait DeviceDirectory: Send + Sync {
    fn list_output_devices(&self) -> Vec<PhysicalDevice>;
    fn list_input_devices(&self) -> Vec<PhysicalDevice>;
    fn list_active_sessions(&self) -> Vec<AudioSession>;
    fn set_session_volume(&self, pid: i32, percent: u8) -> bool;
    fn get_endpoint_volume(&self, device_index: u32) -> Option<u8>;
    fn set_endpoint_volume(&self, device_index: u32, percent: u8) -> bool;
}

/// Device snapshot plus the per-category device assignments, with the
/// direction rules enforced at assignment time.
pub struct DeviceManager {
    directory: Arc<dyn DeviceDirectory>,
    devices: Vec<PhysicalDevice>,
    assigned: HashMap<Category, PhysicalDevice>,
}

impl DeviceManager {
    pub fn new(directory: Arc<dyn DeviceDirectory>) -> Self {
        let mut manager = Self {
            directory,
            devices: Vec::new(),
            assigned: HashMap::new(),
        };
        manager.refresh();
        manager
    }

    /// Re-enumerate and drop assignments whose device vanished.
    pub fn refresh(&mut self) {
        let mut devices = self.directory.list_output_devices();
        devices.extend(self.directory.list_input_devices());
        self.devices = devices;

        self.assigned.retain(|category, device| {
            let still_there = self.devices.iter().any(|d| d.index == device.index);
            if !still_there {
                warn!(
                    "device '{}' for category '{category}' is no longer available",
                    device.name
                );
            }
            still_there
        });
    }

    pub fn devices(&self) -> &[PhysicalDevice] {
        &self.devices
    }

    pub fn output_devices(&self) -> Vec<&PhysicalDevice> {
        self.devices
            .iter()
            .filter(|d| d.direction == DeviceDirection::Output)
            .collect()
    }

    pub fn input_devices(&self) -> Vec<&PhysicalDevice> {
        self.devices
            .iter()
            .filter(|d| d.direction == DeviceDirection::Input)
            .collect()
    }

    pub fn find(&self, index: u32) -> Option<&PhysicalDevice> {
        self.devices.iter().find(|d| d.index == index)
    }

    /// Assign a device to a category. Microphone requires an input device,
    /// every other category an output device.
    pub fn assign(&mut self, category: Category, device_index: u32) -> Result<(), EngineError> {
        let device = self
            .find(device_index)
            .ok_or(EngineError::DeviceNotFound(device_index))?;

        let expected = if category == Category::Microphone {
            DeviceDirection::Input
        } else {
            DeviceDirection::Output
        };
        if device.direction != expected {
            return Err(EngineError::DeviceDirectionMismatch {
                category,
                expected: match expected {
                    DeviceDirection::Input => "input",
                    DeviceDirection::Output => "output",
                },
                device: device.name.clone(),
            });
        }

        self.assigned.insert(category, device.clone());
        Ok(())
    }

    pub fn assigned(&self, category: Category) -> Option<&PhysicalDevice> {
        self.assigned.get(&category)
    }

    pub fn unassign(&mut self, category: Category) {
        self.assigned.remove(&category);
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockDirectory;
    use super::*;

    fn manager() -> DeviceManager {
        let directory = MockDirectory::new();
        directory.add_output(0, "Speakers");
        directory.add_output(1, "Headphones");
        directory.add_input(2, "Microphone");
        DeviceManager::new(Arc::new(directory))
    }

    #[test]
    fn assign_enforces_direction() {
        let mut manager = manager();

        manager.assign(Category::Game, 0).unwrap();
        manager.assign(Category::Microphone, 2).unwrap();

        assert!(matches!(
            manager.assign(Category::Microphone, 0),
            Err(EngineError::DeviceDirectionMismatch { .. })
        ));
        assert!(matches!(
            manager.assign(Category::Chat, 2),
            Err(EngineError::DeviceDirectionMismatch { .. })
        ));
        assert!(matches!(
            manager.assign(Category::Game, 99),
            Err(EngineError::DeviceNotFound(99))
        ));
    }

    #[test]
    fn refresh_prunes_vanished_assignments() {
        let directory = MockDirectory::new();
        directory.add_output(0, "Speakers");
        directory.add_input(1, "Microphone");
        let directory = Arc::new(directory);
        let mut manager = DeviceManager::new(Arc::clone(&directory) as Arc<dyn DeviceDirectory>);

        manager.assign(Category::Game, 0).unwrap();
        directory.remove_device(0);
        manager.refresh();

        assert!(manager.assigned(Category::Game).is_none());
        assert!(manager.find(1).is_some());
    }
}
