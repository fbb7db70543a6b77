pub mod category;

pub use category::{Category, SYSTEM_PID, auto_categorize};

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::bus::host::StreamHost;
use crate::bus::{BusRegistry, VirtualBus};
use crate::directory::{AudioSession, DeviceDirectory, DeviceManager, PhysicalDevice};
use crate::dsp::{Processor, StreamFormat};
use crate::error::EngineError;
use crate::profile::Profile;

/// One routing edge: a category plays through `bus_name` onto the physical
/// device `device_index`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub device_index: u32,
    pub bus_name: String,
}

#[derive(Copy, Clone, Debug, Default)]
struct UnifiedMode {
    enabled: bool,
    output_device: Option<u32>,
    input_device: Option<u32>,
}

/// The routing graph: category -> (device, bus) edges, sticky per-session
/// category overrides, unified-device policy, and the bus registry the
/// edges point into.
///
/// Control-thread only. The audio threads never touch the route table;
/// everything they need reaches them through each bus's processor slot and
/// the processors' shared parameter cells.
pub struct Router {
    directory: Arc<dyn DeviceDirectory>,
    devices: DeviceManager,
    buses: BusRegistry,
    routes: HashMap<Category, Route>,
    session_categories: HashMap<i32, Category>,
    name_overrides: HashMap<String, Category>,
    unified: UnifiedMode,
}

impl Router {
    pub fn new(directory: Arc<dyn DeviceDirectory>, default_format: StreamFormat) -> Self {
        let devices = DeviceManager::new(Arc::clone(&directory));
        Self {
            directory,
            devices,
            buses: BusRegistry::new(default_format),
            routes: HashMap::new(),
            session_categories: HashMap::new(),
            name_overrides: HashMap::new(),
            unified: UnifiedMode::default(),
        }
    }

    // ---- routes ----------------------------------------------------------

    /// Create (or replace) the route for a category. Under unified mode the
    /// requested device is overridden by the unified device for the
    /// category's direction before anything is stored. The named bus is
    /// created (Stopped) on first reference.
    pub fn create_route(
        &mut self,
        category: Category,
        device_index: u32,
        bus_name: &str,
    ) -> Result<(), EngineError> {
        let device_index = self.unified_override(category, device_index);
        self.devices.assign(category, device_index)?;
        self.buses.ensure(bus_name);

        debug!("route: {category} -> device {device_index} via '{bus_name}'");
        self.routes.insert(
            category,
            Route {
                device_index,
                bus_name: bus_name.to_string(),
            },
        );
        Ok(())
    }

    pub fn remove_route(&mut self, category: Category) -> bool {
        self.routes.remove(&category).is_some()
    }

    pub fn route(&self, category: Category) -> Option<&Route> {
        self.routes.get(&category)
    }

    pub fn routes(&self) -> &HashMap<Category, Route> {
        &self.routes
    }

    /// A route is resolved while its device is still present in the last
    /// enumeration.
    pub fn is_route_resolved(&self, category: Category) -> bool {
        self.routes.contains_key(&category) && self.devices.assigned(category).is_some()
    }

    /// Remove a bus and every route naming it. The bus is stopped exactly
    /// once on the way out.
    pub fn remove_bus(&mut self, bus_name: &str) -> bool {
        if !self.buses.contains(bus_name) {
            return false;
        }
        self.routes.retain(|category, route| {
            if route.bus_name == bus_name {
                debug!("dropping route {category} with bus '{bus_name}'");
                false
            } else {
                true
            }
        });
        self.buses.remove(bus_name)
    }

    pub fn bus(&self, bus_name: &str) -> Option<&VirtualBus> {
        self.buses.get(bus_name)
    }

    pub fn bus_for_category(&self, category: Category) -> Option<&VirtualBus> {
        self.routes
            .get(&category)
            .and_then(|route| self.buses.get(&route.bus_name))
    }

    // ---- processing ------------------------------------------------------

    /// Attach a DSP stage to the bus the category routes through.
    pub fn apply_processing(
        &mut self,
        category: Category,
        stage: Box<dyn Processor>,
    ) -> Result<(), EngineError> {
        let bus = self
            .routes
            .get(&category)
            .and_then(|route| self.buses.get(&route.bus_name))
            .ok_or(EngineError::RouteNotFound(category))?;
        bus.add_processor(stage);
        Ok(())
    }

    /// Detach the first stage with this label from the category's bus.
    pub fn remove_processing(
        &mut self,
        category: Category,
        label: &str,
    ) -> Result<bool, EngineError> {
        let bus = self
            .routes
            .get(&category)
            .and_then(|route| self.buses.get(&route.bus_name))
            .ok_or(EngineError::RouteNotFound(category))?;
        Ok(bus.remove_processor(label))
    }

    // ---- lifecycle -------------------------------------------------------

    pub fn start_routing(&mut self, host: &dyn StreamHost) -> Result<(), EngineError> {
        info!("starting {} virtual bus(es)", self.buses.len());
        self.buses.start_all(host)
    }

    pub fn stop_routing(&mut self) {
        info!("stopping all virtual buses");
        self.buses.stop_all();
    }

    /// Re-enumerate devices and drop assignments that vanished; affected
    /// routes become unresolved but stay configured so a returning device
    /// picks them back up.
    pub fn refresh_devices(&mut self) {
        self.devices.refresh();
        for (category, route) in &self.routes {
            if self.devices.assigned(*category).is_none() {
                warn!(
                    "route {category} -> device {} is unresolved",
                    route.device_index
                );
            }
        }
    }

    pub fn output_devices(&self) -> Vec<&PhysicalDevice> {
        self.devices.output_devices()
    }

    pub fn input_devices(&self) -> Vec<&PhysicalDevice> {
        self.devices.input_devices()
    }

    pub fn device_for_category(&self, category: Category) -> Option<&PhysicalDevice> {
        self.devices.assigned(category)
    }

    // ---- unified mode ----------------------------------------------------

    /// Force every output category onto one device and the microphone onto
    /// another. Existing routes are rewritten; later `create_route` calls
    /// are overridden on the way in.
    pub fn set_unified_device_mode(
        &mut self,
        enabled: bool,
        output_device: Option<u32>,
        input_device: Option<u32>,
    ) {
        self.unified = UnifiedMode {
            enabled,
            output_device,
            input_device,
        };
        if !enabled {
            return;
        }

        if let Some(out_idx) = output_device {
            for category in Category::OUTPUTS {
                match self.devices.assign(category, out_idx) {
                    Ok(()) => {
                        if let Some(route) = self.routes.get_mut(&category) {
                            route.device_index = out_idx;
                        }
                    }
                    Err(e) => warn!("unified mode could not claim {category}: {e}"),
                }
            }
        }
        if let Some(in_idx) = input_device {
            match self.devices.assign(Category::Microphone, in_idx) {
                Ok(()) => {
                    if let Some(route) = self.routes.get_mut(&Category::Microphone) {
                        route.device_index = in_idx;
                    }
                }
                Err(e) => warn!("unified mode could not claim microphone: {e}"),
            }
        }
    }

    pub fn unified_config(&self) -> (bool, Option<u32>, Option<u32>) {
        (
            self.unified.enabled,
            self.unified.output_device,
            self.unified.input_device,
        )
    }

    fn unified_override(&self, category: Category, requested: u32) -> u32 {
        if !self.unified.enabled {
            return requested;
        }
        let forced = if category.is_output() {
            self.unified.output_device
        } else {
            self.unified.input_device
        };
        forced.unwrap_or(requested)
    }

    // ---- sessions --------------------------------------------------------

    /// Sticky per-process override; beats auto-categorization until the
    /// process disappears.
    pub fn set_session_category(
        &mut self,
        pid: i32,
        category: Category,
    ) -> Result<(), EngineError> {
        if !category.is_output() {
            return Err(EngineError::UnknownCategory(
                "microphone is not a session category".to_string(),
            ));
        }
        self.session_categories.insert(pid, category);
        Ok(())
    }

    pub fn session_category(&self, pid: i32) -> Option<Category> {
        self.session_categories.get(&pid).copied()
    }

    /// Persisted session-name override, applied when no pid override exists.
    pub fn set_session_name_override(&mut self, name: &str, category: Category) {
        self.name_overrides.insert(name.to_lowercase(), category);
    }

    pub fn session_name_overrides(&self) -> &HashMap<String, Category> {
        &self.name_overrides
    }

    /// Two-tier resolution: explicit pid override, then name override, then
    /// the deterministic auto rule.
    pub fn category_of(&self, pid: i32, name: &str) -> Category {
        if let Some(category) = self.session_categories.get(&pid) {
            return *category;
        }
        if let Some(category) = self.name_overrides.get(&name.to_lowercase()) {
            return *category;
        }
        auto_categorize(name, pid)
    }

    pub fn active_sessions(&self) -> Vec<AudioSession> {
        self.directory.list_active_sessions()
    }

    // ---- volume ----------------------------------------------------------

    /// Output categories fan the level out to every currently live session
    /// resolving to the category (queried fresh from the directory, not a
    /// persisted per-bus gain). Microphone adjusts the assigned input
    /// device's endpoint volume. Returns whether anything changed.
    pub fn set_category_volume(
        &mut self,
        category: Category,
        level: u8,
    ) -> Result<bool, EngineError> {
        if level > 100 {
            return Err(EngineError::VolumeOutOfRange(level));
        }

        if category == Category::Microphone {
            return Ok(match self.devices.assigned(Category::Microphone) {
                Some(device) => self.directory.set_endpoint_volume(device.index, level),
                None => {
                    if let Some(route) = self.routes.get(&Category::Microphone) {
                        warn!("{}", EngineError::DeviceUnavailable(route.device_index));
                    }
                    false
                }
            });
        }

        let mut changed = false;
        for session in self.directory.list_active_sessions() {
            if self.category_of(session.pid, &session.name) == category
                && self.directory.set_session_volume(session.pid, level)
            {
                changed = true;
            }
        }
        Ok(changed)
    }

    // ---- persisted state hand-off ---------------------------------------

    /// Apply the routing-owned parts of a saved profile: unified devices
    /// and session-name overrides. Equalizer state is handed to the
    /// processor handles by the host.
    pub fn apply_profile(&mut self, profile: &Profile) {
        for (name, category) in &profile.session_overrides {
            self.name_overrides.insert(name.to_lowercase(), *category);
        }
        self.set_unified_device_mode(
            profile.unified.enabled,
            profile.unified.output_device,
            profile.unified.input_device,
        );
    }

    /// Read the routing-owned state back into a profile for saving. The
    /// host overlays processor state (band count, gains) before writing.
    pub fn profile_snapshot(&self, base: &Profile) -> Profile {
        let mut profile = base.clone();
        let (enabled, output_device, input_device) = self.unified_config();
        profile.unified.enabled = enabled;
        profile.unified.output_device = output_device;
        profile.unified.input_device = input_device;
        profile.session_overrides = self
            .name_overrides
            .iter()
            .map(|(name, category)| (name.clone(), *category))
            .collect();
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::host::ManualHost;
    use crate::directory::mock::MockDirectory;

    fn mock_directory() -> Arc<MockDirectory> {
        let directory = MockDirectory::new();
        directory.add_output(0, "Speakers");
        directory.add_output(1, "Headphones");
        directory.add_input(7, "Microphone");
        Arc::new(directory)
    }

    fn router_with(directory: &Arc<MockDirectory>) -> Router {
        Router::new(
            Arc::clone(directory) as Arc<dyn DeviceDirectory>,
            StreamFormat::default(),
        )
    }

    #[test]
    fn create_route_spawns_the_bus_stopped() {
        let directory = mock_directory();
        let mut router = router_with(&directory);

        router.create_route(Category::Game, 0, "bus_game").unwrap();

        let bus = router.bus("bus_game").expect("bus was not created");
        assert!(!bus.is_active());
        assert_eq!(
            router.route(Category::Game),
            Some(&Route {
                device_index: 0,
                bus_name: "bus_game".to_string()
            })
        );
    }

    #[test]
    fn create_route_rejects_direction_mismatch() {
        let directory = mock_directory();
        let mut router = router_with(&directory);

        assert!(matches!(
            router.create_route(Category::Game, 7, "bus_game"),
            Err(EngineError::DeviceDirectionMismatch { .. })
        ));
        assert!(router.route(Category::Game).is_none());

        assert!(matches!(
            router.create_route(Category::Microphone, 0, "bus_mic"),
            Err(EngineError::DeviceDirectionMismatch { .. })
        ));
    }

    #[test]
    fn unified_mode_overrides_requested_device() {
        let directory = mock_directory();
        let mut router = router_with(&directory);

        router.set_unified_device_mode(true, Some(0), Some(7));
        router.create_route(Category::Chat, 1, "bus_chat").unwrap();

        assert_eq!(router.route(Category::Chat).unwrap().device_index, 0);

        router.create_route(Category::Microphone, 7, "bus_mic").unwrap();
        assert_eq!(router.route(Category::Microphone).unwrap().device_index, 7);
    }

    #[test]
    fn enabling_unified_mode_rewrites_existing_routes() {
        let directory = mock_directory();
        let mut router = router_with(&directory);

        router.create_route(Category::Game, 1, "bus_game").unwrap();
        router.set_unified_device_mode(true, Some(0), None);

        assert_eq!(router.route(Category::Game).unwrap().device_index, 0);
    }

    #[test]
    fn removing_a_bus_removes_every_route_naming_it() {
        let directory = mock_directory();
        let mut router = router_with(&directory);
        let host = ManualHost::new();

        router.create_route(Category::Game, 0, "bus_shared").unwrap();
        router.create_route(Category::Others, 1, "bus_shared").unwrap();
        router.start_routing(&host).unwrap();

        assert!(router.remove_bus("bus_shared"));
        assert!(router.route(Category::Game).is_none());
        assert!(router.route(Category::Others).is_none());
        assert_eq!(host.closed(), 1, "bus must be stopped exactly once");
        assert!(!router.remove_bus("bus_shared"));
    }

    #[test]
    fn processing_resolves_through_the_route() {
        let directory = mock_directory();
        let mut router = router_with(&directory);

        router.create_route(Category::Game, 0, "bus_game").unwrap();
        let (gate, _handle) = crate::dsp::noise_reducer::NoiseReducer::new();
        router.apply_processing(Category::Game, Box::new(gate)).unwrap();

        assert_eq!(router.bus("bus_game").unwrap().chain_len(), 1);
        assert!(router.remove_processing(Category::Game, "noise_reducer").unwrap());
        assert_eq!(router.bus("bus_game").unwrap().chain_len(), 0);

        let (gate, _handle) = crate::dsp::noise_reducer::NoiseReducer::new();
        assert!(matches!(
            router.apply_processing(Category::Chat, Box::new(gate)),
            Err(EngineError::RouteNotFound(Category::Chat))
        ));
    }

    #[test]
    fn category_volume_fans_out_to_live_matching_sessions() {
        let directory = mock_directory();
        directory.add_session(100, "game.exe", Some(80));
        directory.add_session(200, "Discord.exe", Some(80));
        directory.add_session(300, "firefox.exe", Some(80));
        let mut router = router_with(&directory);

        router.set_session_category(100, Category::Game).unwrap();

        assert!(router.set_category_volume(Category::Game, 40).unwrap());
        assert_eq!(directory.session_volume_calls(), vec![(100, 40)]);
        assert_eq!(directory.session_volume(100), Some(40));
        assert_eq!(directory.session_volume(200), Some(80));

        // Auto-categorized chat app picks up chat volume without overrides.
        assert!(router.set_category_volume(Category::Chat, 25).unwrap());
        assert_eq!(directory.session_volume(200), Some(25));
    }

    #[test]
    fn microphone_volume_goes_to_the_endpoint() {
        let directory = mock_directory();
        let mut router = router_with(&directory);

        // Unassigned microphone: reported as a boolean failure, not an error.
        assert!(!router.set_category_volume(Category::Microphone, 50).unwrap());

        router.create_route(Category::Microphone, 7, "bus_mic").unwrap();
        assert!(router.set_category_volume(Category::Microphone, 50).unwrap());
        assert_eq!(directory.endpoint_volume(7), Some(50));
    }

    #[test]
    fn volume_level_is_validated() {
        let directory = mock_directory();
        let mut router = router_with(&directory);
        assert!(matches!(
            router.set_category_volume(Category::Game, 101),
            Err(EngineError::VolumeOutOfRange(101))
        ));
    }

    #[test]
    fn category_resolution_is_two_tier() {
        let directory = mock_directory();
        let mut router = router_with(&directory);

        assert_eq!(router.category_of(42, "Discord.exe"), Category::Chat);

        router.set_session_name_override("discord.exe", Category::Others);
        assert_eq!(router.category_of(42, "Discord.exe"), Category::Others);

        router.set_session_category(42, Category::Game).unwrap();
        assert_eq!(router.category_of(42, "Discord.exe"), Category::Game);

        assert!(router.set_session_category(42, Category::Microphone).is_err());
    }

    #[test]
    fn vanished_device_unresolves_the_route() {
        let directory = mock_directory();
        let mut router = router_with(&directory);

        router.create_route(Category::Game, 0, "bus_game").unwrap();
        assert!(router.is_route_resolved(Category::Game));

        directory.remove_device(0);
        router.refresh_devices();

        assert!(!router.is_route_resolved(Category::Game));
        assert!(router.route(Category::Game).is_some(), "route stays configured");
    }
}
