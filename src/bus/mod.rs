pub mod cpal_host;
pub mod host;
pub mod processor;

use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::bus::host::{StreamHandle, StreamHost};
use crate::bus::processor::{BusProcessor, ProcessorSlot};
use crate::dsp::{Processor, StreamFormat};
use crate::error::EngineError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusState {
    Stopped,
    Starting,
    Active,
}

/// A named virtual audio stream with its own sample clock and processing
/// chain. Created Stopped; `start` opens the underlying stream, `stop`
/// releases it. The chain lives in a shared slot so the stream callback and
/// the control thread never contend for more than a tick.
pub struct VirtualBus {
    name: String,
    format: StreamFormat,
    state: BusState,
    slot: ProcessorSlot,
    stream: Option<Box<dyn StreamHandle>>,
}

impl VirtualBus {
    pub fn new(name: impl Into<String>, format: StreamFormat) -> Self {
        let name = name.into();
        let slot = Arc::new(Mutex::new(BusProcessor::new(name.clone(), format)));
        Self {
            name,
            format,
            state: BusState::Stopped,
            slot,
            stream: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn state(&self) -> BusState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == BusState::Active
    }

    /// Open the stream. A no-op when already active. The current format is
    /// pushed into every chain stage before the stream opens; on failure
    /// the bus stays Stopped and the error is surfaced to the caller.
    pub fn start(&mut self, host: &dyn StreamHost) -> Result<(), EngineError> {
        if self.state == BusState::Active {
            debug!("virtual bus '{}' already active", self.name);
            return Ok(());
        }

        self.state = BusState::Starting;
        self.lock_processor().set_format(self.format);

        match host.open(self.format, Arc::clone(&self.slot)) {
            Ok(handle) => {
                self.stream = Some(handle);
                self.state = BusState::Active;
                info!("virtual bus '{}' active", self.name);
                Ok(())
            }
            Err(e) => {
                self.state = BusState::Stopped;
                error!("virtual bus '{}' failed to start: {e}", self.name);
                Err(e)
            }
        }
    }

    /// Release the stream. Idempotent. Dropping the handle waits for the
    /// in-flight callback to return, so no buffer is freed under a tick.
    pub fn stop(&mut self) {
        if let Some(handle) = self.stream.take() {
            drop(handle);
            info!("virtual bus '{}' stopped", self.name);
        }
        self.state = BusState::Stopped;
    }

    /// Append a stage. The bus format is pushed into the stage immediately,
    /// whether or not the stream is running.
    pub fn add_processor(&self, mut stage: Box<dyn Processor>) {
        stage.set_format(self.format);
        self.lock_processor().chain_mut().add_stage(stage);
    }

    pub fn remove_processor(&self, label: &str) -> bool {
        self.lock_processor().chain_mut().remove_stage(label)
    }

    pub fn clear_processors(&self) {
        self.lock_processor().chain_mut().clear();
    }

    pub fn chain_labels(&self) -> Vec<&'static str> {
        self.lock_processor().chain().labels()
    }

    pub fn chain_len(&self) -> usize {
        self.lock_processor().chain().len()
    }

    fn lock_processor(&self) -> MutexGuard<'_, BusProcessor> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for VirtualBus {
    fn drop(&mut self) {
        self.stop();
    }
}

/// All virtual buses, keyed by their globally unique name.
#[derive(Default)]
pub struct BusRegistry {
    buses: HashMap<String, VirtualBus>,
    default_format: StreamFormat,
}

impl BusRegistry {
    pub fn new(default_format: StreamFormat) -> Self {
        Self {
            buses: HashMap::new(),
            default_format,
        }
    }

    /// Create a bus, Stopped. Errors when the name is taken.
    pub fn create(&mut self, name: &str) -> Result<&mut VirtualBus, EngineError> {
        if self.buses.contains_key(name) {
            return Err(EngineError::BusExists(name.to_string()));
        }
        debug!("creating virtual bus '{name}'");
        let format = self.default_format;
        Ok(self
            .buses
            .entry(name.to_string())
            .or_insert_with(|| VirtualBus::new(name, format)))
    }

    /// Fetch the bus, creating it (Stopped) on first reference.
    pub fn ensure(&mut self, name: &str) -> &mut VirtualBus {
        if !self.buses.contains_key(name) {
            debug!("creating virtual bus '{name}' on first reference");
        }
        let format = self.default_format;
        self.buses
            .entry(name.to_string())
            .or_insert_with(|| VirtualBus::new(name, format))
    }

    pub fn get(&self, name: &str) -> Option<&VirtualBus> {
        self.buses.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut VirtualBus> {
        self.buses.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.buses.contains_key(name)
    }

    /// Stop and drop the bus. Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.buses.remove(name) {
            Some(mut bus) => {
                bus.stop();
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.buses.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    /// Start every bus. All buses are attempted; the first failure is
    /// reported after the sweep so one bad device does not strand the rest.
    pub fn start_all(&mut self, host: &dyn StreamHost) -> Result<(), EngineError> {
        let mut first_error = None;
        for bus in self.buses.values_mut() {
            if let Err(e) = bus.start(host) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn stop_all(&mut self) {
        for bus in self.buses.values_mut() {
            bus.stop();
        }
    }
}
