use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::bus::processor::ProcessorSlot;
use crate::dsp::StreamFormat;
use crate::error::EngineError;

/// A running stream. Pure RAII: dropping the handle closes the stream, and
/// the host guarantees any in-flight callback has returned before the drop
/// completes, so the bus processor is never freed under an active tick.
pub trait StreamHandle {}

/// Opens duplex streams around a bus processor. The engine works against
/// this seam so buses can run on real hardware ([`CpalHost`]) or be driven
/// by hand in tests ([`ManualHost`]).
///
/// [`CpalHost`]: crate::bus::cpal_host::CpalHost
pub trait StreamHost {
    fn open(
        &self,
        format: StreamFormat,
        slot: ProcessorSlot,
    ) -> Result<Box<dyn StreamHandle>, EngineError>;
}

/// Test/host-less stream host: retains each opened processor slot so ticks
/// can be driven by hand, and counts opens and closes for lifecycle
/// assertions.
#[derive(Default)]
pub struct ManualHost {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    open: HashMap<String, ProcessorSlot>,
    opened: usize,
    closed: usize,
    fail_next: bool,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail, simulating unavailable hardware.
    pub fn fail_next_open(&self) {
        self.lock().fail_next = true;
    }

    /// Total streams ever opened.
    pub fn opened(&self) -> usize {
        self.lock().opened
    }

    /// Total streams closed so far.
    pub fn closed(&self) -> usize {
        self.lock().closed
    }

    pub fn open_count(&self) -> usize {
        self.lock().open.len()
    }

    pub fn is_open(&self, bus_name: &str) -> bool {
        self.lock().open.contains_key(bus_name)
    }

    /// Drive one callback tick on the named bus. Returns false when no
    /// stream is open for it.
    pub fn drive(&self, bus_name: &str, input: &[f32], output: &mut [f32]) -> bool {
        let slot = self.lock().open.get(bus_name).cloned();
        match slot {
            Some(slot) => {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .process(input, output);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StreamHost for ManualHost {
    fn open(
        &self,
        _format: StreamFormat,
        slot: ProcessorSlot,
    ) -> Result<Box<dyn StreamHandle>, EngineError> {
        let mut state = self.lock();
        if state.fail_next {
            state.fail_next = false;
            return Err(EngineError::StreamFailed(
                "manual host: simulated open failure".to_string(),
            ));
        }

        let name = slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .bus_name()
            .to_string();
        state.open.insert(name.clone(), slot);
        state.opened += 1;

        Ok(Box::new(ManualHandle {
            name,
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct ManualHandle {
    name: String,
    inner: Arc<Mutex<ManualState>>,
}

impl StreamHandle for ManualHandle {}

impl Drop for ManualHandle {
    fn drop(&mut self) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.open.remove(&self.name);
        state.closed += 1;
    }
}
