//! Device topology poller.
//!
//! A control-side thread re-enumerates the directory on a fixed period and
//! publishes the delta (added/removed devices) to subscribers. The core
//! never renders a dialog; it only emits the delta.

use crossbeam::channel::{Receiver, Sender, unbounded};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::directory::{DeviceDirectory, PhysicalDevice};

/// One poll's worth of topology change.
#[derive(Clone, Debug, Default)]
pub struct DeviceDelta {
    pub added: Vec<PhysicalDevice>,
    pub removed: Vec<u32>,
}

impl DeviceDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub struct DeviceWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceWatcher {
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(2);

    /// Spawn the polling thread. Deltas arrive on the returned receiver;
    /// empty polls publish nothing.
    pub fn spawn(
        directory: Arc<dyn DeviceDirectory>,
        period: Duration,
    ) -> (Self, Receiver<DeviceDelta>) {
        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::spawn(move || poll_loop(&*directory, period, &stop_flag, &tx));

        (
            Self {
                stop,
                handle: Some(handle),
            },
            rx,
        )
    }

    /// Stop polling and join the thread. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop(
    directory: &dyn DeviceDirectory,
    period: Duration,
    stop: &AtomicBool,
    tx: &Sender<DeviceDelta>,
) {
    const TICK: Duration = Duration::from_millis(20);

    let mut known = snapshot(directory);
    while !stop.load(Ordering::Relaxed) {
        // Sleep in small steps so stop() returns promptly.
        let mut slept = Duration::ZERO;
        while slept < period && !stop.load(Ordering::Relaxed) {
            let step = TICK.min(period - slept);
            std::thread::sleep(step);
            slept += step;
        }
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let current = snapshot(directory);
        let added: Vec<PhysicalDevice> = current
            .values()
            .filter(|d| !known.contains_key(&d.index))
            .cloned()
            .collect();
        let removed: Vec<u32> = known
            .keys()
            .filter(|i| !current.contains_key(i))
            .copied()
            .collect();
        known = current;

        if !(added.is_empty() && removed.is_empty()) {
            debug!(
                "device topology changed: {} added, {} removed",
                added.len(),
                removed.len()
            );
            if tx.send(DeviceDelta { added, removed }).is_err() {
                // Every subscriber is gone; no point polling on.
                break;
            }
        }
    }
}

fn snapshot(directory: &dyn DeviceDirectory) -> HashMap<u32, PhysicalDevice> {
    let mut devices = directory.list_output_devices();
    devices.extend(directory.list_input_devices());
    devices.into_iter().map(|d| (d.index, d)).collect()
}
