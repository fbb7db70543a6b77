//! Engine error taxonomy.
//!
//! Configuration errors are raised synchronously to the caller; they always
//! indicate a host-side bug. Device and stream failures are recoverable and
//! surface as boolean results or a failed `start()`. Processing failures
//! never leave the audio callback; the offending stage is bypassed for the
//! tick and the error is logged instead.

use crate::router::Category;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Band index outside `[0, band_count)`.
    #[error("band index {index} out of range (equalizer has {bands} bands)")]
    BandOutOfRange { index: usize, bands: usize },

    /// Category string did not parse.
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    /// Microphone routes need an input device, everything else an output.
    #[error("category '{category}' requires an {expected} device, '{device}' is not one")]
    DeviceDirectionMismatch {
        category: Category,
        expected: &'static str,
        device: String,
    },

    /// No device with this index in the current enumeration.
    #[error("no device with index {0}")]
    DeviceNotFound(u32),

    /// Device vanished between enumeration and use. Caught at the routing
    /// layer; the route is marked unresolved rather than failing the caller.
    #[error("device {0} is no longer available")]
    DeviceUnavailable(u32),

    /// Volume levels are percentages.
    #[error("volume level {0} out of range (expected 0..=100)")]
    VolumeOutOfRange(u8),

    #[error("virtual bus '{0}' already exists")]
    BusExists(String),

    #[error("virtual bus '{0}' does not exist")]
    BusNotFound(String),

    /// No route stored for the category.
    #[error("no route configured for category '{0}'")]
    RouteNotFound(Category),

    /// The underlying hardware stream could not be opened. The bus stays
    /// stopped.
    #[error("stream failed to start: {0}")]
    StreamFailed(String),

    /// A DSP stage failed mid-callback. Only ever logged; carried as a type
    /// so stages can report the failure across the callback boundary.
    #[error("processing stage '{stage}' failed: {reason}")]
    ProcessingFailed {
        stage: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_band() {
        let err = EngineError::BandOutOfRange { index: 10, bands: 10 };
        assert_eq!(
            err.to_string(),
            "band index 10 out of range (equalizer has 10 bands)"
        );
    }

    #[test]
    fn display_names_the_bus() {
        let err = EngineError::BusNotFound("bus_game".to_string());
        assert_eq!(err.to_string(), "virtual bus 'bus_game' does not exist");
    }
}
