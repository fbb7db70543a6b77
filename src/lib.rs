// Enable pedantic lints globally, then allow the noisy ones we're not fixing.
#![warn(clippy::pedantic, clippy::nursery)]
// Not a public API, adding #[must_use] everywhere is noise
#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]
// DSP variable names (low_shelf vs high_shelf, etc.) are intentionally similar
#![allow(clippy::similar_names)]
// Audio code performs intentional casts
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap
)]
// Not a public API — no need for doc sections
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]
// Style/pedantic lints that add noise without value here
#![allow(
    clippy::module_name_repetitions,
    clippy::float_cmp,
    clippy::match_same_arms,
    clippy::struct_field_names,
    clippy::single_match_else,
    clippy::option_if_let_else
)]
// Nursery lints that are too noisy or not applicable
#![allow(clippy::redundant_pub_crate, clippy::significant_drop_tightening)]

pub mod bus;
pub mod directory;
pub mod dsp;
pub mod error;
pub mod profile;
pub mod router;
