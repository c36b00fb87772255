//! Quality presets and escalation policies.
//!
//! A preset names a transcoding quality target. The three base presets map
//! directly to encoder settings; the adaptive presets (`balanced+`, `high+`)
//! describe a ladder of base presets that is climbed while the similarity
//! score stays below the acceptance threshold.

mod policy;
mod types;

pub use policy::*;
pub use types::*;
