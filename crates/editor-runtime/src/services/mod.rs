//! Reference owners of shared editor state.
//!
//! Each service is the authoritative sender for its slice: it answers a
//! request topic, broadcasts changes, and hands its state to late joiners.

mod preferences;
mod selection;

pub use preferences::PreferencesService;
pub use selection::SelectionService;
