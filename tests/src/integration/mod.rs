//! Cross-component flows over one shared bus.

pub mod bus_properties;
pub mod editor_flows;
