//! # Editor Runtime Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/      # Cross-component flows
//!     ├── bus_properties.rs
//!     └── editor_flows.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p editor-tests
//! cargo test -p editor-tests integration::bus_properties::
//! ```

pub mod integration;
