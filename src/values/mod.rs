//! Chart values model for the Gatus release
//!
//! Defines the typed configuration document derived on every reconciliation
//! pass and its YAML rendering.

mod render;
pub mod types;


pub use types::*;
