//! Helpers shared by the provider driver crates.

pub mod utils;
