//! Device dialects for multi-firmware support.
//!
//! A dialect holds the command templates a firmware family understands for
//! saving, exporting and removing backup artifacts.

mod definition;
mod registry;
pub mod vendors;

pub use definition::{Dialect, FILE_PLACEHOLDER, NAME_PLACEHOLDER};
pub use registry::DialectRegistry;
