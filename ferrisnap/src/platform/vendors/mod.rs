//! Built-in dialect definitions.

pub mod routeros;
