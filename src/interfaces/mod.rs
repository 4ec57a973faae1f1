//! Adapters between the engine and the outside world: file import and report export.

pub mod csv;
