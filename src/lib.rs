//! Film simulation recipe catalog and matcher.
//!
//! Identifies which stored recipe produced a photograph by comparing the
//! photo's camera metadata with a local recipe catalog, and manages that
//! catalog.

pub mod config;
pub mod core;
