//! Core definitions shared by all chdata-* crates: the error type, configuration
//! and the settings map.

pub mod compression;
pub mod config;
pub mod error;
pub mod freezable_map;
pub mod macros;
pub mod result;

pub use compression::Compression;
pub use config::{BufferingMode, DataConfig, DataFormat};
pub use freezable_map::FreezableMap;
pub use result::Result;
