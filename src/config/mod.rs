//! Configuration module for orbit-relay.
//!
//! This module is split into several sub-modules:
//! - `types`: Sub-config types, constants and serde defaults
//! - `config_struct`: Config struct definition
//! - `defaults`: Config Default implementation
//! - `catalog`: Language and voice catalogs
//! - `io`: Config loading and saving

mod catalog;
mod config_struct;
mod defaults;
mod io;
mod types;

// Re-export public types for external use
pub use catalog::{is_known_voice, language_name, LANGUAGES, VOICES};
pub use config_struct::Config;
pub use io::{get_config_path, load_config_from, save_config_to};
pub use types::{PollingConfig, StoreConfig};
