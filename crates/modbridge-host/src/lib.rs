//! Host side of modbridge: configuration, module processes and the data
//! service modules call back into.

pub mod config;
pub mod launcher;
pub mod store;

pub use config::{ConfigError, HostConfig, ModuleConfig};
pub use launcher::{LaunchError, LaunchedModule, launch};
pub use store::MemoryStore;
