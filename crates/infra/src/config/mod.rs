//! Configuration loading from environment variables and files

pub mod loader;

pub use loader::{load, load_from_env, load_from_file, discover_config_paths};
