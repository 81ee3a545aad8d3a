//! Layered configuration: built-in defaults, an optional file and
//! `SERVING_PROBE__` environment overrides.

pub mod loader;
pub mod types;

pub use loader::{ConfigLoader, ENV_PREFIX};
pub use types::{CanaryConfig, FanOutConfig, ProbeConfig, TimeoutConfig};
