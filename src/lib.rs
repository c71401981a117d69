//! LeadNest admission gateway library.
//!
//! Every inbound request is classified, screened, rate limited and
//! authenticated before it reaches the LeadNest web application.

pub mod admission;
pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use admission::{AdmissionError, AdmissionState};
pub use config::GateConfig;
pub use http::GateServer;
pub use lifecycle::Shutdown;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "LEADNEST_GATE_CONFIG";

/// Configuration file used when `LEADNEST_GATE_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "gate.toml";
