//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + environment (JWT_SECRET, .env)
//!     → loader.rs (parse, deserialize, apply env overrides)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → compiled into an AdmissionPolicy shared via ArcSwap
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server rebuilds the policy and swaps it atomically
//!     → rate limit windows are kept
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AuthConfig, GateConfig, LimitConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    RateLimitConfig, RoutesConfig, SecurityConfig, TlsConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
