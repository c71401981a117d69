//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → classify.rs (exclusion lists, API prefixes)
//!     → Classification { class, mode }
//!     → admission pipeline picks the stages to run
//! ```
//!
//! # Design Decisions
//! - Lists compiled at startup (and on reload), immutable at runtime
//! - No regex in the hot path (exact and prefix matching only)
//! - Deterministic: same path always yields the same classification

pub mod classify;

pub use classify::{AdmissionMode, Classification, RouteClass, RouteClassifier};
