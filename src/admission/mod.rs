//! Admission subsystem.
//!
//! # Data Flow
//! ```text
//! Request
//!     → policy.rs (current compiled policy, hot-swappable)
//!     → pipeline.rs (classify, security check, rate limit, token check)
//!     → error.rs (rejection → HTTP response)
//!     → or forward to the upstream with identity headers attached
//! ```
//!
//! # Design Decisions
//! - One pipeline applied as one layer
//! - Rejections are a closed enum with an exhaustive response mapping
//! - Internal faults never leak detail to the client

pub mod error;
pub mod pipeline;
pub mod policy;

pub use error::{AdmissionError, ErrorBody};
pub use pipeline::{admission_middleware, admit, panic_response, Admitted, HandlerPanic};
pub use policy::{AdmissionPolicy, AdmissionState, PolicyError};
