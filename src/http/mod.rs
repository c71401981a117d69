//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware stack, request ID)
//!     → admission layer (classify, check, attach identity)
//!     → upstream.rs (rewrite URI, forward with timeout)
//!     → admission layer (security headers, rate limit headers)
//!     → Send to client
//! ```

pub mod server;
pub mod upstream;

pub use server::{gate_router, GateServer, ServerError};
pub use upstream::{Upstream, UpstreamError};
