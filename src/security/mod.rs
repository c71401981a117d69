//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → suspicious.rs (user agent / referer heuristic)
//!     → client_ip.rs (derive limiter identity)
//!     → rate_limit.rs (fixed window per identity + route class)
//!     → Pass to token check
//!
//! Outgoing response:
//!     → headers.rs (CSP, HSTS, frame/sniff/referrer/permissions policy)
//! ```
//!
//! # Design Decisions
//! - Cheapest check first: the heuristic runs before any state is touched
//! - Fail closed: a limiter store error rejects the request
//! - No trust in client input beyond configured proxy headers

pub mod client_ip;
pub mod headers;
pub mod rate_limit;
pub mod suspicious;

pub use client_ip::{client_identity, ANONYMOUS};
pub use headers::SecurityHeaders;
pub use rate_limit::{MemoryStore, RateDecision, RateLimitStore, RateLimiter, StoreError};
pub use suspicious::{Suspicion, SuspicionDetector};
