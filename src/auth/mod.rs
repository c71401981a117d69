//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Login (upstream application)
//!     → token.rs issue() → cookie `authToken`
//!
//! Every admitted request:
//!     → credential.rs (cookie, else Authorization: Bearer)
//!     → token.rs verify() → Identity | InvalidToken
//! ```

pub mod credential;
pub mod token;

pub use credential::extract_token;
pub use token::{Claims, Identity, InvalidToken, IssueError, TokenCodec, DEFAULT_TTL_SECS};
