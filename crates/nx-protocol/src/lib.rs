//! # nx-protocol
//!
//! The wire contract between Nexxon clients and the runtime.
//!
//! - [`RequestEnvelope`] / [`ResponseEnvelope`]: one request in, one response out
//! - [`ErrorCode`] and [`ErrorCategory`]: the banded error taxonomy with retry metadata
//! - [`NexxonError`]: the only error type that crosses the dispatch boundary
//! - [`ExitCode`]: how the CLI turns a response into a process status

pub mod codes;
pub mod envelope;
pub mod error;
pub mod exit;

pub use codes::{ErrorCategory, ErrorCode, Fallback, RetryInfo};
pub use envelope::{
    AuthContext, Claims, Command, ErrorBody, Metrics, PolicyDirective, RequestContext,
    RequestEnvelope, ResponseEnvelope, ResponseStatus, SessionRef, API_VERSION,
};
pub use error::{ErrorContext, HelpInfo, NexxonError};
pub use exit::ExitCode;
