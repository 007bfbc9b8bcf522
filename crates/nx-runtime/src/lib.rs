//! # nx-runtime
//!
//! The request path of the Nexxon control plane.
//!
//! A [`RuntimeContext`] is built once at startup from a [`RuntimeConfig`]
//! and shared by every request. Each request envelope goes through
//! [`dispatch`]: it is audited, checked against policy, handed to its
//! command handler, and answered with a response envelope. [`server`]
//! exposes the same path over HTTP.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use nx_protocol::{Command, RequestEnvelope};
//! use nx_runtime::{dispatch, RuntimeConfig, RuntimeContext};
//!
//! # async fn run() -> Result<(), nx_runtime::RuntimeError> {
//! let ctx = RuntimeContext::open(RuntimeConfig::load(".")?)?;
//! ctx.start()?;
//! let response = dispatch(&ctx, RequestEnvelope::new(Command::Whoami)).await;
//! assert!(response.is_ok());
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod prompts;
pub mod server;

pub use collaborators::{
    DiffProducer, FileScanner, GitignoreScanner, NoVectorSearch, UnifiedDiffProducer,
    VectorError, VectorMatch, VectorSearch, VectorStats,
};
pub use config::{RuntimeConfig, DEFAULT_PORT, PORT_ENV};
pub use context::{RuntimeContext, NO_POLICY_HASH};
pub use dispatch::{dispatch, dispatch_value};
pub use error::{IntoNexxonError, RuntimeError};
pub use server::{router, serve, serve_on, shutdown_signal};
