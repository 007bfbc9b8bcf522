//! # nx-provider
//!
//! Isolates Nexxon from unreliable language-model backends.
//!
//! - [`LlmProvider`]: the completion capability every backend implements
//! - [`CircuitBreaker`]: per-provider Closed/Open/HalfOpen state machine
//! - [`ProviderRegistry`]: name → provider and name → breaker, with a default
//! - [`ProviderSpec`]: a provider declared in configuration, resolved at startup
//!
//! A failing provider opens its own breaker and stops being called for the
//! cooldown period; other providers keep working.

pub mod breaker;
pub mod error;
pub mod http;
pub mod mock;
pub mod provider;
pub mod registry;
pub mod spec;

pub use breaker::{
    BreakerConfig, BreakerStatus, CircuitBreaker, CircuitState, Clock, ManualClock, SystemClock,
};
pub use error::{BreakerError, ProviderError, RegistryError};
pub use http::{Dialect, HttpProvider};
pub use mock::{MockProvider, MOCK_PROVIDER};
pub use provider::{CompletionOptions, LlmProvider, DEFAULT_MAX_TOKENS, DEFAULT_TIMEOUT};
pub use registry::ProviderRegistry;
pub use spec::{CredentialSource, ProviderKind, ProviderSpec};
