//! # Relay Runtime
//!
//! Orchestration around the relay handler registry:
//!
//! - [`config`]: layered configuration (defaults, `relay.toml`, `RELAY_*` env)
//! - [`logging`]: tracing subscriber setup driven by that configuration
//! - [`RelayRuntime`]: a bounded update queue dispatched by a worker pool
//!
//! ```ignore
//! use relay_runtime::RelayRuntime;
//! use relay_framework::Category;
//!
//! #[tokio::main]
//! async fn main() -> relay_runtime::RuntimeResult<()> {
//!     let runtime = RelayRuntime::new();
//!
//!     runtime.registry().register(Category::Command, "ping", pong, &[]);
//!
//!     // Transports push raw payloads through a sender
//!     let sender = runtime.sender();
//!     sender.send_json(r#"{"update_id": 1, "message": {"message_id": 1, "text": "hi"}}"#).await?;
//!
//!     // Dispatch until Ctrl+C
//!     runtime.run().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, DispatchConfig, LoggingConfig, RelayConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RelayRuntime, RuntimeBuilder, RuntimeStats, UpdateSender};

// Re-export the cancellation token accepted by `RelayRuntime::run_until`.
pub use tokio_util::sync::CancellationToken;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and span helpers.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
