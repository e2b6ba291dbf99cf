//! # Relay
//!
//! In-process update routing for chat bots: register handlers against
//! message text, bot commands, callback data, game short names or photo
//! captions, then dispatch each inbound update to the handlers it matches.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  queue  ┌──────────────┐  snapshot  ┌──────────────────┐
//! │ Transport │───────▶│ RelayRuntime │──────────▶│ HandlerRegistry  │──▶ callbacks
//! │ (yours)   │         │ worker pool  │            │ first match wins │
//! └───────────┘         └──────────────┘            └──────────────────┘
//! ```
//!
//! - **core**: the [`Update`](core::Update) shape and its JSON decoding
//! - **framework**: registry, matching rules, handlers, middleware, dispatcher
//! - **runtime**: configuration, logging, and the dispatch loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relay::prelude::*;
//!
//! async fn start(update: Arc<Update>) {
//!     info!(update_id = update.update_id, "Hello!");
//! }
//!
//! #[tokio::main]
//! async fn main() -> RuntimeResult<()> {
//!     let runtime = RelayRuntime::new();
//!     runtime.registry().register(Category::Command, "start", start, &[]);
//!     runtime.run().await
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: `relay.toml` configuration files (default)
//! - `yaml-config`: `relay.yaml` configuration files
//! - `json-log`: JSON log lines

pub use relay_core as core;
pub use relay_framework as framework;
pub use relay_runtime as runtime;

/// Commonly used types for building a bot.
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use relay_runtime::{
        CancellationToken, RelayConfig, RelayRuntime, RuntimeError, RuntimeResult, UpdateSender,
    };

    // Registration and matching
    pub use relay_framework::{
        Category, DispatchPolicy, Dispatcher, HandlerId, HandlerRegistry, Middleware, Pattern,
        Regex, Rule, TextPattern, middleware,
    };

    // Update model
    pub use relay_core::{CallbackQuery, EntityKind, Message, MessageEntity, Update};

    // Logging
    pub use relay_runtime::prelude::*;
}
