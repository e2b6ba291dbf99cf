//! # Relay Framework
//!
//! The decision layer between "an update arrived" and "which business logic
//! runs".
//!
//! This layer provides:
//! - [`HandlerRegistry`]: a thread-safe, ordered collection of handlers
//! - [`Rule`] matching: category + pattern, or a custom predicate
//! - [`Handler`] trait for async functions, stored as type-erased [`Callback`]s
//! - [`Middleware`] callback transforms, applied first-outermost
//! - [`Dispatcher`]: a reference dispatch loop over the registry
//!
//! ```text
//! ┌────────────┐  snapshot  ┌────────────────┐  match  ┌──────────────────────┐
//! │ Dispatcher │──────────▶│    Registry    │────────▶│ Callback + middleware │
//! └────────────┘            │ RwLock<Vec<_>> │         └──────────────────────┘
//!                           └────────────────┘
//! ```

pub mod dispatcher;
pub mod handler;
pub mod matcher;
pub mod middleware;
pub mod registry;

pub use dispatcher::{DispatchOutcome, DispatchPolicy, Dispatcher};
pub use handler::{Callback, HandleResponse, Handler, into_callback};
pub use matcher::{Category, MatchFn, Pattern, Rule, TextPattern, matches};
pub use middleware::{Middleware, apply_middlewares};
pub use registry::{HandlerId, HandlerRegistry, RegisteredHandler};

// Precompiled patterns are built with this crate's regex engine.
pub use regex::Regex;
