//! Callback middleware.
//!
//! A [`Middleware`] transforms one [`Callback`] into another, wrapping it with
//! cross-cutting behavior (tracing, filtering, rate limiting, ...).
//!
//! # Ordering
//!
//! Middlewares passed at registration are applied so that **the first one in
//! the list is the outermost**: it sees each invocation first and decides
//! whether and when the rest of the chain runs.
//!
//! ```text
//! register(.., &[a, b, c])  →  a(b(c(callback)))
//!
//! call ─▶ a ─▶ b ─▶ c ─▶ callback
//! ```

use std::sync::Arc;

use futures::FutureExt;
use tracing::{Instrument, debug, debug_span, trace};

use crate::handler::Callback;
use relay_core::Update;

/// A callback transform.
pub type Middleware = Arc<dyn Fn(Callback) -> Callback + Send + Sync>;

/// Creates a middleware from a closure.
///
/// # Example
///
/// ```rust,ignore
/// let log = middleware::from_fn(|next: Callback| -> Callback {
///     Arc::new(move |update| {
///         println!("update {}", update.update_id);
///         next(update)
///     })
/// });
/// ```
pub fn from_fn<F>(f: F) -> Middleware
where
    F: Fn(Callback) -> Callback + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps `callback` with `middlewares`, the first middleware outermost.
pub fn apply_middlewares(callback: Callback, middlewares: &[Middleware]) -> Callback {
    middlewares
        .iter()
        .rev()
        .fold(callback, |inner, middleware| middleware(inner))
}

/// Runs each invocation inside a `handler` span named after `name`.
pub fn trace(name: impl Into<String>) -> Middleware {
    let name: Arc<str> = Arc::from(name.into());
    from_fn(move |next: Callback| -> Callback {
        let name = Arc::clone(&name);
        Arc::new(move |update: Arc<Update>| {
            let span = debug_span!("handler", name = %name, update_id = update.update_id);
            let next = Arc::clone(&next);
            async move {
                next(update).await;
                debug!("Handler finished");
            }
            .instrument(span)
            .boxed()
        })
    })
}

/// Skips the wrapped callback for updates rejected by `predicate`.
pub fn filter<P>(predicate: P) -> Middleware
where
    P: Fn(&Update) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    from_fn(move |next: Callback| -> Callback {
        let predicate = Arc::clone(&predicate);
        Arc::new(move |update: Arc<Update>| {
            if predicate(update.as_ref()) {
                next(update)
            } else {
                trace!(update_id = update.update_id, "Update rejected by filter");
                futures::future::ready(()).boxed()
            }
        })
    })
}
