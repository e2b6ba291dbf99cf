//! Handler system for the relay framework.
//!
//! This module defines the [`Handler`] trait, the action side of a
//! registration. Handlers are implemented via blanket implementations for
//! async functions and closures, so plain `async fn`s can be registered
//! directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use relay_core::Update;
//!
//! // No parameters
//! async fn ping() {
//!     println!("ping");
//! }
//!
//! // Receives the update being dispatched
//! async fn start(update: Arc<Update>) -> Result<(), std::io::Error> {
//!     println!("start from update {}", update.update_id);
//!     Ok(())
//! }
//! ```
//!
//! Once registered, a handler is stored as a type-erased [`Callback`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::error;

use relay_core::Update;

// ============================================================================
// HandleResponse - Handle handler return values
// ============================================================================

/// A trait for types that can be returned from handlers.
#[async_trait]
pub trait HandleResponse: Send {
    /// Consume the return value once the handler has finished.
    async fn into_response(self, update: &Update);
}

/// Implementation for `()` - no response needed.
#[async_trait]
impl HandleResponse for () {
    async fn into_response(self, _update: &Update) {}
}

/// Implementation for `Option<T>` where T implements HandleResponse.
#[async_trait]
impl<T: HandleResponse> HandleResponse for Option<T> {
    async fn into_response(self, update: &Update) {
        if let Some(t) = self {
            t.into_response(update).await;
        }
    }
}

/// Implementation for `Result<T, E>` where T implements HandleResponse.
///
/// On Ok, the inner value's response is handled. On Err, the error is logged.
#[async_trait]
impl<T: HandleResponse, E: std::fmt::Display + Send> HandleResponse for Result<T, E> {
    async fn into_response(self, update: &Update) {
        match self {
            Ok(t) => t.into_response(update).await,
            Err(e) => {
                error!(update_id = update.update_id, "Handler error: {e}");
            }
        }
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// The action run for an update once its registration matched.
///
/// # Blanket Implementation
///
/// This trait is automatically implemented for async functions that:
/// - Take no parameters, or a single `Arc<Update>`
/// - Return a type that implements [`HandleResponse`]
///
/// Closures taking the update need an explicit parameter type:
///
/// ```rust,ignore
/// registry.register(Category::Command, "start", |update: Arc<Update>| async move {
///     println!("{}", update.update_id);
/// }, &[]);
/// ```
#[async_trait]
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// Call the handler with the update being dispatched.
    async fn call(self, update: Arc<Update>);
}

#[async_trait]
impl<F, Fut, Res> Handler<()> for F
where
    F: FnOnce() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Res> + Send + 'static,
    Res: HandleResponse + 'static,
{
    async fn call(self, update: Arc<Update>) {
        let res = (self)().await;
        res.into_response(&update).await;
    }
}

#[async_trait]
impl<F, Fut, Res> Handler<(Arc<Update>,)> for F
where
    F: FnOnce(Arc<Update>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Res> + Send + 'static,
    Res: HandleResponse + 'static,
{
    async fn call(self, update: Arc<Update>) {
        let res = (self)(Arc::clone(&update)).await;
        res.into_response(&update).await;
    }
}

// ============================================================================
// Callback - Type-erased handler stored in the registry
// ============================================================================

/// A type-erased handler.
///
/// Internally a closure that captures the original handler and calls a
/// clone of it on each invocation. Middlewares transform one `Callback`
/// into another.
pub type Callback = Arc<dyn Fn(Arc<Update>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Convert a handler into a callback.
pub fn into_callback<H, T>(handler: H) -> Callback
where
    H: Handler<T>,
    T: 'static,
{
    Arc::new(move |update| handler.clone().call(update))
}
