//! Update dispatcher for the relay framework.
//!
//! The [`Dispatcher`] answers, for one update, which registered handlers run,
//! and runs them:
//!
//! 1. The registry is snapshotted (shared lock, released immediately)
//! 2. Handlers are checked in registration order
//! 3. Under [`DispatchPolicy::FirstMatch`] the first matching handler runs;
//!    under [`DispatchPolicy::AllMatches`] every matching handler runs, in order
//! 4. If nothing matched, the default handler runs, if one is set
//!
//! ```rust,ignore
//! let registry = Arc::new(HandlerRegistry::new());
//! registry.register(Category::Command, "start", start, &[]);
//!
//! let dispatcher = Dispatcher::new(Arc::clone(&registry))
//!     .policy(DispatchPolicy::FirstMatch)
//!     .default_handler(fallback);
//!
//! let outcome = dispatcher.dispatch(Arc::new(update)).await;
//! ```
//!
//! A custom predicate that panics is not caught here: the panic reaches
//! whoever awaits [`Dispatcher::dispatch`], which decides whether the rest of
//! the update stream continues.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tower::Service;
use tracing::{Instrument, debug, debug_span, trace};

use crate::handler::{Callback, Handler, into_callback};
use crate::registry::{HandlerRegistry, RegisteredHandler};
use relay_core::Update;

/// How many matching handlers run per update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchPolicy {
    /// Only the first matching handler runs.
    #[default]
    FirstMatch,
    /// Every matching handler runs, in registration order.
    AllMatches,
}

/// What happened to one dispatched update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Number of registered handlers that matched and ran.
    pub matched: usize,
    /// Whether the default handler ran.
    pub used_default: bool,
}

impl DispatchOutcome {
    /// Returns true if any handler, registered or default, ran.
    pub fn is_handled(&self) -> bool {
        self.matched > 0 || self.used_default
    }
}

/// Routes updates to the handlers of a [`HandlerRegistry`].
///
/// Cloning is cheap; clones share the registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    policy: DispatchPolicy,
    default_handler: Option<Callback>,
}

impl Dispatcher {
    /// Creates a first-match dispatcher over `registry`, with no default handler.
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            policy: DispatchPolicy::default(),
            default_handler: None,
        }
    }

    /// Sets the dispatch policy.
    pub fn policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the handler run when no registered handler matches.
    pub fn default_handler<H, T>(self, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.default_callback(into_callback(handler))
    }

    /// Sets an already type-erased default handler.
    pub fn default_callback(mut self, callback: Callback) -> Self {
        self.default_handler = Some(callback);
        self
    }

    /// Returns the registry this dispatcher reads.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Returns the dispatch policy.
    pub fn get_policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Returns the handlers that would run for `update`, without running them.
    pub fn select(&self, update: &Update) -> Vec<Arc<RegisteredHandler>> {
        match self.policy {
            DispatchPolicy::FirstMatch => self.registry.find_first(update).into_iter().collect(),
            DispatchPolicy::AllMatches => self.registry.find_all(update),
        }
    }

    /// Dispatches one update.
    pub async fn dispatch(&self, update: Arc<Update>) -> DispatchOutcome {
        let span = debug_span!("dispatch", update_id = update.update_id, kind = update.kind());
        self.dispatch_inner(update).instrument(span).await
    }

    async fn dispatch_inner(&self, update: Arc<Update>) -> DispatchOutcome {
        let selected = self.select(&update);

        if selected.is_empty() {
            return match &self.default_handler {
                Some(default) => {
                    trace!("No handler matched, running default handler");
                    default(update).await;
                    DispatchOutcome {
                        matched: 0,
                        used_default: true,
                    }
                }
                None => {
                    trace!("No handler matched");
                    DispatchOutcome::default()
                }
            };
        }

        for handler in &selected {
            debug!(handler_id = %handler.id(), "Handler matched, executing");
            handler.invoke(Arc::clone(&update)).await;
        }

        DispatchOutcome {
            matched: selected.len(),
            used_default: false,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handler_count", &self.registry.len())
            .field("policy", &self.policy)
            .field("has_default_handler", &self.default_handler.is_some())
            .finish()
    }
}

// ============================================================================
// Tower Service Implementation for Dispatcher
// ============================================================================

/// Tower Service implementation for Dispatcher.
///
/// This allows applying Tower middleware (timeout, concurrency limits, ...)
/// around the whole dispatch of an update.
///
/// ```rust,ignore
/// use tower::ServiceBuilder;
/// use tower::timeout::TimeoutLayer;
///
/// let service = ServiceBuilder::new()
///     .layer(TimeoutLayer::new(Duration::from_secs(5)))
///     .service(dispatcher);
/// ```
impl Service<Arc<Update>> for Dispatcher {
    type Response = DispatchOutcome;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, update: Arc<Update>) -> Self::Future {
        let dispatcher = self.clone();
        async move { Ok(dispatcher.dispatch(update).await) }.boxed()
    }
}
