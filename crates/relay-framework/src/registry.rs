//! Handler registry.
//!
//! The [`HandlerRegistry`] owns every registered handler in insertion order.
//! It is safe to share across threads: registration and removal take an
//! exclusive lock, and readers take a shared lock only long enough to clone
//! the list of `Arc`s. Matching then runs without any lock held, so a slow
//! predicate never blocks registration, and a handler removed mid-dispatch is
//! simply still present in that dispatch's snapshot.
//!
//! ```rust,ignore
//! let registry = HandlerRegistry::new();
//!
//! let id = registry.register(Category::Command, "start", start_handler, &[]);
//! let admin = registry.register_match_fn(
//!     |update| update.message.is_some(),
//!     admin_handler,
//!     &[middleware::trace("admin")],
//! );
//!
//! registry.unregister(&id);
//! ```

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{debug, trace, warn};

use crate::handler::{Callback, Handler, into_callback};
use crate::matcher::{Category, Pattern, Rule};
use crate::middleware::{Middleware, apply_middlewares};
use relay_core::Update;

// ============================================================================
// HandlerId
// ============================================================================

/// Opaque identifier of a registered handler.
///
/// A random alphanumeric token. Collisions between live handlers are
/// treated as improbable enough to ignore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(String);

impl HandlerId {
    /// Number of characters in a generated identifier.
    pub const LEN: usize = 16;

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        let id = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(Self::LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HandlerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for HandlerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<HandlerId> for String {
    fn from(id: HandlerId) -> Self {
        id.0
    }
}

// ============================================================================
// RegisteredHandler
// ============================================================================

/// A handler as stored in the registry. Immutable once registered.
pub struct RegisteredHandler {
    id: HandlerId,
    rule: Rule,
    callback: Callback,
}

impl RegisteredHandler {
    /// Returns the identifier of this handler.
    pub fn id(&self) -> &HandlerId {
        &self.id
    }

    /// Returns the matching rule of this handler.
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Returns the middleware-wrapped callback of this handler.
    pub fn callback(&self) -> &Callback {
        &self.callback
    }

    /// Checks whether this handler applies to `update`.
    pub fn matches(&self, update: &Update) -> bool {
        self.rule.matches(update)
    }

    /// Invokes the callback with `update`.
    pub fn invoke(&self, update: Arc<Update>) -> BoxFuture<'static, ()> {
        (self.callback)(update)
    }
}

impl fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("id", &self.id)
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// HandlerRegistry
// ============================================================================

/// A thread-safe, ordered collection of registered handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Vec<Arc<RegisteredHandler>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler selected by category and pattern.
    ///
    /// `middlewares` wrap the handler, the first one outermost. Neither the
    /// category nor the pattern is validated: an unknown category or a
    /// pattern that is not a valid regular expression only ever shows up as
    /// "no match" (or substring-only matching) at dispatch time.
    pub fn register<H, T>(
        &self,
        category: Category,
        pattern: impl Into<Pattern>,
        handler: H,
        middlewares: &[Middleware],
    ) -> HandlerId
    where
        H: Handler<T>,
        T: 'static,
    {
        self.register_callback(category, pattern, into_callback(handler), middlewares)
    }

    /// Registers an already type-erased callback selected by category and pattern.
    pub fn register_callback(
        &self,
        category: Category,
        pattern: impl Into<Pattern>,
        callback: Callback,
        middlewares: &[Middleware],
    ) -> HandlerId {
        let pattern = pattern.into();
        if let Pattern::Text(text) = &pattern
            && category != Category::Command
            && !text.is_valid_regex()
        {
            warn!(
                category = %category,
                pattern = text.source(),
                "Pattern is not a valid regular expression, matching by substring only"
            );
        }

        self.insert(
            Rule::Structured { category, pattern },
            apply_middlewares(callback, middlewares),
        )
    }

    /// Registers a handler selected by a custom predicate.
    ///
    /// The predicate replaces category and pattern evaluation entirely.
    pub fn register_match_fn<P, H, T>(
        &self,
        predicate: P,
        handler: H,
        middlewares: &[Middleware],
    ) -> HandlerId
    where
        P: Fn(&Update) -> bool + Send + Sync + 'static,
        H: Handler<T>,
        T: 'static,
    {
        self.insert(
            Rule::predicate(predicate),
            apply_middlewares(into_callback(handler), middlewares),
        )
    }

    fn insert(&self, rule: Rule, callback: Callback) -> HandlerId {
        let mut handlers = self.handlers.write();

        let id = HandlerId::generate();
        debug!(
            handler_id = %id,
            category = rule.category().map_or("predicate", |c| c.as_str()),
            position = handlers.len(),
            "Registered handler"
        );

        handlers.push(Arc::new(RegisteredHandler {
            id: id.clone(),
            rule,
            callback,
        }));
        id
    }

    /// Removes the handler with the given id.
    ///
    /// Unknown ids are ignored. Returns whether a handler was removed. The
    /// relative order of the remaining handlers is preserved.
    pub fn unregister(&self, id: impl AsRef<str>) -> bool {
        let id = id.as_ref();
        let mut handlers = self.handlers.write();

        match handlers.iter().position(|h| h.id.as_str() == id) {
            Some(index) => {
                handlers.remove(index);
                debug!(handler_id = id, remaining = handlers.len(), "Unregistered handler");
                true
            }
            None => {
                trace!(handler_id = id, "Unregister of unknown handler ignored");
                false
            }
        }
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    /// Returns the handlers registered right now, in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<RegisteredHandler>> {
        self.handlers.read().clone()
    }

    /// Returns the handler with the given id.
    pub fn get(&self, id: impl AsRef<str>) -> Option<Arc<RegisteredHandler>> {
        let id = id.as_ref();
        self.handlers
            .read()
            .iter()
            .find(|h| h.id.as_str() == id)
            .cloned()
    }

    /// Returns the ids of all handlers, in insertion order.
    pub fn ids(&self) -> Vec<HandlerId> {
        self.handlers.read().iter().map(|h| h.id.clone()).collect()
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Returns the first handler, in insertion order, that applies to `update`.
    pub fn find_first(&self, update: &Update) -> Option<Arc<RegisteredHandler>> {
        self.snapshot().into_iter().find(|h| h.matches(update))
    }

    /// Returns every handler that applies to `update`, in insertion order.
    pub fn find_all(&self, update: &Update) -> Vec<Arc<RegisteredHandler>> {
        self.snapshot()
            .into_iter()
            .filter(|h| h.matches(update))
            .collect()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handler_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::matches;
    use regex::Regex;
    use relay_core::Message;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn noop() {}

    #[test]
    fn test_generated_id_shape() {
        let id = HandlerId::generate();
        assert_eq!(id.as_str().len(), HandlerId::LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, HandlerId::generate());
    }

    #[test]
    fn test_register_unregister() {
        let registry = HandlerRegistry::new();

        let id1 = registry.register(Category::CallbackQueryData, "", noop, &[]);
        let id2 = registry.register(Category::CallbackQueryData, "", noop, &[]);

        assert_eq!(registry.len(), 2);
        assert!(registry.get(&id1).is_some());
        assert!(registry.get(&id2).is_some());

        assert!(registry.unregister(&id1));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&id1).is_none());

        let remaining = registry.get(&id2).unwrap();
        assert_eq!(remaining.id(), &id2);
        assert!(matches(&remaining, &Update::callback_data(1, "anything")));
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = HandlerRegistry::new();
        let id = registry.register(Category::MessageText, "x", noop, &[]);

        assert!(!registry.unregister("no-such-handler"));
        assert_eq!(registry.ids(), vec![id.clone()]);

        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_insertion_order_preserved_across_removal() {
        let registry = HandlerRegistry::new();
        let ids: Vec<_> = (0..5)
            .map(|_| registry.register(Category::MessageText, "x", noop, &[]))
            .collect();

        registry.unregister(&ids[1]);
        registry.unregister(&ids[3]);

        assert_eq!(registry.ids(), vec![ids[0].clone(), ids[2].clone(), ids[4].clone()]);
    }

    #[test]
    fn test_find_first_and_all() {
        let registry = HandlerRegistry::new();
        let _ = registry.register(Category::CallbackQueryData, "^page:", noop, &[]);
        let any = registry.register(Category::CallbackQueryData, "", noop, &[]);
        let page = registry.register(Category::CallbackQueryData, "page", noop, &[]);

        let update = Update::callback_data(1, "next");
        assert_eq!(registry.find_first(&update).unwrap().id(), &any);

        let update = Update::callback_data(2, "page:3");
        let all: Vec<_> = registry
            .find_all(&update)
            .iter()
            .map(|h| h.id().clone())
            .collect();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2], page);

        assert!(registry.find_first(&Update::default()).is_none());
    }

    #[test]
    fn test_match_fn_registration() {
        let registry = HandlerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        let id = registry.register_match_fn(
            move |update| {
                c.fetch_add(1, Ordering::SeqCst);
                update.update_id == 42
            },
            noop,
            &[],
        );

        let handler = registry.get(&id).unwrap();
        assert_eq!(handler.rule().category(), None);
        assert!(matches(&handler, &Update::callback_data(42, "")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_accepts_any_pattern() {
        let registry = HandlerRegistry::new();
        registry.register(Category::Unknown, "", noop, &[]);
        registry.register(Category::MessageText, "a(b", noop, &[]);
        registry.register(Category::MessageText, Regex::new("^a").unwrap(), noop, &[]);
        registry.register(Category::MessageText, Pattern::None, noop, &[]);
        assert_eq!(registry.len(), 4);

        let update = Update::message(1, Message::text("a(b"));
        assert_eq!(registry.find_all(&update).len(), 2);
    }

    #[tokio::test]
    async fn test_middlewares_wrap_callback() {
        let registry = HandlerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        let id = registry.register(
            Category::MessageText,
            "",
            move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            },
            &[crate::middleware::filter(|u| u.update_id > 0)],
        );

        let handler = registry.get(&id).unwrap();
        handler.invoke(Arc::new(Update::default())).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        handler
            .invoke(Arc::new(Update::message(1, Message::text("hi"))))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_snapshot_survives_unregister() {
        let registry = HandlerRegistry::new();
        let id = registry.register(Category::MessageText, "x", noop, &[]);

        let snapshot = registry.snapshot();
        registry.unregister(&id);

        assert!(registry.is_empty());
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].matches(&Update::message(1, Message::text("x"))));
    }

    #[test]
    fn test_concurrent_register_and_match() {
        const WRITERS: usize = 4;
        const READERS: usize = 4;
        const PER_WRITER: usize = 200;

        let registry = Arc::new(HandlerRegistry::new());
        let update = Update::message(1, Message::text("hello"));

        let ids: Vec<HandlerId> = std::thread::scope(|s| {
            let writers: Vec<_> = (0..WRITERS)
                .map(|w| {
                    let registry = Arc::clone(&registry);
                    s.spawn(move || {
                        let mut ids = Vec::with_capacity(PER_WRITER);
                        for i in 0..PER_WRITER {
                            let id = registry.register(Category::MessageText, "hello", noop, &[]);
                            // Churn: remove every other handler of this writer.
                            if (w + i) % 2 == 0 {
                                registry.unregister(&id);
                            } else {
                                ids.push(id);
                            }
                        }
                        ids
                    })
                })
                .collect();

            for _ in 0..READERS {
                let registry = Arc::clone(&registry);
                let update = update.clone();
                s.spawn(move || {
                    for _ in 0..PER_WRITER {
                        for handler in registry.find_all(&update) {
                            assert!(handler.matches(&update));
                        }
                    }
                });
            }

            writers
                .into_iter()
                .flat_map(|w| w.join().unwrap())
                .collect()
        });

        assert_eq!(registry.len(), ids.len());
        assert_eq!(ids.len(), WRITERS * PER_WRITER / 2);

        let live: HashSet<_> = registry.ids().into_iter().collect();
        assert_eq!(live.len(), ids.len(), "duplicate ids");
        assert!(ids.iter().all(|id| live.contains(id)));
    }
}
