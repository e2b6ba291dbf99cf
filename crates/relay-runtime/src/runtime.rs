//! Update loop: a bounded queue feeding the dispatcher through a worker pool.
//!
//! ```rust,ignore
//! use relay_runtime::RelayRuntime;
//!
//! // Loads relay.toml from the current directory, or defaults
//! let runtime = RelayRuntime::new();
//!
//! runtime.registry().register(Category::Command, "start", on_start, &[]);
//!
//! let sender = runtime.sender();
//! tokio::spawn(async move {
//!     while let Some(raw) = transport.next().await {
//!         sender.send_json(&raw).await?;
//!     }
//! });
//!
//! runtime.run().await?;
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::signal;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, RelayConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use relay_core::Update;
use relay_framework::{
    Callback, DispatchOutcome, Dispatcher, Handler, HandlerRegistry, into_callback,
};

/// Owns a handler registry and drives updates from a queue into it.
///
/// Handlers may be added to or removed from [`RelayRuntime::registry`] at any
/// time, including while [`RelayRuntime::run`] is active; each update sees
/// the registry as it was when that update started dispatching.
pub struct RelayRuntime {
    config: RelayConfig,
    registry: Arc<HandlerRegistry>,
    default_handler: RwLock<Option<Callback>>,
    sender: mpsc::Sender<Arc<Update>>,
    receiver: Mutex<Option<mpsc::Receiver<Arc<Update>>>>,
    stats: Arc<StatsCounters>,
}

impl RelayRuntime {
    /// Creates a runtime from `relay.toml` in the current directory, falling
    /// back to defaults if loading or validation fails.
    pub fn new() -> Self {
        let loaded = ConfigLoader::new()
            .with_current_dir()
            .load()
            .and_then(|config| validate_config(&config).map(|()| config));

        match loaded {
            Ok(config) => Self::from_config(&config),
            Err(e) => {
                let runtime = Self::from_config(&RelayConfig::default());
                warn!(error = %e, "Failed to load configuration, using defaults");
                runtime
            }
        }
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration and initializes
    /// logging from it.
    pub fn from_config(config: &RelayConfig) -> Self {
        logging::init_from_config(&config.logging);

        let (sender, receiver) = mpsc::channel(config.dispatch.queue_capacity.max(1));

        info!(
            log_level = %config.logging.level,
            workers = config.dispatch.workers,
            queue_capacity = config.dispatch.queue_capacity,
            policy = ?config.dispatch.policy,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            registry: Arc::new(HandlerRegistry::new()),
            default_handler: RwLock::new(None),
            sender,
            receiver: Mutex::new(Some(receiver)),
            stats: Arc::new(StatsCounters::default()),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// The registry updates are dispatched against.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Sets the handler run for updates no registered handler matches.
    ///
    /// May be called while the loop is running; updates that start
    /// dispatching afterwards use the new handler.
    pub fn set_default_handler<H, T>(&self, handler: H)
    where
        H: Handler<T>,
        T: 'static,
    {
        *self.default_handler.write() = Some(into_callback(handler));
    }

    /// Builds a dispatcher over this runtime's registry, policy and default handler.
    pub fn dispatcher(&self) -> Dispatcher {
        let dispatcher =
            Dispatcher::new(Arc::clone(&self.registry)).policy(self.config.dispatch.policy);
        match self.default_handler.read().clone() {
            Some(callback) => dispatcher.default_callback(callback),
            None => dispatcher,
        }
    }

    /// Returns a handle for pushing updates into the queue.
    pub fn sender(&self) -> UpdateSender {
        UpdateSender {
            inner: self.sender.clone(),
        }
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats.snapshot()
    }

    /// Runs the dispatch loop until `shutdown` is cancelled.
    ///
    /// Each update is dispatched on its own task, with at most
    /// `dispatch.workers` in flight. On shutdown, updates still queued are
    /// dropped and in-flight dispatches get `dispatch.shutdown_timeout_ms` to
    /// finish before they are aborted.
    ///
    /// The loop runs once per runtime: a second call fails with
    /// [`RuntimeError::AlreadyRunning`].
    pub async fn run_until(&self, shutdown: CancellationToken) -> RuntimeResult<()> {
        let mut receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(RuntimeError::AlreadyRunning)?;

        let workers = Arc::new(Semaphore::new(self.config.dispatch.workers.max(1)));
        let mut tasks = JoinSet::new();

        info!(
            handlers = self.registry.len(),
            workers = self.config.dispatch.workers,
            "Dispatch loop started"
        );

        loop {
            while let Some(result) = tasks.try_join_next() {
                self.stats.record_join(result);
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&workers).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let update = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                update = receiver.recv() => match update {
                    Some(update) => update,
                    None => {
                        debug!("Update queue closed");
                        break;
                    }
                },
            };

            let dispatcher = self.dispatcher();
            let stats = Arc::clone(&self.stats);
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = dispatcher.dispatch(update).await;
                stats.record(outcome);
            });
        }

        // Stop accepting updates before draining.
        drop(receiver);
        self.drain(&mut tasks).await;

        info!(stats = %self.stats(), "Dispatch loop stopped");
        Ok(())
    }

    /// Runs the dispatch loop until Ctrl+C (or SIGTERM on unix).
    pub async fn run(&self) -> RuntimeResult<()> {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        let watcher = tokio::spawn(async move {
            wait_for_signal().await;
            trigger.cancel();
        });

        info!("Relay runtime is now running. Press Ctrl+C to stop.");
        let result = self.run_until(shutdown).await;
        watcher.abort();
        result
    }

    async fn drain(&self, tasks: &mut JoinSet<()>) {
        if tasks.is_empty() {
            return;
        }

        let in_flight = tasks.len();
        debug!(in_flight, "Waiting for in-flight dispatches");

        let timeout = self.config.dispatch.shutdown_timeout();
        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = tasks.join_next().await {
                self.stats.record_join(result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                timeout_ms = self.config.dispatch.shutdown_timeout_ms,
                "Shutdown timeout elapsed, aborting in-flight dispatches"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }
}

impl Default for RelayRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RelayRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayRuntime")
            .field("handlers", &self.registry.len())
            .field("started", &self.receiver.lock().is_none())
            .field("stats", &self.stats())
            .finish()
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C, runtime will only stop when cancelled");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// UpdateSender
// =============================================================================

/// Cloneable handle that pushes updates into a runtime's queue.
#[derive(Debug, Clone)]
pub struct UpdateSender {
    inner: mpsc::Sender<Arc<Update>>,
}

impl UpdateSender {
    /// Queues an update, waiting for space if the queue is full.
    pub async fn send(&self, update: Update) -> RuntimeResult<()> {
        self.inner
            .send(Arc::new(update))
            .await
            .map_err(|_| RuntimeError::QueueClosed)
    }

    /// Queues an update without waiting.
    pub fn try_send(&self, update: Update) -> RuntimeResult<()> {
        self.inner.try_send(Arc::new(update)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RuntimeError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => RuntimeError::QueueClosed,
        })
    }

    /// Decodes a JSON update and queues it.
    pub async fn send_json(&self, json: &str) -> RuntimeResult<()> {
        let update = Update::from_json(json)?;
        self.send(update).await
    }

    /// Returns true once the dispatch loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

// =============================================================================
// Stats
// =============================================================================

#[derive(Debug, Default)]
struct StatsCounters {
    dispatched: AtomicU64,
    matched: AtomicU64,
    defaulted: AtomicU64,
    unhandled: AtomicU64,
    panicked: AtomicU64,
}

impl StatsCounters {
    fn record(&self, outcome: DispatchOutcome) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        if outcome.matched > 0 {
            self.matched.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.used_default {
            self.defaulted.fetch_add(1, Ordering::Relaxed);
        }
        if !outcome.is_handled() {
            self.unhandled.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_join(&self, result: Result<(), JoinError>) {
        if let Err(e) = result {
            if e.is_panic() {
                self.panicked.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Dispatch panicked");
            } else {
                debug!(error = %e, "Dispatch task cancelled");
            }
        }
    }

    fn snapshot(&self) -> RuntimeStats {
        RuntimeStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            defaulted: self.defaulted.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// Counters since the runtime was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Updates whose dispatch completed.
    pub dispatched: u64,
    /// Updates at least one registered handler matched.
    pub matched: u64,
    /// Updates handled by the default handler.
    pub defaulted: u64,
    /// Updates nothing handled.
    pub unhandled: u64,
    /// Dispatches that panicked in a handler or predicate.
    pub panicked: u64,
}

impl fmt::Display for RuntimeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dispatched={} matched={} defaulted={} unhandled={} panicked={}",
            self.dispatched, self.matched, self.defaulted, self.unhandled, self.panicked
        )
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`RelayRuntime`] with explicit configuration sources.
///
/// ```rust,ignore
/// let runtime = RelayRuntime::builder()
///     .config_file("deploy/relay.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges programmatic overrides on top of every other source.
    pub fn merge(mut self, config: RelayConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads and validates configuration, then creates the runtime.
    pub fn build(self) -> RuntimeResult<RelayRuntime> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(RelayRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{Message, MessageEntity};
    use relay_framework::{Category, HandlerId};
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    fn config(workers: usize, queue_capacity: usize) -> RelayConfig {
        let mut config = RelayConfig::default();
        config.dispatch.workers = workers;
        config.dispatch.queue_capacity = queue_capacity;
        config
    }

    fn command(update_id: i64, name: &str) -> Update {
        let text = format!("/{name}");
        let len = text.len();
        Update::message(
            update_id,
            Message::text(text).with_entity(MessageEntity::bot_command(0, len)),
        )
    }

    /// Handler that reports each call on `tx`.
    fn notify(tx: &mpsc::UnboundedSender<i64>) -> impl Handler<(Arc<Update>,)> {
        let tx = tx.clone();
        move |update: Arc<Update>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(update.update_id);
            }
        }
    }

    async fn recv_n(rx: &mut mpsc::UnboundedReceiver<i64>, n: usize) -> Vec<i64> {
        let mut seen = Vec::with_capacity(n);
        while seen.len() < n {
            let id = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for handler")
                .expect("handler channel closed");
            seen.push(id);
        }
        seen.sort_unstable();
        seen
    }

    #[tokio::test]
    async fn test_runtime_dispatches_queued_updates() {
        let runtime = Arc::new(RelayRuntime::from_config(&config(2, 16)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        runtime
            .registry()
            .register(Category::Command, "start", notify(&tx), &[]);
        runtime.set_default_handler(|| async {});

        let sender = runtime.sender();
        sender.send(command(1, "start")).await.unwrap();
        sender.send(command(2, "help")).await.unwrap();
        sender.send(command(3, "start")).await.unwrap();

        let shutdown = CancellationToken::new();
        let task = {
            let runtime = Arc::clone(&runtime);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { runtime.run_until(shutdown).await })
        };

        // Update 2 was received before 3, so shutdown waits for its default dispatch.
        assert_eq!(recv_n(&mut rx, 2).await, vec![1, 3]);
        shutdown.cancel();
        task.await.unwrap().unwrap();

        let stats = runtime.stats();
        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.matched, 2);
        assert_eq!(stats.defaulted, 1);
        assert_eq!(stats.unhandled, 0);
    }

    #[tokio::test]
    async fn test_default_handler_set_while_running() {
        let runtime = Arc::new(RelayRuntime::from_config(&config(2, 16)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        runtime
            .registry()
            .register(Category::Command, "start", notify(&tx), &[]);

        let shutdown = CancellationToken::new();
        let task = {
            let runtime = Arc::clone(&runtime);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { runtime.run_until(shutdown).await })
        };

        let sender = runtime.sender();
        sender.send(command(1, "start")).await.unwrap();
        assert_eq!(recv_n(&mut rx, 1).await, vec![1]);

        // The loop is running now.
        let fallback = {
            let tx = tx.clone();
            move |update: Arc<Update>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(-update.update_id);
                }
            }
        };
        runtime.set_default_handler(fallback);
        sender.send(command(2, "help")).await.unwrap();
        assert_eq!(recv_n(&mut rx, 1).await, vec![-2]);

        shutdown.cancel();
        task.await.unwrap().unwrap();

        let stats = runtime.stats();
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.defaulted, 1);
        assert_eq!(stats.unhandled, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_guarded_one_shot_handler_runs_once_under_concurrency() {
        let runtime = Arc::new(RelayRuntime::from_config(&config(4, 16)));
        let calls = Arc::new(AtomicUsize::new(0));
        let fired = Arc::new(AtomicBool::new(false));
        let slot: Arc<OnceLock<HandlerId>> = Arc::default();

        let id = {
            let registry = Arc::clone(runtime.registry());
            let calls = Arc::clone(&calls);
            let slot = Arc::clone(&slot);
            runtime.registry().register(
                Category::Command,
                "once",
                move |_update: Arc<Update>| {
                    let registry = Arc::clone(&registry);
                    let calls = Arc::clone(&calls);
                    let fired = Arc::clone(&fired);
                    let slot = Arc::clone(&slot);
                    async move {
                        if fired
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_err()
                        {
                            return;
                        }
                        // Let the second dispatch snapshot the registry first.
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        calls.fetch_add(1, Ordering::SeqCst);
                        if let Some(id) = slot.get() {
                            registry.unregister(id);
                        }
                    }
                },
                &[],
            )
        };
        let _ = slot.set(id);

        let sender = runtime.sender();
        sender.send(command(1, "once")).await.unwrap();
        sender.send(command(2, "once")).await.unwrap();

        let shutdown = CancellationToken::new();
        let task = {
            let runtime = Arc::clone(&runtime);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { runtime.run_until(shutdown).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while runtime.stats().dispatched < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("dispatches did not complete");
        shutdown.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(runtime.registry().is_empty());
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let runtime = RelayRuntime::from_config(&config(1, 4));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        runtime.run_until(shutdown.clone()).await.unwrap();
        assert!(matches!(
            runtime.run_until(shutdown).await,
            Err(RuntimeError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn test_sender_closed_after_shutdown() {
        let runtime = RelayRuntime::from_config(&config(1, 4));
        let sender = runtime.sender();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        runtime.run_until(shutdown).await.unwrap();

        assert!(sender.is_closed());
        assert!(matches!(
            sender.send(command(1, "start")).await,
            Err(RuntimeError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_try_send_reports_full_queue() {
        let runtime = RelayRuntime::from_config(&config(1, 1));
        let sender = runtime.sender();

        sender.try_send(command(1, "start")).unwrap();
        assert!(matches!(
            sender.try_send(command(2, "start")),
            Err(RuntimeError::QueueFull)
        ));
    }

    #[tokio::test]
    async fn test_send_json_rejects_invalid_payload() {
        let runtime = RelayRuntime::from_config(&config(1, 4));
        let sender = runtime.sender();

        assert!(matches!(
            sender.send_json("{ not json").await,
            Err(RuntimeError::Decode(_))
        ));
        sender
            .send_json(r#"{"update_id": 9, "callback_query": {"id": "q", "data": "ok"}}"#)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stop_loop() {
        async fn explode() {
            panic!("handler exploded");
        }

        let runtime = Arc::new(RelayRuntime::from_config(&config(2, 16)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        runtime
            .registry()
            .register(Category::Command, "boom", explode, &[]);
        runtime
            .registry()
            .register(Category::Command, "ok", notify(&tx), &[]);

        let sender = runtime.sender();
        sender.send(command(1, "boom")).await.unwrap();
        sender.send(command(2, "ok")).await.unwrap();

        let shutdown = CancellationToken::new();
        let task = {
            let runtime = Arc::clone(&runtime);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { runtime.run_until(shutdown).await })
        };

        assert_eq!(recv_n(&mut rx, 1).await, vec![2]);
        shutdown.cancel();
        task.await.unwrap().unwrap();

        let stats = runtime.stats();
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.dispatched, 1);
    }

    #[tokio::test]
    async fn test_worker_limit_bounds_concurrency() {
        let runtime = Arc::new(RelayRuntime::from_config(&config(2, 16)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            runtime.registry().register(
                Category::Command,
                "slow",
                move |update: Arc<Update>| {
                    let in_flight = Arc::clone(&in_flight);
                    let peak = Arc::clone(&peak);
                    let tx = tx.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        let _ = tx.send(update.update_id);
                    }
                },
                &[],
            );
        }

        let sender = runtime.sender();
        for id in 1..=6 {
            sender.send(command(id, "slow")).await.unwrap();
        }

        let shutdown = CancellationToken::new();
        let task = {
            let runtime = Arc::clone(&runtime);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { runtime.run_until(shutdown).await })
        };

        assert_eq!(recv_n(&mut rx, 6).await, vec![1, 2, 3, 4, 5, 6]);
        shutdown.cancel();
        task.await.unwrap().unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(runtime.stats().matched, 6);
    }

    #[tokio::test]
    async fn test_shutdown_timeout_aborts_stuck_dispatch() {
        let mut config = config(1, 4);
        config.dispatch.shutdown_timeout_ms = 20;
        let runtime = Arc::new(RelayRuntime::from_config(&config));
        let (tx, mut rx) = mpsc::unbounded_channel();

        runtime.registry().register(
            Category::Command,
            "stuck",
            move |update: Arc<Update>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(update.update_id);
                    std::future::pending::<()>().await;
                }
            },
            &[],
        );
        runtime.sender().send(command(1, "stuck")).await.unwrap();

        let shutdown = CancellationToken::new();
        let task = {
            let runtime = Arc::clone(&runtime);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { runtime.run_until(shutdown).await })
        };

        recv_n(&mut rx, 1).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("shutdown did not finish")
            .unwrap()
            .unwrap();

        assert_eq!(runtime.stats().dispatched, 0);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut overrides = RelayConfig::default();
        overrides.dispatch.workers = 0;

        let result = RelayRuntime::builder()
            .search_path(std::env::temp_dir().join("relay-runtime-no-config"))
            .without_env()
            .merge(overrides)
            .build();

        assert!(matches!(
            result,
            Err(RuntimeError::Config(crate::config::ConfigError::Validation { .. }))
        ));
    }

    #[test]
    fn test_stats_display() {
        let stats = RuntimeStats {
            dispatched: 3,
            matched: 2,
            defaulted: 1,
            unhandled: 0,
            panicked: 0,
        };
        assert_eq!(
            stats.to_string(),
            "dispatched=3 matched=2 defaulted=1 unhandled=0 panicked=0"
        );
    }
}
