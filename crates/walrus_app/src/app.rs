//! The application context.
//!
//! [`Application`] owns the runtime and every service built on it. Layers
//! and callbacks reach those services through an [`AppHandle`], a cheap
//! clone handed out before the layers are built:
//!
//! ```text
//! Application::new(config)
//!   1. runtime + task engine
//!   2. event loop   (init)
//!   3. broker       (init, when enabled)
//!   4. empty layer tree
//!
//! Application::run()
//!   start event loop ─► attach layers ─► start broker
//!     ─► tick loop until close() or max_ticks
//!   detach layers ─► stop event loop ─► stop broker ─► shut down runtime
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tracing::{debug, info};
use uuid::Uuid;
use walrus_event::{EventLoop, TimerId};
use walrus_layer::{Layer, LayerNode, LayerTree};
use walrus_pubsub::{Broker, BrokerExt, BrokerStats, InMemoryBroker, Message};
use walrus_task::{EngineStats, TaskEngine};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::tick::TickLoop;

/// How long the runtime waits for in-flight tasks after the run ends.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

struct Shared {
    name: String,
    run_id: Uuid,
    engine: TaskEngine,
    event_loop: EventLoop,
    broker: Option<Arc<InMemoryBroker>>,
    running: AtomicBool,
    started: OnceLock<Instant>,
}

/// Cloneable access to a running application's services.
#[derive(Clone)]
pub struct AppHandle {
    inner: Arc<Shared>,
}

impl std::fmt::Debug for AppHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppHandle")
            .field("name", &self.inner.name)
            .field("run_id", &self.inner.run_id)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl AppHandle {
    /// The application name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Unique id of this application instance, attached to its logs.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// The task engine.
    #[must_use]
    pub fn engine(&self) -> &TaskEngine {
        &self.inner.engine
    }

    /// The timer service.
    #[must_use]
    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    /// The broker, if pub/sub is enabled.
    #[must_use]
    pub fn broker(&self) -> Option<&Arc<InMemoryBroker>> {
        self.inner.broker.as_ref()
    }

    /// Returns `true` if pub/sub is enabled.
    #[must_use]
    pub fn is_pubsub_available(&self) -> bool {
        self.inner.broker.is_some()
    }

    /// Ask the tick loop to stop after the current tick.
    pub fn close(&self) {
        if self.inner.running.swap(false, Ordering::AcqRel) {
            debug!(app = %self.inner.name, "close requested");
        }
    }

    /// Returns `true` while the tick loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Seconds since [`Application::run`] started (0 before that).
    #[must_use]
    pub fn time(&self) -> f32 {
        self.inner
            .started
            .get()
            .map_or(0.0, |start| start.elapsed().as_secs_f32())
    }

    /// Run `callback` once after `delay`.
    pub fn set_timeout<F>(&self, callback: F, delay: Duration) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.event_loop.set_timeout(callback, delay)
    }

    /// Run `callback` every `interval` until cleared.
    pub fn set_interval<F>(&self, callback: F, interval: Duration) -> TimerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.event_loop.set_interval(callback, interval)
    }

    /// Run `callback` as soon as possible.
    pub fn set_immediate<F>(&self, callback: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.event_loop.set_immediate(callback)
    }

    /// Cancel a timeout or interval.
    pub fn clear(&self, id: TimerId) {
        self.inner.event_loop.clear(id);
    }

    /// Subscribe to `T` payloads on `topic`.
    ///
    /// Returns `false` if pub/sub is disabled.
    pub fn subscribe<T, F>(&self, topic: &str, handler: F) -> bool
    where
        T: Send + Sync + 'static,
        F: Fn(&Message<T>) + Send + Sync + 'static,
    {
        match &self.inner.broker {
            Some(broker) => {
                broker.subscribe(topic, handler);
                true
            }
            None => false,
        }
    }

    /// Publish `value` on `topic`.
    ///
    /// Returns `false` if pub/sub is disabled or the broker is not running.
    pub fn publish<T>(&self, topic: &str, value: T) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.inner
            .broker
            .as_ref()
            .is_some_and(|broker| broker.publish(topic, value))
    }

    /// Remove every subscription on `topic`.
    pub fn unsubscribe_topic(&self, topic: &str) {
        if let Some(broker) = &self.inner.broker {
            broker.unsubscribe_all(topic);
        }
    }
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// The application instance id.
    pub run_id: Uuid,
    /// Ticks completed.
    pub ticks: u64,
    /// Wall time from start to shutdown.
    pub elapsed: Duration,
    /// Timer callbacks submitted.
    pub timers_fired: u64,
    /// Task engine counters at shutdown.
    pub tasks: EngineStats,
    /// Broker counters at shutdown, if pub/sub was enabled.
    pub broker: Option<BrokerStats>,
}

/// The application: runtime, services and layer tree.
pub struct Application {
    config: AppConfig,
    runtime: Runtime,
    handle: AppHandle,
    tree: Arc<LayerTree>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .field("handle", &self.handle)
            .field("layers", &self.tree.len())
            .finish_non_exhaustive()
    }
}

impl Application {
    /// Build the runtime and services described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`] if the runtime cannot be built.
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        let runtime = config.engine_config().build_runtime()?;
        let engine = TaskEngine::new(runtime.handle().clone());

        let event_loop = EventLoop::new(config.event_loop_config());
        event_loop.init(engine.clone());

        let broker = config.enable_pubsub.then(|| {
            let broker = Arc::new(InMemoryBroker::new());
            broker.init(engine.clone());
            broker
        });

        let run_id = Uuid::new_v4();
        debug!(app = %config.name, %run_id, pubsub = broker.is_some(), "application created");

        let handle = AppHandle {
            inner: Arc::new(Shared {
                name: config.name.clone(),
                run_id,
                engine,
                event_loop,
                broker,
                running: AtomicBool::new(false),
                started: OnceLock::new(),
            }),
        };

        Ok(Self {
            config,
            runtime,
            handle,
            tree: Arc::new(LayerTree::new()),
        })
    }

    /// A handle for layers and callbacks to reach the services.
    #[must_use]
    pub fn handle(&self) -> AppHandle {
        self.handle.clone()
    }

    /// The configuration this application was built from.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The layer tree.
    #[must_use]
    pub fn tree(&self) -> &Arc<LayerTree> {
        &self.tree
    }

    /// Replace the layer tree, e.g. with one made by
    /// [`LayerTree::builder`].
    #[must_use]
    pub fn with_tree(mut self, tree: LayerTree) -> Self {
        self.tree = Arc::new(tree);
        self
    }

    /// Add a root layer.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Layer`] if the name is taken.
    pub fn push_layer<'n>(
        &self,
        name: impl Into<Option<&'n str>>,
        layer: impl Layer,
    ) -> Result<Arc<LayerNode>, AppError> {
        Ok(self.tree.push_root(name, layer)?)
    }

    /// Add a layer under the layer named `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Layer`] if `parent` is unknown or `name` is taken.
    pub fn push_layer_after<'n>(
        &self,
        parent: &str,
        name: impl Into<Option<&'n str>>,
        layer: impl Layer,
    ) -> Result<Arc<LayerNode>, AppError> {
        Ok(self.tree.push_layer_after(parent, name, layer)?)
    }

    /// Run until [`AppHandle::close`] is called or `max_ticks` is reached,
    /// then shut everything down.
    ///
    /// A `close` issued before `run` is ignored.
    pub fn run(self) -> RunSummary {
        let Self {
            config,
            runtime,
            handle,
            tree,
        } = self;
        let shared = &handle.inner;

        info!(
            app = %config.name,
            run_id = %shared.run_id,
            worker_threads = config.worker_threads,
            max_blocking_threads = config.max_blocking_threads,
            target_fps = config.target_fps,
            frame_rate_limit = config.frame_rate_limit,
            layers = tree.len(),
            "starting application"
        );

        let start = Instant::now();
        let _ = shared.started.set(start);
        shared.running.store(true, Ordering::Release);

        let ticks = runtime.block_on(async {
            shared.event_loop.start();
            tree.attach_all();
            if let Some(broker) = &shared.broker {
                broker.start();
            }

            let mut tick_loop = TickLoop::new(config.tick_config());
            let ticks = tick_loop.run(&tree, &shared.engine, &shared.running).await;

            tree.detach_all();
            shared.event_loop.stop();
            if let Some(broker) = &shared.broker {
                broker.stop();
            }
            ticks
        });
        shared.running.store(false, Ordering::Release);

        let summary = RunSummary {
            run_id: shared.run_id,
            ticks,
            elapsed: start.elapsed(),
            timers_fired: shared.event_loop.fired(),
            tasks: shared.engine.stats(),
            broker: shared.broker.as_ref().map(|broker| broker.stats()),
        };

        runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
        info!(
            app = %config.name,
            run_id = %summary.run_id,
            ticks = summary.ticks,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            tasks_failed = summary.tasks.failed,
            "application shut down"
        );
        summary
    }
}
