use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use walrus_app::layers::{CloseAfter, ExampleLayer, HeavyComputeLayer};
use walrus_app::{AppConfig, AppHandle, Application};
use walrus_event::TimerId;
use walrus_layer::{Layer, LayerTree};
use walrus_pubsub::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Demo {
    /// Interval-driven sender and a pub/sub receiver.
    Pubsub,
    /// A layer tree updated in parallel.
    Tree,
}

#[derive(Parser)]
#[command(name = "walrus_demo", about = "Walrus runtime demos")]
struct Args {
    /// Which demo to run
    #[arg(short, long, value_enum, default_value_t = Demo::Pubsub)]
    demo: Demo,

    /// Named configuration preset
    #[arg(short, long, conflicts_with = "config")]
    preset: Option<String>,

    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,
}

const DATA_CHANNEL: &str = "data_channel";
const PACKETS: u32 = 5;

/// Payload sent from the sender to the receiver.
#[derive(Debug, Clone)]
struct DataPacket {
    id: u32,
    message: String,
    timestamp: f32,
}

/// Publishes a packet every second, then schedules shutdown.
struct Sender {
    handle: AppHandle,
}

impl Layer for Sender {
    fn on_attach(&mut self) {
        info!("sender attached; publishing every 1000ms");

        let handle = self.handle.clone();
        let counter = AtomicU32::new(0);
        let interval: Arc<OnceLock<TimerId>> = Arc::new(OnceLock::new());
        let own_id = Arc::clone(&interval);

        let id = self.handle.set_interval(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let packet = DataPacket {
                    id: n,
                    message: format!("Message from sender #{n}"),
                    timestamp: handle.time(),
                };
                info!(id = packet.id, message = %packet.message, at = packet.timestamp, "sending packet");
                handle.publish(DATA_CHANNEL, packet);

                if n >= PACKETS {
                    info!(sent = n, "stopping sender");
                    if let Some(id) = own_id.get() {
                        handle.clear(*id);
                    }
                    let closer = handle.clone();
                    handle.set_timeout(
                        move || {
                            info!("demo complete");
                            closer.close();
                        },
                        Duration::from_secs(2),
                    );
                }
            },
            Duration::from_millis(1000),
        );
        let _ = interval.set(id);
    }

    fn on_detach(&mut self) {
        info!("sender detached");
    }
}

/// Logs every packet it receives.
struct Receiver {
    handle: AppHandle,
}

impl Layer for Receiver {
    fn on_attach(&mut self) {
        self.handle
            .subscribe(DATA_CHANNEL, |msg: &Message<DataPacket>| {
                let packet = msg.data();
                info!(
                    id = packet.id,
                    message = %packet.message,
                    sent_at = packet.timestamp,
                    "received packet"
                );
            });
        info!(topic = DATA_CHANNEL, "receiver subscribed");
    }

    fn on_detach(&mut self) {
        info!("receiver detached");
    }
}

fn pubsub_demo(app: &Application) -> Result<()> {
    let handle = app.handle();
    // Receiver first so it is subscribed before the sender starts.
    app.push_layer("receiver", Receiver { handle: handle.clone() })?;
    app.push_layer("sender", Sender { handle })?;
    Ok(())
}

fn tree_demo(app: Application) -> Result<Application> {
    let tree = LayerTree::builder()
        .root("world", ExampleLayer::new("world"))
        .child("physics", HeavyComputeLayer::new("physics", 200_000))
        .child(
            "collision",
            ExampleLayer::new("collision").with_work(Duration::from_millis(4)),
        )
        .back()
        .child(
            "rigid_bodies",
            ExampleLayer::new("rigid_bodies").with_work(Duration::from_millis(4)),
        )
        .to_root()
        .child("ai", ExampleLayer::new("ai").with_work(Duration::from_millis(5)))
        .child("pathfinding", HeavyComputeLayer::new("pathfinding", 100_000))
        .to_root()
        .child("audio", ExampleLayer::new("audio").with_work(Duration::from_millis(2)))
        .root("closer", CloseAfter::new(app.handle(), Duration::from_secs(3)))
        .build()?;

    info!(layers = tree.len(), depth = tree.max_depth(), "layer tree built\n{}", tree.render());
    Ok(app.with_tree(tree))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match (&args.config, &args.preset) {
        (Some(path), _) => AppConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        (None, Some(name)) => AppConfig::preset(name)?,
        (None, None) => AppConfig::default(),
    };
    if let Some(max_ticks) = args.max_ticks {
        config.max_ticks = max_ticks;
    }
    if args.config.is_none() && args.preset.is_none() {
        config.name = match args.demo {
            Demo::Pubsub => "SetInterval PubSub Demo".to_string(),
            Demo::Tree => "Parallel Layer Tree Demo".to_string(),
        };
    }

    info!(demo = ?args.demo, app = %config.name, "configured");
    let app = Application::new(config)?;
    let app = match args.demo {
        Demo::Pubsub => {
            if !app.handle().is_pubsub_available() {
                anyhow::bail!("the pubsub demo needs enable_pubsub = true");
            }
            pubsub_demo(&app)?;
            app
        }
        Demo::Tree => tree_demo(app)?,
    };

    let summary = app.run();
    info!(
        run_id = %summary.run_id,
        ticks = summary.ticks,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        timers_fired = summary.timers_fired,
        tasks_completed = summary.tasks.completed,
        tasks_failed = summary.tasks.failed,
        "demo finished"
    );
    Ok(())
}
