//! feedq CLI - schedule, consume and observe feed fetch jobs
//! Composition root: configuration, logging, adapter selection

mod handler;
mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use feedq_core::application::status_board::{FEED_COUNT, ITEM_COUNT, JOBS_DONE, JOBS_FAILED};
use feedq_core::application::worker::constants::{DEFAULT_JOB_QUEUE, DEFAULT_STATUS_TOPIC};
use feedq_core::application::{
    shutdown_channel, Connection, ConnectionManager, NotificationChannel, QueueChannel, Scheduler,
    StatusBoard, Worker,
};
use feedq_core::config::{LogFormat, Settings};
use feedq_core::domain::{decode, encode, generate_id, Namespace, Payload, QueueName, TopicName};
use feedq_core::port::time_provider::SystemTimeProvider;
use feedq_core::port::Connector;
use feedq_infra_memory::{MemoryConnector, MEMORY_URL};
use feedq_infra_redis::RedisConnector;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How long `work` waits for the worker to finish after Ctrl+C
const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "feedq")]
#[command(about = "Feed fetch job coordination over a shared backing store", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backing store URL (overrides FEEDQ_REDIS_URL; "memory://" = in-process)
    #[arg(long, global = true)]
    redis_url: Option<String>,

    /// Key namespace (overrides FEEDQ_NAMESPACE)
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Log format: pretty or json (overrides FEEDQ_LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the feed ID for a URL
    Id {
        /// Feed URL
        url: String,
    },

    /// Append a job to a queue
    Enqueue {
        /// Queue name
        queue: String,

        /// Job as JSON ({"$date": ...} / {"$oid": ...} for extended types)
        job: String,
    },

    /// Wait for the next job on a queue and print it
    Dequeue {
        /// Queue name
        queue: String,
    },

    /// Broadcast an event to current subscribers
    Publish {
        /// Topic name
        topic: String,

        /// Event as JSON
        event: String,
    },

    /// Print events from a topic as they arrive
    Subscribe {
        /// Topic name
        topic: String,

        /// Stop after this many events
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Show status counters
    Status,

    /// Add to a status counter
    Incr {
        /// Counter name (feed_count, item_count, ...)
        field: String,

        /// Amount to add (may be negative)
        #[arg(long, default_value = "1", allow_hyphen_values = true)]
        by: i64,
    },

    /// Enqueue a fetch job per feed URL, every FEEDQ_FETCH_INTERVAL minutes
    Schedule {
        /// Feed URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Queue to schedule on
        #[arg(short, long, default_value = DEFAULT_JOB_QUEUE)]
        queue: String,

        /// Schedule a single round and exit
        #[arg(long)]
        once: bool,
    },

    /// Relay jobs from a queue to stdout, one JSON line each, reporting status
    Work {
        /// Queue name
        #[arg(default_value = DEFAULT_JOB_QUEUE)]
        queue: String,

        /// Topic to publish job outcomes on
        #[arg(short, long, default_value = DEFAULT_STATUS_TOPIC)]
        topic: String,
    },
}

fn connector_for(url: &str) -> Arc<dyn Connector> {
    if url.starts_with(MEMORY_URL) {
        Arc::new(MemoryConnector::default())
    } else {
        Arc::new(RedisConnector::new(url))
    }
}

fn parse_payload(text: &str) -> Result<Payload> {
    decode(text).with_context(|| format!("Invalid JSON payload: {}", text))
}

async fn connect(manager: &ConnectionManager) -> Result<Connection> {
    manager
        .connection()
        .await
        .context("Failed to connect to backing store")
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::from_env().context("Failed to load configuration")?;
    if let Some(url) = &cli.redis_url {
        settings.store_url = url.clone();
    }
    if let Some(ns) = &cli.namespace {
        settings.namespace = Namespace::new(ns.clone())?;
    }
    if let Some(format) = cli.log_format {
        settings.log_format = format;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    logging::init(settings.log_format)?;

    info!(
        version = feedq_core::VERSION,
        namespace = %settings.namespace,
        "feedq starting"
    );

    // Opened lazily: `id` never touches the backing store
    let manager = ConnectionManager::new(
        connector_for(&settings.store_url),
        settings.namespace.clone(),
    );

    match cli.command {
        Commands::Id { url } => {
            println!("{}", generate_id(&url)?);
        }

        Commands::Enqueue { queue, job } => {
            let queue = QueueName::new(queue)?;
            let job = parse_payload(&job)?;
            let len = QueueChannel::new(connect(&manager).await?)
                .enqueue(&queue, &job)
                .await?;
            println!(
                "{}",
                format!("✓ Job enqueued on {} (length {})", queue, len)
                    .green()
                    .bold()
            );
        }

        Commands::Dequeue { queue } => {
            let queue = QueueName::new(queue)?;
            let job = QueueChannel::new(connect(&manager).await?)
                .dequeue_until(&queue, async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
            match job {
                Some(job) => println!("{}", encode(&job)?),
                None => eprintln!("{}", "Interrupted".yellow()),
            }
        }

        Commands::Publish { topic, event } => {
            let topic = TopicName::new(topic)?;
            let event = parse_payload(&event)?;
            NotificationChannel::new(connect(&manager).await?)
                .publish(&topic, &event)
                .await?;
            println!("{}", format!("✓ Published on {}", topic).green().bold());
        }

        Commands::Subscribe { topic, count } => {
            let topic = TopicName::new(topic)?;
            let mut events = NotificationChannel::new(connect(&manager).await?)
                .subscribe(&topic)
                .await?;
            let cancel = events.cancel_handle();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                cancel.cancel();
            });

            let mut seen = 0usize;
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => println!("{}", encode(&event)?),
                    Err(e) if e.is_connectivity() => {
                        return Err(e).context("Subscription lost its connection");
                    }
                    Err(e) => eprintln!("{} {}", "Skipped:".yellow(), e),
                }
                seen += 1;
                if count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            events.unsubscribe();
        }

        Commands::Status => {
            let counters = StatusBoard::new(connect(&manager).await?).snapshot().await?;
            println!("{}", "Status".cyan().bold());
            println!();
            for field in [FEED_COUNT, ITEM_COUNT, JOBS_DONE, JOBS_FAILED] {
                let value = counters.get(field).copied().unwrap_or(0);
                println!("  {} {}", format!("{}:", field).bold(), value);
            }
            for (field, value) in counters
                .iter()
                .filter(|(f, _)| ![FEED_COUNT, ITEM_COUNT, JOBS_DONE, JOBS_FAILED].contains(&f.as_str()))
            {
                println!("  {} {}", format!("{}:", field).bold(), value);
            }
        }

        Commands::Incr { field, by } => {
            let value = StatusBoard::new(connect(&manager).await?).incr(&field, by).await?;
            println!("{} = {}", field, value);
        }

        Commands::Schedule { urls, queue, once } => {
            let scheduler = Scheduler::new(
                QueueName::new(queue)?,
                QueueChannel::new(connect(&manager).await?),
                settings.fetch_interval,
                Arc::new(SystemTimeProvider),
            );

            if once {
                let scheduled = scheduler.schedule_round(&urls).await?;
                println!(
                    "{}",
                    format!("✓ Scheduled {} of {} feeds", scheduled, urls.len())
                        .green()
                        .bold()
                );
            } else {
                let (shutdown_tx, shutdown_rx) = shutdown_channel();
                tokio::spawn(async move {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Shutdown signal received. Exiting gracefully...");
                    shutdown_tx.shutdown();
                });
                scheduler.run(&urls, shutdown_rx).await?;
            }
        }

        Commands::Work { queue, topic } => {
            let worker = Worker::new(
                QueueName::new(queue)?,
                TopicName::new(topic)?,
                connect(&manager).await?,
                Arc::new(handler::LineHandler::stdout()),
                Arc::new(SystemTimeProvider),
            );

            let (shutdown_tx, shutdown_rx) = shutdown_channel();
            let mut worker_handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

            info!("Press Ctrl+C to shutdown");
            tokio::select! {
                finished = &mut worker_handle => {
                    finished.context("Worker task failed")??;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received. Exiting gracefully...");
                    shutdown_tx.shutdown();
                    if let Ok(finished) = tokio::time::timeout(WORKER_STOP_TIMEOUT, worker_handle).await {
                        finished.context("Worker task failed")??;
                    }
                }
            }
        }
    }

    manager.close().await;
    Ok(())
}
