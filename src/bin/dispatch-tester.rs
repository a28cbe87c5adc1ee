//! Dispatch Tester CLI Tool
//!
//! Command-line tool for exercising the dispatcher against a real broker
//! (or the in-memory one).
//!
//! Usage:
//!   cargo run --bin dispatch-tester -- send --queue player_requests --payload '{"membershipId":123}'
//!   cargo run --bin dispatch-tester -- burst --queue clan_requests --count 50 --payload '{"groupId":7}'
//!   cargo run --bin dispatch-tester -- --port 1 send --payload '{"membershipId":1}'
//!   cargo run --bin dispatch-tester -- --in-memory burst --count 50

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use roster_dispatch::amqp::{ConnectionManager, InMemoryBroker};
use roster_dispatch::config::AppConfig;
use roster_dispatch::dispatch::Dispatcher;
use roster_dispatch::metrics::DispatchMetrics;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "dispatch-tester")]
#[command(about = "Send roster refresh tasks through the dispatcher and report outcomes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Broker port (defaults to RABBITMQ_PORT or 5672)
    #[arg(long)]
    port: Option<u16>,

    /// Per-send timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Use an in-process broker instead of AMQP
    #[arg(long)]
    in_memory: bool,

    /// Print prometheus metrics when done
    #[arg(long)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a single payload
    Send {
        #[arg(short, long, default_value = "player_requests")]
        queue: String,
        /// JSON payload
        #[arg(short, long, default_value = r#"{"membershipId":123}"#)]
        payload: String,
    },
    /// Send the same payload concurrently before any connection exists
    Burst {
        #[arg(short, long, default_value = "clan_requests")]
        queue: String,
        #[arg(short, long, default_value = r#"{"groupId":7}"#)]
        payload: String,
        #[arg(short, long, default_value = "50")]
        count: usize,
    },
    /// Send, disconnect, and send again to exercise reconnection
    Reconnect {
        #[arg(short, long, default_value = "player_requests")]
        queue: String,
        #[arg(short, long, default_value = r#"{"membershipId":123}"#)]
        payload: String,
    },
}

fn build_dispatcher(cli: &Cli) -> Result<Dispatcher> {
    let mut config = AppConfig::from_env()?;
    if let Some(port) = cli.port {
        config.broker.port = port;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.broker.send_timeout_ms = timeout_ms;
    }

    let metrics = DispatchMetrics::new()?;
    if !cli.in_memory {
        return Ok(Dispatcher::from_settings(&config.broker, metrics));
    }

    let manager = ConnectionManager::new(
        Arc::new(InMemoryBroker::new()),
        config.broker.connection_timeout(),
    )
    .with_metrics(metrics.clone());
    Ok(Dispatcher::new(
        Arc::new(manager),
        config.broker.send_timeout(),
        metrics,
    ))
}

fn parse_payload(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("Payload is not valid JSON: {}", raw))
}

async fn timed_send(dispatcher: &Dispatcher, queue: &str, payload: &Value) -> (bool, Duration) {
    let start = Instant::now();
    let ok = dispatcher.send(queue, payload).await;
    (ok, start.elapsed())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let dispatcher = build_dispatcher(&cli)?;

    println!("🔌 Broker endpoint: {}", dispatcher.manager().endpoint());

    match &cli.command {
        Commands::Send { queue, payload } => {
            let payload = parse_payload(payload)?;
            let (ok, elapsed) = timed_send(&dispatcher, queue, &payload).await;
            println!(
                "{} send to '{}' in {:.1}ms",
                if ok { "✅" } else { "❌" },
                queue,
                elapsed.as_secs_f64() * 1000.0
            );
        }
        Commands::Burst {
            queue,
            payload,
            count,
        } => {
            let payload = parse_payload(payload)?;
            let start = Instant::now();
            let sends = (0..*count).map(|_| dispatcher.send(queue, &payload));
            let results = join_all(sends).await;
            let sent = results.iter().filter(|ok| **ok).count();

            println!(
                "📦 {}/{} sends to '{}' succeeded in {:.1}ms",
                sent,
                count,
                queue,
                start.elapsed().as_secs_f64() * 1000.0
            );
        }
        Commands::Reconnect { queue, payload } => {
            let payload = parse_payload(payload)?;
            let (first, _) = timed_send(&dispatcher, queue, &payload).await;
            dispatcher.disconnect().await;
            let (second, _) = timed_send(&dispatcher, queue, &payload).await;
            println!("🔁 before disconnect: {}, after: {}", first, second);
        }
    }

    println!(
        "🔢 Connect attempts: {}, final state: {}",
        dispatcher.manager().connect_attempts(),
        dispatcher.status()
    );

    if cli.metrics {
        print!("{}", dispatcher.metrics().render()?);
    }

    dispatcher.disconnect().await;
    Ok(())
}
