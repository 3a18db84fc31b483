//! brigade CLI: operator interface to the dispatcher.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use brigade::channel::{Channel, MemoryChannel};
use brigade::config::Config;
use brigade::engine::{RequestRouter, RouteOutcome};
use brigade::event::EventBus;
use brigade::model::{Payload, Request};
use brigade::registry::WorkerRegistry;
use brigade::roster::{Roster, SimulatedWorker};
use brigade::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "brigade", about = "Capability-matched order dispatch")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Staff a kitchen from a roster and dispatch orders to it
    Simulate {
        /// Directory containing worker roster TOML files
        #[arg(long, default_value = "roster")]
        roster: PathBuf,
        /// Order as `capability[,capability...]=payload` (repeatable)
        #[arg(long = "order", required = true)]
        orders: Vec<String>,
        /// Print every dispatch event as a JSON line on stderr
        #[arg(long)]
        events: bool,
    },
    /// List the workers in a roster
    Roster {
        /// Directory containing worker roster TOML files
        #[arg(long, default_value = "roster")]
        roster: PathBuf,
    },
}

/// One parsed `--order` argument.
struct OrderSpec {
    capabilities: Vec<String>,
    payload: Payload,
}

impl std::str::FromStr for OrderSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (caps, payload) = s
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("order '{s}' must look like capability=payload"))?;
        let capabilities: Vec<String> = caps
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if capabilities.is_empty() {
            anyhow::bail!("order '{s}' names no capability");
        }
        // JSON payloads pass through as-is, anything else is sent as a string.
        let payload = serde_json::from_str(payload)
            .unwrap_or_else(|_| Payload::String(payload.to_string()));
        Ok(Self {
            capabilities,
            payload,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Simulate {
            roster,
            orders,
            events,
        } => cmd_simulate(roster, orders, events).await,
        Command::Roster { roster } => cmd_roster(roster),
    }
}

async fn cmd_simulate(roster: PathBuf, orders: Vec<String>, events: bool) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "brigade".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let orders = orders
        .iter()
        .map(|o| o.parse::<OrderSpec>())
        .collect::<anyhow::Result<Vec<_>>>()?;
    let roster = Roster::load_from_dir(&roster)?;

    let bus = EventBus::new(config.event_capacity);
    let router = RequestRouter::new(Arc::new(WorkerRegistry::new()), bus.clone())
        .with_deadlines(config.deadlines());

    if events {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{line}");
                }
            }
        });
    }

    let mut workers = Vec::new();
    for entry in roster.entries() {
        let (request, worker) = SimulatedWorker::spawn(entry);
        router.route(request).await?;
        workers.push(worker);
    }
    println!(
        "{} worker(s) on duty: {}",
        workers.len(),
        router.registry().identities().join(", ")
    );

    let mut handles = Vec::new();
    for (n, order) in orders.into_iter().enumerate() {
        let router = router.clone();
        handles.push(tokio::spawn(async move { (n, place_order(&router, order).await) }));
    }

    let mut failed = 0;
    for handle in handles {
        let (n, result) = handle.await.context("order task panicked")?;
        match result {
            Ok((worker, reply)) => println!("order #{n}: {worker} -> {reply}"),
            Err(e) => {
                failed += 1;
                println!("order #{n}: failed: {e}");
            }
        }
    }

    for worker in workers {
        router.route(worker.off_duty_request()).await?;
        let identity = worker.identity().to_string();
        let served = worker.finish().await?;
        println!("{identity} off duty after {served} order(s)");
    }

    // Export this run's spans and metrics before the failure summary.
    tokio::task::block_in_place(|| guard.force_flush());

    if failed > 0 {
        anyhow::bail!("{failed} order(s) failed");
    }
    Ok(())
}

/// Play the customer's side of one order: send the payload, await the reply.
async fn place_order(router: &RequestRouter, order: OrderSpec) -> anyhow::Result<(String, Payload)> {
    let (dispatch_end, customer) = MemoryChannel::duplex(1);
    let request = Request::order(order.capabilities.as_slice(), Arc::new(dispatch_end));

    customer
        .send_payload(order.payload)
        .await
        .context("send order payload")?;

    let worker = match router.route(request).await? {
        RouteOutcome::Delivered { worker, .. } => worker,
        other => anyhow::bail!("order routed as {other:?}"),
    };
    let reply = customer.receive_next().await.context("receive result")?;
    Ok((worker, reply))
}

fn cmd_roster(roster: PathBuf) -> anyhow::Result<()> {
    let roster = Roster::load_from_dir(&roster)?;

    if roster.is_empty() {
        println!("No workers in roster.");
        return Ok(());
    }

    println!(
        "{:<16}  {:<30}  {:<16}  DELAY",
        "IDENTITY", "CAPABILITIES", "REPLY"
    );
    println!("{}", "-".repeat(76));

    for entry in roster.entries() {
        println!(
            "{:<16}  {:<30}  {:<16}  {}ms",
            entry.identity,
            entry.capabilities.join(","),
            entry.reply.as_deref().unwrap_or("(echo)"),
            entry.delay_ms
        );
    }

    println!("\n{} worker(s)", roster.len());
    Ok(())
}
