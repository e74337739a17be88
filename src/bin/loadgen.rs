//! Traffic generator for the simulator.
//!
//! Drives the HTTP endpoints with a weighted random mix so the telemetry
//! pipeline downstream sees a realistic blend of successes, declined
//! payments, and injected faults.

use std::collections::BTreeMap;
use std::time::Instant;

use clap::Parser;

#[derive(Parser)]
#[command(name = "loadgen")]
#[command(about = "Weighted traffic generator for the shopsim service", long_about = None)]
struct Cli {
    /// Base URL of a running shopsim instance.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Total number of requests to send.
    #[arg(short = 'n', long, default_value_t = 200)]
    requests: usize,

    /// Number of concurrent workers.
    #[arg(short, long, default_value_t = 4)]
    concurrency: usize,
}

/// Endpoint mix with relative weights.
const MIX: &[(&str, &str, u32)] = &[
    ("GET", "/api/products", 30),
    ("GET", "/api/users", 20),
    ("POST", "/api/orders", 25),
    ("POST", "/api/checkout", 20),
    ("GET", "/api/error", 5),
];

fn pick_endpoint() -> (&'static str, &'static str) {
    let total: u32 = MIX.iter().map(|(_, _, w)| w).sum();
    let mut roll = fastrand::u32(0..total);
    for (method, path, weight) in MIX {
        if roll < *weight {
            return (method, path);
        }
        roll -= weight;
    }
    let (method, path, _) = MIX[0];
    (method, path)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let started = Instant::now();

    let per_worker = cli.requests / cli.concurrency.max(1);
    let remainder = cli.requests - per_worker * cli.concurrency.max(1);

    let mut workers = Vec::new();
    for worker in 0..cli.concurrency.max(1) {
        let client = client.clone();
        let url = cli.url.clone();
        let count = per_worker + usize::from(worker < remainder);
        workers.push(tokio::spawn(async move {
            let mut tallies: BTreeMap<String, u64> = BTreeMap::new();
            for _ in 0..count {
                let (method, path) = pick_endpoint();
                let request = match method {
                    "POST" => client.post(format!("{url}{path}")),
                    _ => client.get(format!("{url}{path}")),
                };
                let key = match request.send().await {
                    Ok(response) => format!("{} {}", response.status().as_u16(), path),
                    Err(_) => format!("ERR {path}"),
                };
                *tallies.entry(key).or_default() += 1;
            }
            tallies
        }));
    }

    let mut combined: BTreeMap<String, u64> = BTreeMap::new();
    for worker in workers {
        for (key, count) in worker.await? {
            *combined.entry(key).or_default() += count;
        }
    }

    println!(
        "Sent {} requests in {:.2}s",
        cli.requests,
        started.elapsed().as_secs_f64()
    );
    for (key, count) in combined {
        println!("{count:>6}  {key}");
    }

    Ok(())
}
