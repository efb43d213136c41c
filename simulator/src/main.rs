mod telemetry;

use clap::Parser;
use rand::Rng;
use std::time::Duration;
use telemetry::{Link, Watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Simulates a fleet of watches posting sensor readings to the ingestor
#[derive(Debug, Parser)]
#[command(name = "simulator", version)]
struct Args {
    /// Base URL of the ingestor
    #[arg(long, env = "INGESTOR_URL", default_value = "http://localhost:8080")]
    url: String,

    /// Number of simulated watches
    #[arg(long, env = "DEVICES", default_value_t = 10)]
    devices: usize,

    /// Messages per second across all watches
    #[arg(long, env = "RATE", default_value_t = 50)]
    rate: u64,

    /// Stop after this many messages (0 = run until interrupted)
    #[arg(long, env = "COUNT", default_value_t = 0)]
    count: u64,

    /// Device id prefix
    #[arg(long, env = "DEVICE_PREFIX", default_value = "osw")]
    prefix: String,

    /// Suffix device ids with a random token instead of an index
    #[arg(long)]
    unique_ids: bool,
}

const BURST_SIZE: u64 = 20;

fn build_fleet(args: &Args, rng: &mut impl Rng) -> Vec<Watch> {
    (0..args.devices.max(1))
        .map(|n| {
            let device_id = if args.unique_ids {
                let token = Uuid::new_v4().simple().to_string();
                format!("{}-{}", args.prefix, &token[..8])
            } else {
                format!("{}-{}", args.prefix, n)
            };
            let link = if rng.gen_bool(0.5) {
                Link::WiFi
            } else {
                Link::Bluetooth
            };
            Watch::new(device_id, link)
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rate = args.rate.max(1);
    let endpoint = format!("{}/api/data", args.url.trim_end_matches('/'));

    info!("Starting watch simulator");
    info!(
        "Endpoint: {}, Rate: {} msg/s, Devices: {}",
        endpoint, rate, args.devices
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let mut rng = rand::thread_rng();
    let mut fleet = build_fleet(&args, &mut rng);
    for watch in &fleet {
        info!("{} uses {:?}", watch.device_id, watch.link);
    }

    let burst_size = BURST_SIZE.min(rate);
    let burst_interval = Duration::from_millis((burst_size * 1000) / rate);
    let per_watch_ms = (fleet.len() as u64 * 1000) / rate;
    info!(
        "Posting in bursts of {} messages every {:?}",
        burst_size, burst_interval
    );

    let mut counter = 0u64;
    let mut failures = 0u64;

    loop {
        let burst_start = std::time::Instant::now();

        for _ in 0..burst_size {
            if args.count > 0 && counter >= args.count {
                info!("Sent {} messages ({} failed), done", counter, failures);
                return Ok(());
            }

            let index = (counter % fleet.len() as u64) as usize;
            let watch = &mut fleet[index];
            let reading = watch.next_reading(&mut rng, per_watch_ms);

            let sent = client
                .post(&endpoint)
                .header("device-id", &watch.device_id)
                .json(&reading)
                .send()
                .await;
            counter += 1;

            match sent {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => {
                    failures += 1;
                    warn!("{} rejected with {}", watch.device_id, resp.status());
                }
                Err(e) => {
                    failures += 1;
                    error!("Failed to post reading for {}: {}", watch.device_id, e);
                }
            }
        }

        // Log progress periodically
        if counter % 1000 < burst_size {
            info!("Posted {} messages ({} failed)", counter, failures);
        }

        let elapsed = burst_start.elapsed();
        if elapsed < burst_interval {
            tokio::time::sleep(burst_interval - elapsed).await;
        } else if elapsed > burst_interval * 2 {
            warn!(
                "Burst took {:?}, target was {:?} - ingestor may be overloaded",
                elapsed, burst_interval
            );
        }
    }
}
