use crate::model::iso8601;
use crate::store::{SharedStore, Store};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

/// Point-in-time summary of the store
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub total_entries: usize,
    pub active_devices: usize,
    pub devices: Vec<DeviceLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceLine {
    pub device_id: String,
    pub message_count: u64,
    pub seconds_since_seen: i64,
}

impl Report {
    pub fn build(store: &Store, now: DateTime<Utc>) -> Self {
        let devices = store
            .devices()
            .iter()
            .map(|(device_id, status)| DeviceLine {
                device_id: device_id.clone(),
                message_count: status.message_count,
                // A last_seen ahead of our clock reads as "just now".
                seconds_since_seen: (now - status.last_seen).num_seconds().max(0),
            })
            .collect();

        Self {
            generated_at: now,
            total_entries: store.len(),
            active_devices: store.device_count(),
            devices,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}] Server Statistics:", iso8601::format(&self.generated_at))?;
        writeln!(f, "   Total messages received: {}", self.total_entries)?;
        write!(f, "   Active devices: {}", self.active_devices)?;
        for line in &self.devices {
            write!(
                f,
                "\n   {}: {} messages, last seen {}s ago",
                line.device_id, line.message_count, line.seconds_since_seen
            )?;
        }
        Ok(())
    }
}

/// Logs a [`Report`] every `period` until `shutdown` flips to `true` or its
/// sender is dropped. The first report comes one period after start.
pub async fn run_reporter(
    store: SharedStore,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Starting reporter with period={:?}", period);

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = {
                    let store = store.read().await;
                    Report::build(&store, Utc::now())
                };
                info!(
                    total_entries = report.total_entries,
                    active_devices = report.active_devices,
                    "\n{}",
                    report
                );
            }

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Reporter stopped");
}
