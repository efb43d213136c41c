use crate::errors::Result;
use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_messages_total",
        "Total telemetry submissions accepted"
    ))
    .unwrap();
    pub static ref EVICTED_ENTRIES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_evicted_entries_total",
        "Total entries dropped because the log was full"
    ))
    .unwrap();
    pub static ref CLEARED_ENTRIES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_cleared_entries_total",
        "Total entries removed by clear requests"
    ))
    .unwrap();
    pub static ref COMMANDS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_commands_total",
        "Total commands acknowledged (never delivered)"
    ))
    .unwrap();
    pub static ref STORED_ENTRIES: Gauge = Gauge::with_opts(Opts::new(
        "ingestor_stored_entries",
        "Entries currently held in the log"
    ))
    .unwrap();
    pub static ref ACTIVE_DEVICES: Gauge = Gauge::with_opts(Opts::new(
        "ingestor_active_devices",
        "Devices currently tracked"
    ))
    .unwrap();
}

pub fn init_metrics() -> Result<()> {
    REGISTRY.register(Box::new(MESSAGES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EVICTED_ENTRIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CLEARED_ENTRIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COMMANDS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORED_ENTRIES.clone()))?;
    REGISTRY.register(Box::new(ACTIVE_DEVICES.clone()))?;
    Ok(())
}

/// Updates the size gauges after a mutation.
pub fn record_store_size(entries: usize, devices: usize) {
    STORED_ENTRIES.set(entries as f64);
    ACTIVE_DEVICES.set(devices as f64);
}

pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
