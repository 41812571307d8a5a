use common::env::parse_or;
use std::{env, time::Duration};

pub const DEFAULT_MASTER_URL: &str = "http://localhost:8080";
pub const DEFAULT_SLOTS: u32 = 4;
pub const DEFAULT_HEARTBEAT_MS: u64 = 5000;
pub const DEFAULT_STORAGE_ROOT: &str = "/data";

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// En Docker: MASTER_URL=http://master:8080
    pub master_url: String,
    pub slots: u32,
    pub heartbeat_interval: Duration,
    pub storage_root: String,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let slots: u32 = parse_or("WORKER_SLOTS", lookup("WORKER_SLOTS"), DEFAULT_SLOTS);
        let hb_ms: u64 = parse_or(
            "HEARTBEAT_INTERVAL_MS",
            lookup("HEARTBEAT_INTERVAL_MS"),
            DEFAULT_HEARTBEAT_MS,
        );

        Self {
            master_url: lookup("MASTER_URL")
                .unwrap_or_else(|| DEFAULT_MASTER_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            slots: slots.max(1),
            heartbeat_interval: Duration::from_millis(hb_ms.max(1)),
            storage_root: lookup("STORAGE_ROOT").unwrap_or_else(|| DEFAULT_STORAGE_ROOT.to_string()),
        }
    }
}
