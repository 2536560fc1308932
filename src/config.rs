use std::env;
use std::time::Duration;

pub const DEFAULT_ATTENDANCE_BASE_URL: &str = "https://www.worldfootball.net/";
pub const DEFAULT_MARKET_BASE_URL: &str = "https://www.transfermarkt.com.br/";
pub const CONFEDERATIONS: &[&str] = &["caf", "conmebol", "concacaf", "uefa", "afc", "ofc"];

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub attendance_base_url: String,
    pub market_base_url: String,
    pub confederations: Vec<String>,
    pub fetch: FetchOptions,
    pub transfer_batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    // Size of the worker pool; caps in-flight requests across a batch.
    pub parallelism: usize,
    pub request_timeout: Duration,
    pub retries: u32,
    pub retry_backoff: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            parallelism: 6,
            request_timeout: Duration::from_secs(10),
            retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            attendance_base_url: DEFAULT_ATTENDANCE_BASE_URL.to_string(),
            market_base_url: DEFAULT_MARKET_BASE_URL.to_string(),
            confederations: CONFEDERATIONS.iter().map(|c| c.to_string()).collect(),
            fetch: FetchOptions::default(),
            transfer_batch_size: 15,
        }
    }
}

impl HarvestConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let confederations = env::var("HARVEST_CONFEDERATIONS")
            .ok()
            .map(|raw| parse_list(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.confederations);

        Self {
            attendance_base_url: env_string("HARVEST_ATTENDANCE_BASE_URL")
                .unwrap_or(defaults.attendance_base_url),
            market_base_url: env_string("HARVEST_MARKET_BASE_URL")
                .unwrap_or(defaults.market_base_url),
            confederations,
            fetch: FetchOptions {
                parallelism: env_usize("HARVEST_FETCH_PARALLELISM")
                    .unwrap_or(defaults.fetch.parallelism)
                    .clamp(1, 32),
                request_timeout: Duration::from_secs(
                    env_u64("HARVEST_REQUEST_TIMEOUT_SECS")
                        .unwrap_or(defaults.fetch.request_timeout.as_secs())
                        .clamp(1, 120),
                ),
                retries: env_u64("HARVEST_FETCH_RETRIES")
                    .map(|n| n.min(5) as u32)
                    .unwrap_or(defaults.fetch.retries),
                retry_backoff: Duration::from_millis(
                    env_u64("HARVEST_RETRY_BACKOFF_MS")
                        .unwrap_or(defaults.fetch.retry_backoff.as_millis() as u64)
                        .min(30_000),
                ),
            },
            transfer_batch_size: env_usize("HARVEST_TRANSFER_BATCH")
                .unwrap_or(defaults.transfer_batch_size)
                .clamp(1, 100),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|val| val.trim().parse::<usize>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|val| val.trim().parse::<u64>().ok())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split([',', ';', ' '])
        .map(|part| part.trim().to_ascii_lowercase())
        .filter(|part| !part.is_empty())
        .collect()
}
