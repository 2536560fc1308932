use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use football_harvest::config::HarvestConfig;
use football_harvest::http_client::HttpFetcher;
use football_harvest::pipeline::{Country, Harvester, HarvestSummary};
use football_harvest::snapshot::write_snapshot;

const USAGE: &str = "usage: football_harvest <attendance|market-value|transfers> [--out DIR] [--countries FILE] [--competitions FILE]";
const VALUE_FLAGS: &[&str] = &["--out", "--countries", "--competitions"];

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let dataset = parse_dataset_arg(&args).ok_or_else(|| anyhow!(USAGE))?;
    let config = HarvestConfig::from_env();
    let fetcher = HttpFetcher::new(config.fetch.request_timeout)?;
    let harvester = Harvester::new(&fetcher, &config);

    let summary = match dataset.as_str() {
        "attendance" => {
            let out = parse_path_arg(&args, "--out").unwrap_or_else(|| PathBuf::from("attendance"));
            harvester.harvest_attendance(|grouping| {
                write_snapshot(&out, &grouping.key, &grouping.records).map(|_| ())
            })?
        }
        "market-value" => {
            let out = parse_path_arg(&args, "--out").unwrap_or_else(|| PathBuf::from("marktdata"));
            let input = parse_path_arg(&args, "--countries")
                .unwrap_or_else(|| PathBuf::from("countries.json"));
            let countries = load_countries(&input)?;
            harvester.harvest_market_values(&countries, |grouping| {
                write_snapshot(&out, &grouping.key, &grouping.records).map(|_| ())
            })?
        }
        "transfers" => {
            let out = parse_path_arg(&args, "--out").unwrap_or_else(|| PathBuf::from("transfers"));
            let input = parse_path_arg(&args, "--competitions")
                .unwrap_or_else(|| PathBuf::from("competitions.txt"));
            let competitions = load_competitions(&input)?;
            let key = format!("transfers-{}", Utc::now().format("%Y-%m-%dT%H-%M-%SZ"));
            harvester.harvest_transfers(&competitions, &key, |grouping| {
                write_snapshot(&out, &grouping.key, &grouping.records).map(|_| ())
            })?
        }
        other => return Err(anyhow!("unknown dataset {other}\n{USAGE}")),
    };

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &HarvestSummary) {
    println!("Harvest complete: {}", summary.dataset);
    println!(
        "Groupings written: {}/{} (empty: {})",
        summary.groupings_written, summary.groupings_total, summary.empty_groupings
    );
    println!("Records merged: {}", summary.records_merged);
    println!("Rows skipped: {}", summary.rows_skipped);
    if !summary.errors.is_empty() {
        println!("Errors: {}", summary.errors.len());
        for err in summary.errors.iter().take(12) {
            println!("   - {err}");
        }
    }
}

fn load_countries(path: &Path) -> Result<Vec<Country>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read countries file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid countries file {}", path.display()))
}

fn load_competitions(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read competitions file {}", path.display()))?;
    let competitions = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect::<Vec<_>>();
    if competitions.is_empty() {
        return Err(anyhow!("no competitions listed in {}", path.display()));
    }
    Ok(competitions)
}

fn parse_dataset_arg(args: &[String]) -> Option<String> {
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if VALUE_FLAGS.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if !arg.starts_with("--") {
            return Some(arg.trim().to_ascii_lowercase());
        }
    }
    None
}

fn parse_path_arg(args: &[String], flag: &str) -> Option<PathBuf> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}
