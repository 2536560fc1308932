use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use football_harvest::config::{FetchOptions, HarvestConfig};
use football_harvest::http_client::{FetchError, PageFetcher};
use football_harvest::pipeline::{Country, EmptyReason, Grouping, GroupingOutcome, Harvester};
use football_harvest::records::{AttendanceRecord, Direction};
use football_harvest::snapshot::{read_snapshot, snapshot_path, write_snapshot};

const BASE: &str = "https://fake.test/";

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

#[derive(Default)]
struct FakeSite {
    pages: HashMap<String, (String, Duration)>,
    hits: Mutex<Vec<String>>,
}

impl FakeSite {
    fn page(mut self, path: &str, fixture: &str) -> Self {
        self.pages
            .insert(format!("{BASE}{path}"), (read_fixture(fixture), Duration::ZERO));
        self
    }

    fn slow_page(mut self, path: &str, fixture: &str, delay_ms: u64) -> Self {
        self.pages.insert(
            format!("{BASE}{path}"),
            (read_fixture(fixture), Duration::from_millis(delay_ms)),
        );
        self
    }

    fn hit_count(&self, path: &str) -> usize {
        let url = format!("{BASE}{path}");
        self.hits.lock().unwrap().iter().filter(|hit| **hit == url).count()
    }
}

impl PageFetcher for FakeSite {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.hits.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some((body, delay)) => {
                thread::sleep(*delay);
                Ok(body.clone())
            }
            None => Err(FetchError::Status { status: 404 }),
        }
    }
}

fn test_config() -> HarvestConfig {
    HarvestConfig {
        attendance_base_url: BASE.to_string(),
        market_base_url: BASE.to_string(),
        confederations: vec!["uefa".to_string()],
        fetch: FetchOptions {
            parallelism: 4,
            request_timeout: Duration::from_secs(1),
            retries: 0,
            retry_backoff: Duration::ZERO,
        },
        transfer_batch_size: 1,
    }
}

// Season pages finish in the order 2022/2023, 2021/2022, 2023/2024.
fn attendance_site() -> FakeSite {
    FakeSite::default()
        .page("", "root.html")
        .page("continents/uefa/", "confederation.html")
        .page("competition/alpha-league/", "competition_alpha.html")
        .page("competition/beta-cup/", "competition_beta.html")
        .page("attendance/alpha-league-2024-2025/3/", "attendance_index.html")
        .slow_page("attendance/alpha-league-2021-2022/3/", "attendance_season.html", 150)
        .slow_page("attendance/alpha-league-2022-2023/3/", "attendance_season.html", 0)
        .slow_page("attendance/alpha-league-2023-2024/3/", "attendance_season.html", 300)
}

fn collect_attendance(site: &FakeSite) -> Vec<Grouping<AttendanceRecord>> {
    let config = test_config();
    let harvester = Harvester::new(site, &config);
    let mut groupings = Vec::new();
    let summary = harvester
        .harvest_attendance(|grouping| {
            groupings.push(grouping);
            Ok(())
        })
        .expect("harvest should succeed");
    assert_eq!(summary.groupings_written, groupings.len());
    groupings
}

fn seasons(records: &[AttendanceRecord]) -> Vec<&str> {
    records.iter().map(|r| r.season.as_str()).collect()
}

#[test]
fn attendance_records_follow_completion_order() {
    let site = attendance_site();
    let groupings = collect_attendance(&site);

    assert_eq!(groupings.len(), 2);
    let alpha = &groupings[0];
    assert_eq!(alpha.key, "alpha-league");
    assert_eq!(alpha.outcome, GroupingOutcome::Records);
    assert_eq!(alpha.skipped, 3);
    assert!(alpha.failures.is_empty());

    let alpha_fc = alpha.records.get("alpha-fc").expect("alpha-fc merged");
    assert_eq!(seasons(alpha_fc), vec!["2022/2023", "2021/2022", "2023/2024"]);
    assert_eq!(
        seasons(alpha.records.get("beta-united").unwrap()),
        vec!["2022/2023", "2021/2022", "2023/2024"]
    );
    assert_eq!(alpha.records.entity_count(), 2);

    // Only the overall view of the attendance index is requested.
    assert_eq!(site.hit_count("attendance/alpha-league-2024-2025/3/"), 1);
    assert_eq!(site.hit_count("attendance/alpha-league-2024-2025/1/"), 0);
}

#[test]
fn competition_without_attendance_is_an_empty_grouping() {
    let groupings = collect_attendance(&attendance_site());
    let beta = &groupings[1];
    assert_eq!(beta.key, "beta-cup");
    assert_eq!(
        beta.outcome,
        GroupingOutcome::Empty(EmptyReason::NoAttendanceAnchor)
    );
    assert!(beta.records.is_empty());
    assert!(beta.failures.is_empty());
}

#[test]
fn failed_season_does_not_discard_the_batch() {
    let mut site = attendance_site();
    site.pages
        .remove(&format!("{BASE}attendance/alpha-league-2022-2023/3/"));

    let groupings = collect_attendance(&site);
    let alpha = &groupings[0];
    assert_eq!(alpha.outcome, GroupingOutcome::Records);
    assert_eq!(
        seasons(alpha.records.get("alpha-fc").unwrap()),
        vec!["2021/2022", "2023/2024"]
    );
    assert_eq!(alpha.failures.len(), 1);
    assert!(alpha.failures[0].starts_with("2022/2023"));
}

#[test]
fn unreachable_competition_is_reported_and_skipped() {
    let mut site = attendance_site();
    site.pages.remove(&format!("{BASE}competition/beta-cup/"));

    let config = test_config();
    let harvester = Harvester::new(&site, &config);
    let mut keys = Vec::new();
    let summary = harvester
        .harvest_attendance(|grouping| {
            keys.push(grouping.key);
            Ok(())
        })
        .unwrap();
    assert_eq!(keys, vec!["alpha-league"]);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].contains("beta-cup"));
}

#[test]
fn missing_root_page_fails_the_run() {
    let mut site = attendance_site();
    site.pages.remove(BASE);
    let config = test_config();
    let harvester = Harvester::new(&site, &config);
    assert!(harvester.harvest_attendance(|_| Ok(())).is_err());
}

#[test]
fn root_without_configured_confederations_is_empty() {
    let site = attendance_site();
    let mut config = test_config();
    config.confederations = vec!["ofc".to_string()];
    let harvester = Harvester::new(&site, &config);

    let mut calls = 0;
    let summary = harvester
        .harvest_attendance(|_| {
            calls += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(calls, 0);
    assert_eq!(summary.groupings_total, 0);
    assert!(summary.errors.is_empty());
    assert_eq!(site.hit_count("continents/uefa/"), 0);
}

fn write_attendance_run(dir: &Path) {
    let site = attendance_site();
    let config = test_config();
    let harvester = Harvester::new(&site, &config);
    harvester
        .harvest_attendance(|grouping| {
            write_snapshot(dir, &grouping.key, &grouping.records).map(|_| ())
        })
        .unwrap();
}

#[test]
fn identical_sources_produce_identical_snapshots() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    write_attendance_run(first.path());
    write_attendance_run(second.path());

    for key in ["alpha-league", "beta-cup"] {
        let a = fs::read(snapshot_path(first.path(), key)).unwrap();
        let b = fs::read(snapshot_path(second.path(), key)).unwrap();
        assert_eq!(a, b, "snapshot {key} differs between runs");
    }
    assert_eq!(
        fs::read_to_string(snapshot_path(first.path(), "beta-cup")).unwrap(),
        "{}"
    );

    let reread = read_snapshot::<AttendanceRecord>(&snapshot_path(first.path(), "alpha-league"))
        .unwrap();
    assert_eq!(seasons(reread.get("alpha-fc").unwrap()).len(), 3);
}

#[test]
fn market_values_group_by_league() {
    let site = FakeSite::default()
        .page("wettbewerbe/national/wettbewerbe/26", "country.html")
        .page("liga-alpha/startseite/wettbewerb/LA1", "league.html")
        .page(
            "liga-alpha/marktwert_gesamt_anzeige/wettbewerb/LA1",
            "market_value_index.html",
        )
        .slow_page(
            "liga-alpha/marktwert_gesamt_anzeige/wettbewerb/LA1/saison_id/2023/plus/1",
            "market_values.html",
            150,
        )
        .page(
            "liga-alpha/marktwert_gesamt_anzeige/wettbewerb/LA1/saison_id/2022/plus/1",
            "market_values.html",
        );
    let countries = vec![
        Country {
            name: "Brasil".to_string(),
            link: "/wettbewerbe/national/wettbewerbe/26".to_string(),
        },
        Country {
            name: "Nowhere".to_string(),
            link: "/wettbewerbe/national/wettbewerbe/999".to_string(),
        },
    ];

    let config = test_config();
    let harvester = Harvester::new(&site, &config);
    let mut groupings = Vec::new();
    let summary = harvester
        .harvest_market_values(&countries, |grouping| {
            groupings.push(grouping);
            Ok(())
        })
        .unwrap();

    assert_eq!(groupings.len(), 1);
    assert_eq!(summary.errors.len(), 1);
    let league = &groupings[0];
    assert_eq!(league.key, "liga-alpha");

    let alpha = league.records.get("alpha-fc").unwrap();
    let by_season = alpha
        .iter()
        .map(|r| (r.season.as_str(), r.value_euros))
        .collect::<Vec<_>>();
    assert_eq!(by_season, vec![("2022", 1_500_000.0), ("2023", 1_500_000.0)]);
    assert!(alpha.iter().all(|r| r.country == "Brasil"));

    let gamma = league.records.get("gamma-club-rio").unwrap();
    assert!(gamma.iter().all(|r| r.value_euros == 0.0));
    assert_eq!(league.skipped, 2);
}

#[test]
fn transfers_merge_into_one_grouping() {
    let site = FakeSite::default().page("transfers/alpha-league/", "transfers.html");
    let competitions = vec!["alpha-league".to_string(), "beta-cup".to_string()];

    let config = test_config();
    let harvester = Harvester::new(&site, &config);
    let mut groupings = Vec::new();
    let summary = harvester
        .harvest_transfers(&competitions, "transfers-test", |grouping| {
            groupings.push(grouping);
            Ok(())
        })
        .unwrap();

    assert_eq!(summary.groupings_written, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].contains("beta-cup"));

    let grouping = &groupings[0];
    assert_eq!(grouping.key, "transfers-test");
    let alpha = grouping.records.get("alpha-fc").unwrap();
    let directions = alpha.iter().map(|r| r.direction).collect::<Vec<_>>();
    assert_eq!(
        directions,
        vec![Direction::Departure, Direction::Departure, Direction::Arrival]
    );
    assert_eq!(grouping.records.get("beta-sc").unwrap().len(), 1);
    assert_eq!(grouping.skipped, 2);
}

#[test]
fn snapshot_write_errors_stop_the_run() {
    let site = attendance_site();
    let config = test_config();
    let harvester = Harvester::new(&site, &config);
    let mut calls = 0;
    let result = harvester.harvest_attendance(|_| {
        calls += 1;
        Err(anyhow::anyhow!("disk full"))
    });
    assert!(result.is_err());
    assert_eq!(calls, 1);
}
