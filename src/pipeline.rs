use anyhow::{Context, Result};
use rayon::prelude::*;
use scraper::Html;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::aggregate::AggregateMap;
use crate::config::HarvestConfig;
use crate::datasets::{
    AttendanceDataset, Dataset, Extraction, MarketValueDataset, TransferDataset,
};
use crate::fetch::{FetchPool, FetchRequest};
use crate::http_client::{FetchError, PageFetcher};
use crate::links::{LinkDescriptor, LinkRole, absolute_url, overall_attendance_link, resolve};
use crate::records::{AttendanceRecord, MarketValueRecord, TransferRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    Root,
    ConfederationList,
    CompetitionList,
    AttendanceIndex,
    SeasonLinks,
    SeasonTable,
    Records,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    NoAttendanceAnchor,
    NoMarketValueIndex,
    NoSeasons,
    NoRows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingOutcome {
    Records,
    Empty(EmptyReason),
}

// A competition, a league, or a whole transfer run.
#[derive(Debug, Clone)]
pub struct Grouping<R> {
    pub key: String,
    pub records: AggregateMap<R>,
    pub outcome: GroupingOutcome,
    pub skipped: usize,
    pub failures: Vec<String>,
}

impl<R> Grouping<R> {
    pub fn empty(key: impl Into<String>, reason: EmptyReason) -> Self {
        Self {
            key: key.into(),
            records: AggregateMap::new(),
            outcome: GroupingOutcome::Empty(reason),
            skipped: 0,
            failures: Vec::new(),
        }
    }

    fn from_batch(key: impl Into<String>, batch: BatchHarvest<R>) -> Self {
        let outcome = if batch.records.is_empty() {
            GroupingOutcome::Empty(EmptyReason::NoRows)
        } else {
            GroupingOutcome::Records
        };
        Self {
            key: key.into(),
            records: batch.records,
            outcome,
            skipped: batch.skipped,
            failures: batch.failures,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchHarvest<R> {
    pub records: AggregateMap<R>,
    pub pages: usize,
    pub skipped: usize,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HarvestSummary {
    pub dataset: &'static str,
    pub groupings_total: usize,
    pub groupings_written: usize,
    pub empty_groupings: usize,
    pub records_merged: usize,
    pub rows_skipped: usize,
    pub errors: Vec<String>,
}

impl HarvestSummary {
    fn new(dataset: &'static str) -> Self {
        Self {
            dataset,
            ..Self::default()
        }
    }

    fn record<R>(&mut self, grouping: &Grouping<R>) {
        self.groupings_total += 1;
        self.records_merged += grouping.records.record_count();
        self.rows_skipped += grouping.skipped;
        if matches!(grouping.outcome, GroupingOutcome::Empty(_)) {
            self.empty_groupings += 1;
        }
        self.errors.extend(
            grouping
                .failures
                .iter()
                .map(|failure| format!("{}: {failure}", grouping.key)),
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Country {
    pub name: String,
    pub link: String,
}

pub struct Harvester<'a, F: PageFetcher + ?Sized> {
    fetcher: &'a F,
    config: &'a HarvestConfig,
    pool: FetchPool,
}

impl<'a, F: PageFetcher + ?Sized> Harvester<'a, F> {
    pub fn new(fetcher: &'a F, config: &'a HarvestConfig) -> Self {
        Self {
            fetcher,
            config,
            pool: FetchPool::new(config.fetch.clone()),
        }
    }

    // Extractions merge in the order their fetches completed.
    pub fn harvest_batch<D: Dataset>(
        &self,
        dataset: &D,
        requests: Vec<FetchRequest<String>>,
        chunk_size: Option<usize>,
    ) -> BatchHarvest<D::Record> {
        let outcome = match chunk_size {
            Some(size) => self.pool.fetch_all_chunked(self.fetcher, requests, size),
            None => self.pool.fetch_all(self.fetcher, requests),
        };

        let pages = &outcome.pages;
        let extractions: Vec<Extraction<D::Record>> = self.pool.install(|| {
            pages
                .par_iter()
                .map(|page| dataset.extract(&page.key, &page.body))
                .collect()
        });

        let mut records = AggregateMap::new();
        let mut skipped = 0;
        for extraction in extractions {
            skipped += extraction.skipped;
            records.merge_all(extraction.records);
        }
        debug!(
            dataset = dataset.name(),
            pages = pages.len(),
            failures = outcome.failures.len(),
            records = records.record_count(),
            skipped,
            "batch merged"
        );

        BatchHarvest {
            records,
            pages: pages.len(),
            skipped,
            failures: outcome
                .failures
                .iter()
                .map(|f| format!("{} ({}): {}", f.key, f.url, f.error))
                .collect(),
        }
    }

    pub fn harvest_attendance(
        &self,
        mut on_grouping: impl FnMut(Grouping<AttendanceRecord>) -> Result<()>,
    ) -> Result<HarvestSummary> {
        let base = self.config.attendance_base_url.as_str();
        let mut summary = HarvestSummary::new(AttendanceDataset.name());

        enter(TraversalState::Root, base);
        let root = self
            .fetch_page(base, base)
            .with_context(|| format!("fetch root page {base}"))?;
        let confederations = resolve(&Html::parse_document(&root), LinkRole::Confederation)
            .into_iter()
            .filter(|link| {
                self.config
                    .confederations
                    .iter()
                    .any(|code| link.url.contains(code.as_str()))
            })
            .collect::<Vec<_>>();
        if confederations.is_empty() {
            warn!(root = base, "no configured confederation links on root page");
            return Ok(summary);
        }

        for confederation in confederations {
            enter(TraversalState::ConfederationList, &confederation.url);
            let page = match self.fetch_page(base, &confederation.url) {
                Ok(page) => page,
                Err(err) => {
                    summary
                        .errors
                        .push(format!("confederation {}: {err}", confederation.url));
                    continue;
                }
            };
            let competitions = resolve(&Html::parse_document(&page), LinkRole::Competition);
            info!(
                confederation = %confederation.url,
                competitions = competitions.len(),
                "confederation resolved"
            );

            for competition in competitions {
                match self.attendance_grouping(&competition) {
                    Ok(grouping) => {
                        summary.record(&grouping);
                        on_grouping(grouping)?;
                        summary.groupings_written += 1;
                    }
                    Err(err) => summary
                        .errors
                        .push(format!("competition {}: {err}", competition.url)),
                }
            }
        }
        Ok(summary)
    }

    pub fn attendance_grouping(
        &self,
        competition: &LinkDescriptor,
    ) -> Result<Grouping<AttendanceRecord>, FetchError> {
        let base = self.config.attendance_base_url.as_str();
        let key = grouping_key(competition);

        enter(TraversalState::CompetitionList, &key);
        let page = self.fetch_page(base, &competition.url)?;
        let Some(anchor) = resolve(&Html::parse_document(&page), LinkRole::Attendance)
            .into_iter()
            .next()
        else {
            return Ok(empty_grouping(key, EmptyReason::NoAttendanceAnchor));
        };

        enter(TraversalState::AttendanceIndex, &key);
        let index = self.fetch_page(base, &overall_attendance_link(&anchor.url))?;

        enter(TraversalState::SeasonLinks, &key);
        let seasons = resolve(&Html::parse_document(&index), LinkRole::SeasonOption);
        if seasons.is_empty() {
            return Ok(empty_grouping(key, EmptyReason::NoSeasons));
        }

        enter(TraversalState::SeasonTable, &key);
        let (requests, mut invalid) = batch_requests(base, &seasons);
        let mut batch = self.harvest_batch(&AttendanceDataset, requests, None);
        batch.failures.append(&mut invalid);
        Ok(finish(key, batch))
    }

    pub fn harvest_market_values(
        &self,
        countries: &[Country],
        mut on_grouping: impl FnMut(Grouping<MarketValueRecord>) -> Result<()>,
    ) -> Result<HarvestSummary> {
        let base = self.config.market_base_url.as_str();
        let mut summary = HarvestSummary::new(MarketValueDataset::default().name());

        for country in countries {
            enter(TraversalState::ConfederationList, &country.name);
            let page = match self.fetch_page(base, &country.link) {
                Ok(page) => page,
                Err(err) => {
                    summary.errors.push(format!("country {}: {err}", country.name));
                    continue;
                }
            };
            let Some(league) = resolve(&Html::parse_document(&page), LinkRole::League)
                .into_iter()
                .next()
            else {
                debug!(country = %country.name, "no national league listed");
                continue;
            };

            match self.market_value_grouping(country, &league) {
                Ok(grouping) => {
                    summary.record(&grouping);
                    on_grouping(grouping)?;
                    summary.groupings_written += 1;
                }
                Err(err) => summary.errors.push(format!("league {}: {err}", league.url)),
            }
        }
        Ok(summary)
    }

    pub fn market_value_grouping(
        &self,
        country: &Country,
        league: &LinkDescriptor,
    ) -> Result<Grouping<MarketValueRecord>, FetchError> {
        let base = self.config.market_base_url.as_str();
        let key = grouping_key(league);

        enter(TraversalState::CompetitionList, &key);
        let page = self.fetch_page(base, &league.url)?;
        let Some(index_link) = resolve(&Html::parse_document(&page), LinkRole::MarketValueIndex)
            .into_iter()
            .next()
        else {
            return Ok(empty_grouping(key, EmptyReason::NoMarketValueIndex));
        };

        enter(TraversalState::SeasonLinks, &key);
        let index = self.fetch_page(base, &index_link.url)?;
        let seasons = resolve(&Html::parse_document(&index), LinkRole::MarketValueSeason);
        if seasons.is_empty() {
            return Ok(empty_grouping(key, EmptyReason::NoSeasons));
        }

        enter(TraversalState::SeasonTable, &key);
        let dataset = MarketValueDataset {
            country: country.name.clone(),
        };
        let (requests, mut invalid) = batch_requests(base, &seasons);
        let mut batch = self.harvest_batch(&dataset, requests, None);
        batch.failures.append(&mut invalid);
        Ok(finish(key, batch))
    }

    pub fn harvest_transfers(
        &self,
        competitions: &[String],
        grouping_key: &str,
        mut on_grouping: impl FnMut(Grouping<TransferRecord>) -> Result<()>,
    ) -> Result<HarvestSummary> {
        let base = self.config.attendance_base_url.as_str();
        let mut summary = HarvestSummary::new(TransferDataset.name());

        let links = competitions
            .iter()
            .map(|competition| LinkDescriptor {
                url: format!("transfers/{competition}/"),
                role: LinkRole::Competition,
                context: Some(competition.clone()),
            })
            .collect::<Vec<_>>();

        enter(TraversalState::SeasonTable, grouping_key);
        let (requests, mut invalid) = batch_requests(base, &links);
        let mut batch =
            self.harvest_batch(&TransferDataset, requests, Some(self.config.transfer_batch_size));
        batch.failures.append(&mut invalid);
        let grouping = finish(grouping_key, batch);

        summary.record(&grouping);
        on_grouping(grouping)?;
        summary.groupings_written += 1;
        Ok(summary)
    }

    fn fetch_page(&self, base: &str, href: &str) -> Result<String, FetchError> {
        let url = absolute_url(base, href)?;
        self.pool.fetch_one(self.fetcher, &url)
    }
}

fn enter(state: TraversalState, node: &str) {
    debug!(?state, node, "traversal");
}

fn empty_grouping<R>(key: String, reason: EmptyReason) -> Grouping<R> {
    enter(TraversalState::Empty, &key);
    debug!(grouping = %key, ?reason, "grouping has no data");
    Grouping::empty(key, reason)
}

fn finish<R>(key: impl Into<String>, batch: BatchHarvest<R>) -> Grouping<R> {
    let grouping = Grouping::from_batch(key, batch);
    let state = match grouping.outcome {
        GroupingOutcome::Records => TraversalState::Records,
        GroupingOutcome::Empty(_) => TraversalState::Empty,
    };
    enter(state, &grouping.key);
    grouping
}

fn grouping_key(link: &LinkDescriptor) -> String {
    link.context.clone().unwrap_or_else(|| link.url.clone())
}

// Requests keyed by each link's label; links that cannot form a URL are
// reported as failures instead.
fn batch_requests(base: &str, links: &[LinkDescriptor]) -> (Vec<FetchRequest<String>>, Vec<String>) {
    let mut requests = Vec::with_capacity(links.len());
    let mut invalid = Vec::new();
    for link in links {
        match absolute_url(base, &link.url) {
            Ok(url) => requests.push(FetchRequest::new(grouping_key(link), url)),
            Err(err) => invalid.push(format!("{}: {err}", link.url)),
        }
    }
    (requests, invalid)
}
