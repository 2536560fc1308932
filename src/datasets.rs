use scraper::Html;
use tracing::warn;

use crate::normalize::{normalize_currency, normalize_split_date, parse_count};
use crate::records::{AttendanceRecord, MarketValueRecord, TransferRecord};
use crate::tables::{
    RawValueRow, extract_attendance_rows, extract_transfer_rows, extract_value_rows,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<R> {
    pub records: Vec<(String, R)>,
    pub skipped: usize,
}

impl<R> Default for Extraction<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

// `context` is the label of the batch item the page was fetched for.
pub trait Dataset: Sync {
    type Record: Send;

    fn name(&self) -> &'static str;

    fn extract(&self, context: &str, markup: &str) -> Extraction<Self::Record>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AttendanceDataset;

impl Dataset for AttendanceDataset {
    type Record = AttendanceRecord;

    fn name(&self) -> &'static str {
        "attendance"
    }

    fn extract(&self, season: &str, markup: &str) -> Extraction<AttendanceRecord> {
        let document = Html::parse_document(markup);
        let table = extract_attendance_rows(&document);
        let mut out = Extraction {
            records: Vec::with_capacity(table.rows.len()),
            skipped: table.skipped,
        };

        for row in table.rows {
            let total = parse_count(&row.total);
            let matches = parse_count(&row.matches).and_then(|n| u32::try_from(n).ok());
            let average = parse_count(&row.average);
            let (Some(total), Some(matches), Some(average)) = (total, matches, average) else {
                warn!(season, team = %row.team, "unreadable attendance figures, skipping row");
                out.skipped += 1;
                continue;
            };
            out.records.push((
                row.team,
                AttendanceRecord {
                    season: season.to_string(),
                    total: total as f64,
                    matches,
                    average: average as f64,
                },
            ));
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarketValueDataset {
    pub country: String,
}

impl Dataset for MarketValueDataset {
    type Record = MarketValueRecord;

    fn name(&self) -> &'static str {
        "market-value"
    }

    fn extract(&self, season: &str, markup: &str) -> Extraction<MarketValueRecord> {
        let document = Html::parse_document(markup);
        let table = extract_value_rows(&document);
        let records = table
            .rows
            .into_iter()
            .map(|row| {
                let (team, icon, value_euros) = match row {
                    RawValueRow::Full { team, icon, value } => {
                        (team, icon, normalize_currency(&value))
                    }
                    RawValueRow::IconOnly { team, icon } => (team, icon, 0.0),
                };
                let record = MarketValueRecord {
                    season: season.to_string(),
                    value_euros,
                    icon,
                    country: self.country.clone(),
                };
                (team, record)
            })
            .collect();
        Extraction {
            records,
            skipped: table.skipped,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransferDataset;

impl Dataset for TransferDataset {
    type Record = TransferRecord;

    fn name(&self) -> &'static str {
        "transfers"
    }

    fn extract(&self, competition: &str, markup: &str) -> Extraction<TransferRecord> {
        let document = Html::parse_document(markup);
        let table = extract_transfer_rows(&document);
        let mut out = Extraction {
            records: Vec::with_capacity(table.rows.len()),
            skipped: table.skipped,
        };

        for row in table.rows {
            let Some(date) = normalize_split_date(&row.date) else {
                warn!(competition, date = %row.date, player = %row.player, "malformed transfer date, skipping row");
                out.skipped += 1;
                continue;
            };
            out.records.push((
                row.team,
                TransferRecord {
                    month: date.month,
                    year: date.year,
                    player: row.player,
                    position: row.position,
                    direction: row.direction,
                },
            ));
        }
        out
    }
}
