use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::links::{PLAYER_MARKER, TEAM_MARKER, element_text, segment_after, selector, team_anchors};
use crate::records::Direction;

static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static ANY_ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a"));
static IMG: Lazy<Selector> = Lazy::new(|| selector("img"));
static STANDARD_TABLE: Lazy<Selector> = Lazy::new(|| selector("table.standard_tabelle"));
static ITEMS_TABLE: Lazy<Selector> = Lazy::new(|| selector("table.items"));
static DATA_DIV: Lazy<Selector> = Lazy::new(|| selector("div.data"));
static TBODY: Lazy<Selector> = Lazy::new(|| selector("tbody"));
static TR: Lazy<Selector> = Lazy::new(|| selector("tr"));

const MARKET_VALUE_COLUMNS: usize = 7;
const TRANSFER_COLUMNS: usize = 6;
const ATTENDANCE_STATS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRole {
    Attendance,
    MarketValue,
    Transfers,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRows<T> {
    pub rows: Vec<T>,
    pub skipped: usize,
}

impl<T> Default for TableRows<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            skipped: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttendanceRow {
    pub team: String,
    pub total: String,
    pub matches: String,
    pub average: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValueRow {
    Full {
        team: String,
        icon: String,
        value: String,
    },
    // A club listed for the season with no value columns.
    IconOnly {
        team: String,
        icon: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransferRow {
    pub direction: Direction,
    pub date: String,
    pub player: String,
    pub position: String,
    pub team: String,
}

#[derive(Debug, Clone, Copy)]
pub enum ValueRowShape<'a> {
    FullRow {
        crest: ElementRef<'a>,
        value: ElementRef<'a>,
    },
    IconOnlyRow {
        crest: ElementRef<'a>,
    },
    Unknown,
}

#[derive(Debug, Clone)]
pub enum TransferRowShape<'a> {
    Header,
    Marker(Direction),
    Data(Vec<ElementRef<'a>>),
    Unknown,
}

// Transfer pages carry one table per `div.data` block; the others carry one.
pub fn find_tables(document: &Html, role: TableRole) -> Vec<ElementRef<'_>> {
    match role {
        TableRole::Attendance => document.select(&STANDARD_TABLE).take(1).collect(),
        TableRole::MarketValue => document.select(&ITEMS_TABLE).take(1).collect(),
        TableRole::Transfers => document
            .select(&DATA_DIV)
            .filter_map(|div| div.select(&STANDARD_TABLE).next())
            .collect(),
    }
}

pub fn extract_attendance_rows(document: &Html) -> TableRows<RawAttendanceRow> {
    let mut out = TableRows::default();
    let Some(table) = find_tables(document, TableRole::Attendance).into_iter().next() else {
        return out;
    };

    for (anchor, team) in team_anchors(table) {
        let stats = anchor
            .parent()
            .and_then(ElementRef::wrap)
            .map(|cell| {
                cell.next_siblings()
                    .filter_map(ElementRef::wrap)
                    .filter(|el| el.value().name() == "td")
                    .take(ATTENDANCE_STATS)
                    .map(element_text)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let [total, matches, average]: [String; ATTENDANCE_STATS] = match stats.try_into() {
            Ok(stats) => stats,
            Err(_) => {
                out.skipped += 1;
                continue;
            }
        };
        out.rows.push(RawAttendanceRow {
            team,
            total,
            matches,
            average,
        });
    }
    out
}

pub fn classify_value_row(row: ElementRef<'_>) -> ValueRowShape<'_> {
    let cells = child_cells(row);
    if cells.len() == MARKET_VALUE_COLUMNS {
        return ValueRowShape::FullRow {
            crest: cells[0],
            value: cells[MARKET_VALUE_COLUMNS - 1],
        };
    }
    match cells.first() {
        Some(crest) if crest.select(&IMG).next().is_some() => {
            ValueRowShape::IconOnlyRow { crest: *crest }
        }
        _ => ValueRowShape::Unknown,
    }
}

pub fn extract_value_rows(document: &Html) -> TableRows<RawValueRow> {
    let mut out = TableRows::default();
    let Some(table) = find_tables(document, TableRole::MarketValue).into_iter().next() else {
        return out;
    };
    let Some(tbody) = table.select(&TBODY).next() else {
        return out;
    };

    for row in child_elements(tbody, "tr") {
        let parsed = match classify_value_row(row) {
            ValueRowShape::FullRow { crest, value } => crest_team(crest).map(|team| RawValueRow::Full {
                team,
                icon: crest_icon(crest).unwrap_or_default(),
                value: element_text(value),
            }),
            ValueRowShape::IconOnlyRow { crest } => crest_team(crest)
                .zip(crest_icon(crest))
                .map(|(team, icon)| RawValueRow::IconOnly { team, icon }),
            ValueRowShape::Unknown => None,
        };
        match parsed {
            Some(raw) => out.rows.push(raw),
            None => out.skipped += 1,
        }
    }
    out
}

pub fn classify_transfer_row(row: ElementRef<'_>) -> TransferRowShape<'_> {
    let cells = child_cells(row);
    if cells.is_empty() {
        return TransferRowShape::Header;
    }
    if cells.len() < TRANSFER_COLUMNS {
        for cell in &cells {
            match element_text(*cell).as_str() {
                "In" => return TransferRowShape::Marker(Direction::Arrival),
                "Out" => return TransferRowShape::Marker(Direction::Departure),
                _ => {}
            }
        }
    }
    if cells.len() == TRANSFER_COLUMNS {
        TransferRowShape::Data(cells)
    } else {
        TransferRowShape::Unknown
    }
}

// Each data row takes the direction of the closest marker row above it.
pub fn extract_transfer_rows(document: &Html) -> TableRows<RawTransferRow> {
    let mut out = TableRows::default();

    for table in find_tables(document, TableRole::Transfers) {
        let mut direction = None;
        for row in table.select(&TR) {
            match classify_transfer_row(row) {
                TransferRowShape::Header => {}
                TransferRowShape::Marker(next) => direction = Some(next),
                TransferRowShape::Data(cells) => {
                    match direction.and_then(|dir| transfer_fields(dir, &cells)) {
                        Some(raw) => out.rows.push(raw),
                        None => out.skipped += 1,
                    }
                }
                TransferRowShape::Unknown => out.skipped += 1,
            }
        }
    }
    out
}

fn transfer_fields(direction: Direction, cells: &[ElementRef<'_>]) -> Option<RawTransferRow> {
    let [date, player, _, position, team, _] = cells else {
        return None;
    };
    Some(RawTransferRow {
        direction,
        date: element_text(*date),
        player: anchor_slug(*player, PLAYER_MARKER)?,
        position: element_text(*position),
        team: anchor_slug(*team, TEAM_MARKER)?,
    })
}

fn anchor_slug(cell: ElementRef<'_>, marker: &str) -> Option<String> {
    cell.select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| segment_after(href, marker))
}

fn crest_team(crest: ElementRef<'_>) -> Option<String> {
    let anchor_title = crest
        .select(&ANY_ANCHOR)
        .find_map(|a| a.value().attr("title").map(str::to_string));
    let img = crest.select(&IMG).next();
    let name = anchor_title
        .or_else(|| img.and_then(|img| img.value().attr("title")).map(str::to_string))
        .or_else(|| img.and_then(|img| img.value().attr("alt")).map(str::to_string))?;
    let slug = team_slug(&name);
    (!slug.is_empty()).then_some(slug)
}

fn crest_icon(crest: ElementRef<'_>) -> Option<String> {
    crest
        .select(&IMG)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string)
}

pub fn team_slug(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

fn child_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    child_elements(row, "td").collect()
}

fn child_elements<'a>(parent: ElementRef<'a>, name: &'static str) -> impl Iterator<Item = ElementRef<'a>> {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_row_shapes() {
        let doc = Html::parse_document(
            r#"<table class="items"><tbody>
                <tr><td><a title="Alpha FC"><img src="a.png"></a></td><td></td><td></td><td></td><td></td><td></td><td>1,5 mi. €</td></tr>
                <tr><td><a title="Beta SC"><img src="b.png"></a></td><td>Beta SC</td></tr>
                <tr><td>no crest</td></tr>
            </tbody></table>"#,
        );
        let rows = extract_value_rows(&doc);
        assert_eq!(rows.skipped, 1);
        assert_eq!(
            rows.rows,
            vec![
                RawValueRow::Full {
                    team: "alpha-fc".into(),
                    icon: "a.png".into(),
                    value: "1,5 mi. €".into()
                },
                RawValueRow::IconOnly {
                    team: "beta-sc".into(),
                    icon: "b.png".into()
                },
            ]
        );
    }

    #[test]
    fn missing_tables_are_empty() {
        let doc = Html::parse_document("<p>nothing here</p>");
        assert_eq!(extract_attendance_rows(&doc), TableRows::default());
        assert_eq!(extract_value_rows(&doc), TableRows::default());
        assert_eq!(extract_transfer_rows(&doc), TableRows::default());
    }

    #[test]
    fn team_slug_lowercases_and_hyphenates() {
        assert_eq!(team_slug(" Real Madrid CF "), "real-madrid-cf");
    }
}
