use tracing::{debug, warn};

const THOUSAND: f64 = 1_000.0;
const MILLION: f64 = 1_000_000.0;
const BILLION: f64 = 1_000_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitDate {
    pub month: i32,
    pub year: i32,
}

// Portuguese-localized values ("1,5 mi. €"). A figure without a magnitude
// word is unrecognized and worth 0.
pub fn normalize_currency(text: &str) -> f64 {
    if let Some(value) = parse_currency(text) {
        return value;
    }
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "-" {
        debug!(text = trimmed, "no market value listed");
    } else {
        warn!(text = trimmed, "unrecognized market value, using 0");
    }
    0.0
}

fn parse_currency(text: &str) -> Option<f64> {
    let cleaned = text.replace('€', "").replace('\u{a0}', " ");
    let cleaned = cleaned.trim();
    let split = cleaned
        .find(|ch: char| !(ch.is_ascii_digit() || ch == ',' || ch == '.'))
        .unwrap_or(cleaned.len());
    let (number, unit) = cleaned.split_at(split);
    if number.is_empty() {
        return None;
    }
    let magnitude = unit_magnitude(unit.trim())?;
    Some(parse_decimal(number)? * magnitude)
}

fn unit_magnitude(unit: &str) -> Option<f64> {
    match unit.to_lowercase().as_str() {
        "mil" => Some(THOUSAND),
        "mi" | "mi." | "milhão" | "milhões" => Some(MILLION),
        "bi" | "bi." | "bilhão" | "bilhões" | "bilhôes" => Some(BILLION),
        _ => None,
    }
}

// Comma is the decimal mark; dots are thousand separators.
fn parse_decimal(number: &str) -> Option<f64> {
    let normalized = number.replace('.', "").replace(',', ".");
    normalized.parse::<f64>().ok()
}

// Values are not range checked.
pub fn normalize_split_date(text: &str) -> Option<SplitDate> {
    let (month, year) = text.trim().split_once('/')?;
    Some(SplitDate {
        month: month.trim().parse().ok()?,
        year: year.trim().parse().ok()?,
    })
}

pub fn parse_count(text: &str) -> Option<u64> {
    let digits: String = text
        .chars()
        .filter(|ch| !matches!(ch, '.' | ',' | ' ' | '\u{a0}'))
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u64>().ok()
}
