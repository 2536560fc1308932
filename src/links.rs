use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::http_client::FetchError;

pub const CONTINENTS_MARKER: &str = "continents";
pub const COMPETITION_MARKER: &str = "competition";
pub const ATTENDANCE_MARKER: &str = "attendance";
pub const TEAM_MARKER: &str = "teams";
pub const PLAYER_MARKER: &str = "player_summary";
pub const LEAGUE_MARKER: &str = "startseite";
pub const MARKET_VALUE_MARKER: &str = "marktwert_gesamt_anzeige";
pub const LEAGUES_HEADING: &str = "Ligas & Copas nacionais";

// Overall (home + away) view of an attendance table.
const OVERALL_ATTENDANCE_VIEW: &str = "3";

static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static IMG: Lazy<Selector> = Lazy::new(|| selector("img"));
static OPTION: Lazy<Selector> = Lazy::new(|| selector("option[value]"));
static STANDARD_TABLE: Lazy<Selector> = Lazy::new(|| selector("table.standard_tabelle"));
static H2: Lazy<Selector> = Lazy::new(|| selector("h2"));
static SEASON_SELECT: Lazy<Selector> = Lazy::new(|| selector("select[name=\"saison_id\"]"));
// Relative hrefs are resolved against this only to read their path.
static LINK_BASE: Lazy<Url> = Lazy::new(|| Url::parse("https://links.invalid/").expect("static url"));
static SEASON_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/saison_id/\d+/plus/").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkRole {
    Confederation,
    Competition,
    Attendance,
    SeasonOption,
    TeamLink,
    League,
    MarketValueIndex,
    MarketValueSeason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDescriptor {
    pub url: String,
    pub role: LinkRole,
    pub context: Option<String>,
}

impl LinkDescriptor {
    fn new(url: impl Into<String>, role: LinkRole, context: Option<String>) -> Self {
        Self {
            url: url.into(),
            role,
            context,
        }
    }
}

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

// Document order. No match is an empty vector, never an error.
pub fn resolve(document: &Html, role: LinkRole) -> Vec<LinkDescriptor> {
    let links = match role {
        LinkRole::Confederation => anchors_with_segment(document.root_element(), role, CONTINENTS_MARKER),
        LinkRole::Competition => match document.select(&STANDARD_TABLE).last() {
            Some(table) => anchors_with_segment(table, role, COMPETITION_MARKER),
            None => Vec::new(),
        },
        LinkRole::Attendance => anchors_with_segment(document.root_element(), role, ATTENDANCE_MARKER),
        LinkRole::SeasonOption => season_options(document),
        LinkRole::TeamLink => return team_links(document.root_element()),
        LinkRole::League => league_links(document),
        LinkRole::MarketValueIndex => document
            .select(&ANCHOR)
            .filter_map(|a| a.value().attr("href"))
            .filter(|href| href.contains(MARKET_VALUE_MARKER))
            .map(|href| LinkDescriptor::new(href, role, None))
            .collect(),
        LinkRole::MarketValueSeason => market_value_seasons(document),
    };
    dedup_by_url(links)
}

pub fn team_links(scope: ElementRef<'_>) -> Vec<LinkDescriptor> {
    team_anchors(scope)
        .filter_map(|(anchor, slug)| {
            let href = anchor.value().attr("href")?;
            Some(LinkDescriptor::new(href, LinkRole::TeamLink, Some(slug)))
        })
        .collect()
}

// Team anchors with their slug. Anchors wrapping a crest image are skipped so
// each team is seen once per row.
pub(crate) fn team_anchors<'a>(
    scope: ElementRef<'a>,
) -> impl Iterator<Item = (ElementRef<'a>, String)> + 'a {
    scope
        .select(&ANCHOR)
        .filter(|a| a.select(&IMG).next().is_none())
        .filter_map(|a| {
            let slug = segment_after(a.value().attr("href")?, TEAM_MARKER)?;
            Some((a, slug))
        })
}

fn anchors_with_segment(scope: ElementRef<'_>, role: LinkRole, marker: &str) -> Vec<LinkDescriptor> {
    scope
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| has_segment(href, marker))
        .map(|href| LinkDescriptor::new(href, role, segment_after(href, marker)))
        .collect()
}

fn season_options(document: &Html) -> Vec<LinkDescriptor> {
    document
        .select(&OPTION)
        .filter_map(|option| {
            let value = option.value().attr("value")?;
            if !has_segment(value, ATTENDANCE_MARKER) {
                return None;
            }
            let label = element_text(option);
            Some(LinkDescriptor::new(value, LinkRole::SeasonOption, Some(label)))
        })
        .collect()
}

fn league_links(document: &Html) -> Vec<LinkDescriptor> {
    let Some(heading) = document
        .select(&H2)
        .find(|h2| element_text(*h2) == LEAGUES_HEADING)
    else {
        return Vec::new();
    };
    let Some(container) = heading
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "div" && el.value().classes().any(|c| c == "box"))
    else {
        return Vec::new();
    };
    container
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| has_segment(href, LEAGUE_MARKER))
        .map(|href| {
            vec![LinkDescriptor::new(
                href,
                LinkRole::League,
                segment_before(href, LEAGUE_MARKER),
            )]
        })
        .unwrap_or_default()
}

fn market_value_seasons(document: &Html) -> Vec<LinkDescriptor> {
    let Some(select) = document.select(&SEASON_SELECT).next() else {
        return Vec::new();
    };
    let Some(base) = document
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| SEASON_LINK.is_match(href))
    else {
        return Vec::new();
    };
    select
        .select(&OPTION)
        .filter_map(|option| option.value().attr("value"))
        .map(str::trim)
        .filter(|season| !season.is_empty())
        .map(|season| {
            let replacement = format!("/saison_id/{season}/plus/");
            let url = SEASON_LINK.replace(base, NoExpand(&replacement));
            LinkDescriptor::new(url, LinkRole::MarketValueSeason, Some(season.to_string()))
        })
        .collect()
}

fn dedup_by_url(links: Vec<LinkDescriptor>) -> Vec<LinkDescriptor> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|link| seen.insert(link.url.clone()))
        .collect()
}

// "/attendance/<slug>/<view>/" with the view switched to overall.
pub fn overall_attendance_link(href: &str) -> String {
    let mut parts: Vec<&str> = href.split('/').collect();
    if let Some(idx) = parts.iter().position(|part| *part == ATTENDANCE_MARKER)
        && let Some(view) = parts.get_mut(idx + 2)
        && !view.is_empty()
    {
        *view = OVERALL_ATTENDANCE_VIEW;
    }
    parts.join("/")
}

pub fn absolute_url(base: &str, href: &str) -> Result<String, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: href.to_string(),
        reason,
    };
    let base = Url::parse(base).map_err(|err| invalid(format!("bad base {base}: {err}")))?;
    base.join(href)
        .map(String::from)
        .map_err(|err| invalid(err.to_string()))
}

pub fn path_segments(href: &str) -> Vec<String> {
    let Ok(url) = LINK_BASE.join(href.trim()) else {
        return Vec::new();
    };
    url.path_segments()
        .map(|segments| {
            segments
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn has_segment(href: &str, marker: &str) -> bool {
    path_segments(href).iter().any(|part| part == marker)
}

pub fn segment_after(href: &str, marker: &str) -> Option<String> {
    let mut segments = path_segments(href);
    let idx = segments.iter().position(|part| part == marker)?;
    (idx + 1 < segments.len()).then(|| segments.swap_remove(idx + 1))
}

pub fn segment_before(href: &str, marker: &str) -> Option<String> {
    let mut segments = path_segments(href);
    let idx = segments.iter().position(|part| part == marker)?;
    let prev = idx.checked_sub(1)?;
    Some(segments.swap_remove(prev))
}

pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}
