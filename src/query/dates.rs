use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use super::DateWindow;

/// Boundaries found in an utterance, before defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Boundaries {
    None,
    Single(NaiveDate),
    Range(NaiveDate, NaiveDate),
}

impl Boundaries {
    /// Start and (optional) end of the filter window.
    pub(super) fn resolve(self, window: DateWindow) -> (NaiveDate, Option<NaiveDate>) {
        match self {
            Boundaries::None => {
                debug!("No date specified. Resetting dates to full range.");
                (window.start, Some(window.end))
            }
            Boundaries::Single(start) => (start, None),
            Boundaries::Range(start, end) => (start, Some(end)),
        }
    }
}

/// Scans an utterance for year ranges, full dates and lone years.
pub(super) struct DateScanner {
    year_range: Regex,
    full_date: Regex,
    lone_year: Regex,
}

impl DateScanner {
    pub(super) fn new() -> Self {
        Self {
            year_range: Regex::new(r"([0-9]{4})\s*[-–—]\s*([0-9]{4})").expect("valid pattern"),
            full_date: Regex::new(r"\b([0-9]{4})[-/]([0-9]{2})[-/]([0-9]{2})\b")
                .expect("valid pattern"),
            lone_year: Regex::new(r"\b[0-9]{4}\b").expect("valid pattern"),
        }
    }

    /// Collects boundaries pass by pass (year ranges, then full dates, then
    /// lone years) and keeps the first two. The order is the pass order, not
    /// the position in the text.
    pub(super) fn scan(&self, text: &str) -> Boundaries {
        let mut found: Vec<NaiveDate> = Vec::new();

        for caps in self.year_range.captures_iter(text) {
            let (first, second) = (&caps[1], &caps[2]);
            match (year_start(first), year_end(second)) {
                (Some(start), Some(end)) => {
                    debug!("Found year range {first}-{second}");
                    found.extend([start, end]);
                }
                _ => debug!("Could not use year range {first}-{second}"),
            }
        }

        for caps in self.full_date.captures_iter(text) {
            let token = &caps[0];
            match full_date(&caps[1], &caps[2], &caps[3]) {
                Some(date) => {
                    debug!("Found exact date {token} => {date}");
                    found.push(date);
                }
                None => debug!("Could not parse exact date {token}"),
            }
        }

        for m in self.lone_year.find_iter(text) {
            if touches_separator(text, m.start(), m.end()) {
                continue;
            }
            let year = m.as_str();
            if let (Some(start), Some(end)) = (year_start(year), year_end(year)) {
                debug!("Found single year {year}");
                found.extend([start, end]);
            }
        }

        match found.as_slice() {
            [] => Boundaries::None,
            [only] => Boundaries::Single(*only),
            [start, end, ..] => Boundaries::Range(*start, *end),
        }
    }
}

/// Whether a `-` or `/` sits right before `start` or right after `end`.
fn touches_separator(text: &str, start: usize, end: usize) -> bool {
    let is_separator = |c: char| c == '-' || c == '/';
    text[..start].chars().next_back().is_some_and(is_separator)
        || text[end..].chars().next().is_some_and(is_separator)
}

fn year(token: &str) -> Option<i32> {
    token.parse().ok().filter(|y| (1..=9999).contains(y))
}

fn year_start(token: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year(token)?, 1, 1)
}

fn year_end(token: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year(token)?, 12, 31)
}

fn full_date(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year(y)?, m.parse().ok()?, d.parse().ok()?)
}
