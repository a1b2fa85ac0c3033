use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Month the fiscal year begins in.
const FISCAL_YEAR_START_MONTH: u32 = 9;

/// Inclusive date window; an open bound is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> DateRange {
        DateRange { start, end }
    }

    /// Fiscal year to date: September 1 of the most recently begun fiscal
    /// year through `today`.
    pub fn fiscal_year_to_date(today: NaiveDate) -> Option<DateRange> {
        let start = fiscal_year_start(today)?;
        Some(DateRange::new(Some(start), Some(today)))
    }

    /// The full fiscal year preceding the one `today` falls in.
    pub fn previous_fiscal_year(today: NaiveDate) -> Option<DateRange> {
        let current = fiscal_year_start(today)?;
        let start = NaiveDate::from_ymd_opt(current.year() - 1, FISCAL_YEAR_START_MONTH, 1)?;
        let end = current.pred_opt()?;
        Some(DateRange::new(Some(start), Some(end)))
    }

    /// Canonical form used inside cache keys. Field order is fixed.
    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

fn fiscal_year_start(today: NaiveDate) -> Option<NaiveDate> {
    let year = if today.month() >= FISCAL_YEAR_START_MONTH {
        today.year()
    } else {
        today.year() - 1
    };
    NaiveDate::from_ymd_opt(year, FISCAL_YEAR_START_MONTH, 1)
}

struct JsonDate(Option<NaiveDate>);

impl fmt::Display for JsonDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(date) => write!(f, "\"{}\"", date.format("%Y-%m-%d")),
            None => f.write_str("null"),
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{\"start\":{},\"end\":{}}}",
            JsonDate(self.start),
            JsonDate(self.end)
        )
    }
}
