use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| Error::InvalidSchedule(format!("Invalid date '{}', expected YYYY-MM-DD", raw)))
}

/// Accepts HH:MM and HH:MM:SS.
pub fn parse_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| Error::InvalidSchedule(format!("Invalid time '{}', expected HH:MM", raw)))
}
