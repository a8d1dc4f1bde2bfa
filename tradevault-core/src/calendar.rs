//! Calendar-month chunking.
//!
//! Jobs are stored as one partition per calendar month. The first chunk
//! starts at the job's start date and the last one ends at "today"; every
//! chunk in between spans a whole month.

use crate::domain::DateRange;
use chrono::{Datelike, Months, NaiveDate};

/// Lazy iterator over the clipped monthly chunks covering `[start, until]`.
///
/// Cheap to clone, so a sequence can be walked more than once.
#[derive(Debug, Clone)]
pub struct MonthChunks {
    next_start: Option<NaiveDate>,
    until: NaiveDate,
}

impl MonthChunks {
    pub fn new(start: NaiveDate, until: NaiveDate) -> Self {
        Self {
            next_start: Some(start),
            until,
        }
    }
}

impl Iterator for MonthChunks {
    type Item = DateRange;

    fn next(&mut self) -> Option<DateRange> {
        let start = self.next_start?;
        if start > self.until {
            self.next_start = None;
            return None;
        }

        let month_first = first_of_month(start);
        let next_month = month_first.checked_add_months(Months::new(1));
        let month_last = next_month
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX);

        let end = month_last.min(self.until);
        self.next_start = next_month;
        Some(DateRange { start, end })
    }
}

/// Expected partition ranges for a job whose earliest data starts at
/// `min_start`, up to and including `today` (the partial current month
/// included).
pub fn expected_partitions(min_start: NaiveDate, today: NaiveDate) -> MonthChunks {
    MonthChunks::new(min_start, today)
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// `today` minus `months` calendar months, clamped to the end of a shorter
/// month (Mar 31 minus one month is Feb 29 in a leap year).
pub fn months_before(today: NaiveDate, months: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}
