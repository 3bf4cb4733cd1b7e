//! Append-only series of daily peak occupancy.

use crate::store::{StateStore, StoreError};
use time::{Date, Weekday};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyRow {
    pub date: Date,
    pub weekday: String,
    pub peak_occupancy: u32,
}

impl WeeklyRow {
    pub fn new(date: Date, peak_occupancy: u32) -> Self {
        Self {
            date,
            weekday: weekday_name(date.weekday()).to_string(),
            peak_occupancy,
        }
    }
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Monday => "monday",
        Weekday::Tuesday => "tuesday",
        Weekday::Wednesday => "wednesday",
        Weekday::Thursday => "thursday",
        Weekday::Friday => "friday",
        Weekday::Saturday => "saturday",
        Weekday::Sunday => "sunday",
    }
}

pub fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Monday),
        "tuesday" | "tue" => Some(Weekday::Tuesday),
        "wednesday" | "wed" => Some(Weekday::Wednesday),
        "thursday" | "thu" => Some(Weekday::Thursday),
        "friday" | "fri" => Some(Weekday::Friday),
        "saturday" | "sat" => Some(Weekday::Saturday),
        "sunday" | "sun" => Some(Weekday::Sunday),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WeeklyAggregator;

impl WeeklyAggregator {
    /// Appends one row. Repeated calls for the same date add repeated rows.
    pub fn append<S>(store: &S, date: Date, peak_occupancy: u32) -> Result<WeeklyRow, StoreError>
    where
        S: StateStore + ?Sized,
    {
        let row = WeeklyRow::new(date, peak_occupancy);
        store.append_weekly(&row)?;
        Ok(row)
    }

    /// Rows that fall into the ISO week of `today`.
    pub fn current_week(rows: &[WeeklyRow], today: Date) -> Vec<WeeklyRow> {
        let week = today.to_iso_week_date();
        rows.iter()
            .filter(|row| {
                let (year, number, _) = row.date.to_iso_week_date();
                (year, number) == (week.0, week.1)
            })
            .cloned()
            .collect()
    }
}
