//! CSV-like files in one directory.
//!
//! - `current.txt`: occupancy, queue length and estimate on three lines
//! - `daily.txt`: header `day,t1..tN` and a single row of running averages
//! - `weekly.txt`: header `date,weekday,count` and one appended row per day

use crate::aggregate::{DailySummary, WeeklyRow};
use crate::counter::Snapshot;
use crate::store::{CurrentValues, StateStore, StoreError};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing::info;

pub const CURRENT_FILE: &str = "current.txt";
pub const DAILY_FILE: &str = "daily.txt";
pub const WEEKLY_FILE: &str = "weekly.txt";

const WEEKLY_HEADER: &str = "date,weekday,count";
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
    current_path: PathBuf,
    daily_path: PathBuf,
    weekly_path: PathBuf,
}

impl FileStateStore {
    /// Opens `dir`, seeding an empty daily summary and weekly header where missing.
    pub fn open(dir: impl AsRef<Path>, bucket_count: usize) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        let store = Self {
            current_path: dir.join(CURRENT_FILE),
            daily_path: dir.join(DAILY_FILE),
            weekly_path: dir.join(WEEKLY_FILE),
            dir,
        };

        if !exists(&store.daily_path)? {
            info!(path = %store.daily_path.display(), "Seeding empty daily summary");
            store.write_daily(&DailySummary::empty(bucket_count))?;
        }
        if !exists(&store.weekly_path)? {
            info!(path = %store.weekly_path.display(), "Seeding weekly summary header");
            fs::write(&store.weekly_path, format!("{WEEKLY_HEADER}\n"))
                .map_err(io_error(&store.weekly_path))?;
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn daily_path(&self) -> &Path {
        &self.daily_path
    }

    pub fn weekly_path(&self) -> &Path {
        &self.weekly_path
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }
}

impl StateStore for FileStateStore {
    fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let contents = format!(
            "{}\n{}\n{}",
            snapshot.occupancy, snapshot.queue_length, snapshot.estimated_queue_time_minutes
        );
        fs::write(&self.current_path, contents).map_err(io_error(&self.current_path))
    }

    fn read_snapshot(&self) -> Result<Option<CurrentValues>, StoreError> {
        let contents = match fs::read_to_string(&self.current_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&self.current_path)(err)),
        };
        let mut lines = contents.lines().map(str::trim);
        let Some(first) = lines.next().filter(|line| !line.is_empty()) else {
            return Ok(None);
        };
        let path = &self.current_path;
        Ok(Some(CurrentValues {
            occupancy: parse_field(path, 1, first)?,
            queue_length: parse_field(path, 2, lines.next().unwrap_or_default())?,
            estimated_queue_time_minutes: parse_field(path, 3, lines.next().unwrap_or_default())?,
        }))
    }

    fn read_daily(&self) -> Result<DailySummary, StoreError> {
        let path = &self.daily_path;
        let contents = fs::read_to_string(path).map_err(io_error(path))?;
        let mut lines = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        match lines.next() {
            Some((_, header)) if header.starts_with("day") => {}
            Some((index, _)) => return Err(malformed(path, index + 1, "missing header")),
            None => return Err(malformed(path, 1, "empty file")),
        }
        let Some((index, row)) = lines.next() else {
            return Err(malformed(path, 2, "missing summary row"));
        };

        let line = index + 1;
        let mut fields = row.split(',').map(str::trim);
        let day_count = parse_field(path, line, fields.next().unwrap_or_default())?;
        let buckets = fields
            .map(|field| parse_field(path, line, field))
            .collect::<Result<Vec<f64>, _>>()?;
        if buckets.is_empty() {
            return Err(malformed(path, line, "no bucket columns"));
        }
        Ok(DailySummary { day_count, buckets })
    }

    fn write_daily(&self, summary: &DailySummary) -> Result<(), StoreError> {
        let mut contents = String::from("day");
        for index in 1..=summary.buckets.len() {
            contents.push_str(&format!(",t{index}"));
        }
        contents.push('\n');
        contents.push_str(&summary.day_count.to_string());
        for value in &summary.buckets {
            contents.push_str(&format!(",{value}"));
        }
        contents.push('\n');

        // Rename is atomic, so readers never see a half-written summary.
        let staging = self.daily_path.with_extension("txt.tmp");
        fs::write(&staging, contents).map_err(io_error(&staging))?;
        fs::rename(&staging, &self.daily_path).map_err(io_error(&self.daily_path))
    }

    fn append_weekly(&self, row: &WeeklyRow) -> Result<(), StoreError> {
        let path = &self.weekly_path;
        let fresh = !exists(path)?;
        let date = row.date.format(DATE_FORMAT).map_err(|err| StoreError::Malformed {
            path: path.clone(),
            line: 0,
            reason: format!("unformattable date: {err}"),
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_error(path))?;
        if fresh {
            writeln!(file, "{WEEKLY_HEADER}").map_err(io_error(path))?;
        }
        writeln!(file, "{},{},{}", date, row.weekday, row.peak_occupancy).map_err(io_error(path))?;
        file.flush().map_err(io_error(path))
    }

    fn read_weekly(&self) -> Result<Vec<WeeklyRow>, StoreError> {
        let path = &self.weekly_path;
        let contents = fs::read_to_string(path).map_err(io_error(path))?;
        let mut rows = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            let line_number = index + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with("date") {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let [date, weekday, count] = fields.as_slice() else {
                return Err(malformed(path, line_number, "expected 3 columns"));
            };
            let date = Date::parse(date, DATE_FORMAT).map_err(|err| StoreError::Malformed {
                path: path.clone(),
                line: line_number,
                reason: format!("invalid date: {err}"),
            })?;
            rows.push(WeeklyRow {
                date,
                weekday: (*weekday).to_string(),
                peak_occupancy: parse_field(path, line_number, count)?,
            });
        }
        Ok(rows)
    }
}

fn exists(path: &Path) -> Result<bool, StoreError> {
    path.try_exists().map_err(io_error(path))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| {
        if source.kind() == ErrorKind::NotFound {
            StoreError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            StoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

fn malformed(path: &Path, line: usize, reason: &str) -> StoreError {
    StoreError::Malformed {
        path: path.to_path_buf(),
        line,
        reason: reason.to_string(),
    }
}

fn parse_field<T>(path: &Path, line: usize, raw: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|err: T::Err| StoreError::Malformed {
        path: path.to_path_buf(),
        line,
        reason: format!("invalid value {raw:?}: {err}"),
    })
}
