use crate::aggregate::OperatingWindow;
use crate::aggregate::daily::{DEFAULT_BUCKET_WIDTH, DEFAULT_CLOSING, DEFAULT_OPENING};
use crate::aggregate::weekly::parse_weekday;
use crate::counter::{CounterLimits, DEFAULT_MAX_OCCUPANCY, DEFAULT_MIN_OCCUPANCY};
use crate::cycle::DayTrigger;
use crate::cycle::scheduler::{DEFAULT_TRIGGER_TIME, DEFAULT_TRIGGER_WEEKDAYS};
use crate::cycle::worker::DEFAULT_IDLE_POLL;
use crate::estimation::paired::DEFAULT_MAX_PAIRS;
use crate::estimation::throughput::DEFAULT_WINDOW;
use crate::estimation::{EstimationPolicy, EstimationSettings};
use crate::source::serial::DEFAULT_BAUD_RATE;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use time::Time;
use time::macros::format_description;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";
pub const DEFAULT_STORAGE_DIR: &str = "data";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub source: Option<SourceSection>,
    #[serde(default)]
    pub counter: Option<CounterSection>,
    #[serde(default)]
    pub estimation: Option<EstimationSection>,
    #[serde(default)]
    pub daily: Option<DailySection>,
    #[serde(default)]
    pub schedule: Option<ScheduleSection>,
    #[serde(default)]
    pub storage: Option<StorageSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Serial,
    Stdin,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceSection {
    pub transport: Option<Transport>,
    /// Serial device path (default: /dev/ttyACM0)
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CounterSection {
    pub min_occupancy: Option<u32>,
    pub max_occupancy: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EstimationSection {
    pub policy: Option<EstimationPolicy>,
    /// Trailing window of the throughput policy, in seconds (default: 100)
    pub window_secs: Option<u64>,
    /// Pairs averaged by the paired-departure policy (default: 10)
    pub max_pairs: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DailySection {
    /// `HH:MM` or `HH:MM:SS`
    pub opening: Option<String>,
    pub closing: Option<String>,
    pub bucket_minutes: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleSection {
    pub trigger_time: Option<String>,
    pub weekdays: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSection {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
    /// Worker wake-up interval while no events arrive (default: 100)
    pub idle_poll_ms: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    pub fn transport(&self) -> Transport {
        self.source
            .as_ref()
            .and_then(|s| s.transport)
            .unwrap_or_default()
    }

    pub fn serial_port(&self) -> &str {
        self.source
            .as_ref()
            .and_then(|s| s.port.as_deref())
            .filter(|port| !port.is_empty())
            .unwrap_or(DEFAULT_SERIAL_PORT)
    }

    pub fn baud_rate(&self) -> u32 {
        self.source
            .as_ref()
            .and_then(|s| s.baud_rate)
            .unwrap_or(DEFAULT_BAUD_RATE)
    }

    pub fn counter_limits(&self) -> Result<CounterLimits, ConfigError> {
        let section = self.counter.as_ref();
        let limits = CounterLimits {
            min_occupancy: section
                .and_then(|s| s.min_occupancy)
                .unwrap_or(DEFAULT_MIN_OCCUPANCY),
            max_occupancy: section
                .and_then(|s| s.max_occupancy)
                .unwrap_or(DEFAULT_MAX_OCCUPANCY),
        };
        if limits.min_occupancy > limits.max_occupancy {
            return Err(ConfigError::Invalid(format!(
                "counter.min_occupancy {} exceeds counter.max_occupancy {}",
                limits.min_occupancy, limits.max_occupancy
            )));
        }
        Ok(limits)
    }

    pub fn estimation_settings(&self) -> Result<EstimationSettings, ConfigError> {
        let section = self.estimation.as_ref();
        let window_secs = section
            .and_then(|s| s.window_secs)
            .unwrap_or(DEFAULT_WINDOW.as_secs());
        if window_secs == 0 {
            return Err(ConfigError::Invalid(
                "estimation.window_secs must be greater than zero".to_string(),
            ));
        }
        let max_pairs = section
            .and_then(|s| s.max_pairs)
            .unwrap_or(DEFAULT_MAX_PAIRS);
        if max_pairs == 0 {
            return Err(ConfigError::Invalid(
                "estimation.max_pairs must be greater than zero".to_string(),
            ));
        }
        Ok(EstimationSettings {
            policy: section.and_then(|s| s.policy).unwrap_or_default(),
            window: Duration::from_secs(window_secs),
            max_pairs,
        })
    }

    pub fn operating_window(&self) -> Result<OperatingWindow, ConfigError> {
        let section = self.daily.as_ref();
        let opening = match section.and_then(|s| s.opening.as_deref()) {
            Some(raw) => parse_time_of_day("daily.opening", raw)?,
            None => DEFAULT_OPENING,
        };
        let closing = match section.and_then(|s| s.closing.as_deref()) {
            Some(raw) => parse_time_of_day("daily.closing", raw)?,
            None => DEFAULT_CLOSING,
        };
        let bucket_width = section
            .and_then(|s| s.bucket_minutes)
            .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
            .unwrap_or(DEFAULT_BUCKET_WIDTH);
        OperatingWindow::new(opening, closing, bucket_width)
            .map_err(|err| ConfigError::Invalid(format!("daily: {err}")))
    }

    pub fn day_trigger(&self) -> Result<DayTrigger, ConfigError> {
        let section = self.schedule.as_ref();
        let at = match section.and_then(|s| s.trigger_time.as_deref()) {
            Some(raw) => parse_time_of_day("schedule.trigger_time", raw)?,
            None => DEFAULT_TRIGGER_TIME,
        };
        let Some(names) = section.and_then(|s| s.weekdays.as_ref()) else {
            return Ok(DayTrigger::new(at, DEFAULT_TRIGGER_WEEKDAYS));
        };
        let weekdays = names
            .iter()
            .map(|name| {
                parse_weekday(name).ok_or_else(|| {
                    ConfigError::Invalid(format!("schedule.weekdays: unknown weekday {name:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DayTrigger::new(at, weekdays))
    }

    pub fn storage_dir(&self) -> &Path {
        self.storage
            .as_ref()
            .and_then(|s| s.dir.as_deref())
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new(DEFAULT_STORAGE_DIR))
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn idle_poll(&self) -> Duration {
        self.server
            .as_ref()
            .and_then(|s| s.idle_poll_ms)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_IDLE_POLL)
    }
}

fn parse_time_of_day(key: &str, raw: &str) -> Result<Time, ConfigError> {
    let raw = raw.trim();
    let parsed = if raw.len() > 5 {
        Time::parse(raw, format_description!("[hour]:[minute]:[second]"))
    } else {
        Time::parse(raw, format_description!("[hour]:[minute]"))
    };
    parsed.map_err(|err| ConfigError::Invalid(format!("{key}: {raw:?} is not HH:MM[:SS] ({err})")))
}
