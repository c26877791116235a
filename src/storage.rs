//! ==============================================================================
//! storage.rs - Durable tier logs
//! ==============================================================================
//!
//! ```text
//! purpose:
//!     one plain-text file per tier, one reading per line:
//!
//!         2024-03-01T12:00:00Z 21.375
//!
//!     lines are written in ascending timestamp order. temperatures use the
//!     shortest representation that parses back to the identical f64.
//!
//! failure policy:
//!     nothing here is fatal. a missing/unreadable file or a malformed line
//!     yields an empty or partial tier plus a warning; a failed write is
//!     logged and the in-memory tier stays authoritative.
//! ```
//!
//! ==============================================================================

use crate::config::FileStorageConfig;
use crate::domain::{Reading, Tier};
use crate::error::{ParseError, StorageError};
use chrono::NaiveDateTime;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Persistence seam for the aggregation cache.
pub trait TierStorage: Send + Sync {
    /// Best-effort load, ascending by timestamp.
    fn load(&self, tier: Tier) -> VecDeque<Reading>;
    /// Full rewrite. Failures are logged, never returned.
    fn save(&self, tier: Tier, readings: &VecDeque<Reading>);
}

/// Tier files on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileStorage {
    raw: PathBuf,
    hourly: PathBuf,
    daily: PathBuf,
}

impl FileStorage {
    pub fn new(config: &FileStorageConfig) -> Self {
        Self {
            raw: config.temperature.clone(),
            hourly: config.hourly.clone(),
            daily: config.daily.clone(),
        }
    }

    pub fn path(&self, tier: Tier) -> &Path {
        match tier {
            Tier::Raw => &self.raw,
            Tier::Hourly => &self.hourly,
            Tier::Daily => &self.daily,
        }
    }
}

impl TierStorage for FileStorage {
    fn load(&self, tier: Tier) -> VecDeque<Reading> {
        let readings = load_tier(self.path(tier));
        tracing::info!(%tier, count = readings.len(), path = %self.path(tier).display(), "tier loaded");
        readings
    }

    fn save(&self, tier: Tier, readings: &VecDeque<Reading>) {
        save_tier(self.path(tier), readings);
    }
}

// ==============================================================================
// line format
// ==============================================================================

pub fn format_line(reading: &Reading) -> String {
    format!("{} {}", reading.timestamp.format(TIMESTAMP_FORMAT), reading.temperature)
}

/// Parse `<YYYY-MM-DDTHH:MM:SSZ> <temperature>`. `line_no` is 1-based and
/// only used for the error.
pub fn parse_line(line: &str, line_no: usize) -> Result<Reading, ParseError> {
    let malformed = || ParseError::TierLine { line: line_no, content: line.to_string() };

    let mut fields = line.split_whitespace();
    let (Some(ts), Some(temp), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(malformed());
    };

    let timestamp = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
        .map_err(|_| malformed())?
        .and_utc();
    let temperature = temp.parse::<f64>().map_err(|_| malformed())?;
    if !temperature.is_finite() {
        return Err(malformed());
    }

    Ok(Reading::new(timestamp, temperature))
}

// ==============================================================================
// load / save
// ==============================================================================

/// Read a tier file. Lines may appear in any order; the result is sorted so
/// the front is the oldest entry. Never fails.
pub fn load_tier(path: &Path) -> VecDeque<Reading> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to open tier file, starting empty");
            return VecDeque::new();
        }
    };

    let mut readings = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "tier file read stopped early");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line, idx + 1) {
            Ok(reading) => readings.push(reading),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping tier line"),
        }
    }

    // stable: equal timestamps keep their file order
    readings.sort_by_key(|r| r.timestamp);
    readings.into()
}

/// Rewrite a tier file from scratch, creating the parent directory if needed.
pub fn try_save_tier<'a, I>(path: &Path, readings: I) -> Result<(), StorageError>
where
    I: IntoIterator<Item = &'a Reading>,
{
    let wrap = |source: io::Error| StorageError { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(wrap)?;
    }

    let mut out = BufWriter::new(File::create(path).map_err(wrap)?);
    for reading in readings {
        writeln!(out, "{}", format_line(reading)).map_err(wrap)?;
    }
    out.flush().map_err(wrap)
}

/// [`try_save_tier`] with the failure logged and swallowed.
pub fn save_tier<'a, I>(path: &Path, readings: I)
where
    I: IntoIterator<Item = &'a Reading>,
{
    if let Err(e) = try_save_tier(path, readings) {
        tracing::warn!(error = %e, "failed to write tier file");
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    #[test]
    fn line_format_is_iso_utc_then_value() {
        let line = format_line(&Reading::new(at(3661), 21.375));
        assert_eq!(line, "2024-03-01T01:01:01Z 21.375");
    }

    #[test]
    fn saved_tier_loads_back_identically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/dir/current.log");
        let tier: VecDeque<Reading> = [
            Reading::new(at(0), 20.0),
            Reading::new(at(10), 0.1 + 0.2),
            Reading::new(at(20), -17.123456789012345),
            Reading::new(at(30), 1.0 / 3.0),
        ]
        .into();

        try_save_tier(&path, &tier).expect("save");
        assert_eq!(load_tier(&path), tier);
    }

    #[test]
    fn load_sorts_lines_oldest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hourly.log");
        std::fs::write(
            &path,
            "2024-03-01T02:00:00Z 22\n2024-03-01T00:00:00Z 20\n2024-03-01T01:00:00Z 21\n",
        )
        .unwrap();

        let temps: Vec<f64> = load_tier(&path).iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![20.0, 21.0, 22.0]);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("raw.log");
        std::fs::write(
            &path,
            "2024-03-01T00:00:00Z 20\ngarbage\n\n2024-03-01 00:00:10 21\n2024-03-01T00:00:20Z hot\n2024-03-01T00:00:30Z 23 extra\n2024-03-01T00:00:40Z 24\n",
        )
        .unwrap();

        let tier = load_tier(&path);
        assert_eq!(tier.len(), 2);
        assert_eq!(tier[0], Reading::new(at(0), 20.0));
        assert_eq!(tier[1], Reading::new(at(40), 24.0));
    }

    #[test]
    fn missing_file_yields_empty_tier() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_tier(&dir.path().join("absent.log")).is_empty());
    }

    #[test]
    fn save_truncates_previous_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("daily.log");
        let long: Vec<Reading> = (0..5).map(|i| Reading::new(at(i), 20.0)).collect();
        try_save_tier(&path, &long).unwrap();
        try_save_tier(&path, &long[..1]).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "2024-03-01T00:00:00Z 20\n");
    }

    #[test]
    fn unwritable_path_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        // a regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let path = blocker.join("current.log");

        let err = try_save_tier(&path, &[Reading::new(at(0), 20.0)]).unwrap_err();
        assert_eq!(err.path, path);
        // the swallowing variant must not panic
        save_tier(&path, &[Reading::new(at(0), 20.0)]);
    }

    #[test]
    fn sub_second_precision_is_dropped_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("raw.log");
        let precise = at(5) + TimeDelta::milliseconds(750);
        try_save_tier(&path, &[Reading::new(precise, 19.5)]).unwrap();

        assert_eq!(load_tier(&path)[0].timestamp, at(5));
    }
}
