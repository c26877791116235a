use chrono::{DateTime, TimeDelta, Utc};

/// a single accepted temperature sample
/// immutable once created; tiers hold these in ascending timestamp order
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// absolute utc instant the sample refers to
    pub timestamp: DateTime<Utc>,
    /// degrees celsius
    pub temperature: f64,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, temperature: f64) -> Self {
        Self { timestamp, temperature }
    }
}

/// the three retention levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    Raw,
    Hourly,
    Daily,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Raw, Tier::Hourly, Tier::Daily];

    /// maximum age of the oldest entry, relative to the newest raw reading
    pub fn retention(self) -> TimeDelta {
        match self {
            Tier::Raw => TimeDelta::hours(24),
            Tier::Hourly => TimeDelta::days(30),
            Tier::Daily => TimeDelta::days(360),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::Raw => "raw",
            Tier::Hourly => "hourly",
            Tier::Daily => "daily",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
