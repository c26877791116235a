//! ==============================================================================
//! cache.rs - Tiered aggregation cache
//! ==============================================================================
//!
//! purpose:
//!     keeps the three retention tiers in memory and mirrors every change to
//!     the tier files. the only mutation entry point is
//!     `process_temperature`, which runs entirely under one lock.
//!
//! per accepted reading (t = reading timestamp):
//!     1. insert into raw (ascending order)
//!     2. evict raw < t-24h, hourly < t-30d, daily < t-360d
//!     3. persist raw
//!     4. hourly rollup if the newest hourly entry (or, with no hourly entries
//!        yet, the oldest raw entry) is at least 1h old: mean of raw over
//!        [t-1h, t], stamped t, persisted
//!     5. daily rollup, same rule one level up with a 24h window
//!
//! windows are event-driven: every age is measured against the newest
//! reading, never against the wall clock or a calendar grid.
//!
//! ==============================================================================

use crate::domain::{Reading, Tier};
use crate::storage::TierStorage;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Tiers {
    raw: VecDeque<Reading>,
    hourly: VecDeque<Reading>,
    daily: VecDeque<Reading>,
}

impl Tiers {
    fn get(&self, tier: Tier) -> &VecDeque<Reading> {
        match tier {
            Tier::Raw => &self.raw,
            Tier::Hourly => &self.hourly,
            Tier::Daily => &self.daily,
        }
    }
}

/// What one `process_temperature` call produced beyond the raw insert.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollupOutcome {
    pub hourly: Option<Reading>,
    pub daily: Option<Reading>,
}

pub struct AggregationCache {
    tiers: Mutex<Tiers>,
    storage: Arc<dyn TierStorage>,
}

impl AggregationCache {
    /// Build the cache from whatever the storage currently holds.
    pub fn load(storage: Arc<dyn TierStorage>) -> Self {
        let tiers = Tiers {
            raw: storage.load(Tier::Raw),
            hourly: storage.load(Tier::Hourly),
            daily: storage.load(Tier::Daily),
        };
        Self { tiers: Mutex::new(tiers), storage }
    }

    // a panic mid-update leaves tiers that are still ordered, so keep using them
    fn lock(&self) -> MutexGuard<'_, Tiers> {
        self.tiers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of one tier, oldest first.
    pub fn snapshot(&self, tier: Tier) -> Vec<Reading> {
        self.lock().get(tier).iter().copied().collect()
    }

    pub fn len(&self, tier: Tier) -> usize {
        self.lock().get(tier).len()
    }

    /// Insert one accepted reading, trim every tier, roll up and persist.
    ///
    /// Storage failures are logged by the storage layer; the in-memory tiers
    /// are updated regardless.
    pub fn process_temperature(&self, reading: Reading) -> RollupOutcome {
        let mut tiers = self.lock();
        let t = reading.timestamp;

        insert_ordered(&mut tiers.raw, reading);

        evict_older_than(&mut tiers.raw, t - Tier::Raw.retention());
        evict_older_than(&mut tiers.hourly, t - Tier::Hourly.retention());
        evict_older_than(&mut tiers.daily, t - Tier::Daily.retention());

        self.storage.save(Tier::Raw, &tiers.raw);

        let Tiers { raw, hourly, daily } = &mut *tiers;

        let hourly_entry = roll_up(raw, hourly, t, TimeDelta::hours(1));
        if let Some(entry) = hourly_entry {
            tracing::info!(temperature = entry.temperature, at = %entry.timestamp, "hourly average");
            self.storage.save(Tier::Hourly, hourly);
        }

        let daily_entry = roll_up(hourly, daily, t, TimeDelta::hours(24));
        if let Some(entry) = daily_entry {
            tracing::info!(temperature = entry.temperature, at = %entry.timestamp, "daily average");
            self.storage.save(Tier::Daily, daily);
        }

        tracing::debug!(
            raw = raw.len(),
            hourly = hourly.len(),
            daily = daily.len(),
            "tiers updated"
        );
        RollupOutcome { hourly: hourly_entry, daily: daily_entry }
    }
}

/// Keep `tier` ascending. Equal timestamps go after existing ones.
fn insert_ordered(tier: &mut VecDeque<Reading>, reading: Reading) {
    match tier.back() {
        Some(last) if last.timestamp > reading.timestamp => {
            tracing::warn!(at = %reading.timestamp, newest = %last.timestamp, "reading older than newest raw entry");
            let idx = tier.partition_point(|r| r.timestamp <= reading.timestamp);
            tier.insert(idx, reading);
        }
        _ => tier.push_back(reading),
    }
}

fn evict_older_than(tier: &mut VecDeque<Reading>, cutoff: DateTime<Utc>) {
    while tier.front().is_some_and(|r| r.timestamp < cutoff) {
        tier.pop_front();
    }
}

/// Append the mean of `source` over `[t - window, t]` to `target` when the
/// target's newest entry (or the source's oldest, for an empty target) is at
/// least one window old. At most one entry per call.
fn roll_up(
    source: &VecDeque<Reading>,
    target: &mut VecDeque<Reading>,
    t: DateTime<Utc>,
    window: TimeDelta,
) -> Option<Reading> {
    let boundary = t - window;
    let due = match target.back() {
        Some(newest) => newest.timestamp <= boundary,
        None => source.front().is_some_and(|oldest| oldest.timestamp <= boundary),
    };
    if !due {
        return None;
    }

    let Some(mean) = window_mean(source, boundary, t) else {
        tracing::debug!(at = %t, "rollup due but window is empty");
        return None;
    };
    let entry = Reading::new(t, mean);
    target.push_back(entry);
    Some(entry)
}

fn window_mean(source: &VecDeque<Reading>, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<f64> {
    let start = source.partition_point(|r| r.timestamp < from);
    let (sum, count) = source
        .range(start..)
        .take_while(|r| r.timestamp <= to)
        .fold((0.0, 0usize), |(sum, count), r| (sum + r.temperature, count + 1));
    (count > 0).then(|| sum / count as f64)
}
