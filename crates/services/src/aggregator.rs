// Streak and rolling-average aggregation over resolved outcome history

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use propline_db::{OutcomeSource, ProfileStore};
use propline_models::{
    Outcome, OutcomeRecord, ProfileKey, Result, StreakProfile, StreakType, TrainingRow,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_WINDOW: usize = 7;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationOptions {
    pub window: usize,
    /// Derive `streak_type` from the leading record instead of leaving it neutral.
    pub derive_streak_type: bool,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            derive_streak_type: false,
        }
    }
}

pub fn aggregate(records: &[OutcomeRecord], window: usize) -> BTreeMap<ProfileKey, StreakProfile> {
    aggregate_with(
        records,
        AggregationOptions {
            window,
            ..AggregationOptions::default()
        },
    )
}

/// One profile per (player, category) from that pair's most recent `window`
/// records. Same-day records keep their input order.
pub fn aggregate_with(
    records: &[OutcomeRecord],
    options: AggregationOptions,
) -> BTreeMap<ProfileKey, StreakProfile> {
    group_recent_first(records)
        .into_iter()
        .map(|(key, group)| {
            let profile = summarize(&key, &group, options);
            (key, profile)
        })
        .collect()
}

/// Point-in-time view of resolved history. A profile "as of" a date is the one
/// an aggregation pass run that morning would have written: same window, same
/// lookback, pushes included.
pub struct ProfileHistory<'a> {
    groups: BTreeMap<ProfileKey, Vec<&'a OutcomeRecord>>,
    options: AggregationOptions,
    lookback_days: u32,
}

impl<'a> ProfileHistory<'a> {
    pub fn new(
        records: &'a [OutcomeRecord],
        options: AggregationOptions,
        lookback_days: u32,
    ) -> Self {
        Self {
            groups: group_recent_first(records),
            options,
            lookback_days,
        }
    }

    /// Profile of `key` built from its records dated in
    /// `[date - lookback_days, date)`.
    pub fn profile_as_of(&self, key: &ProfileKey, date: NaiveDate) -> StreakProfile {
        let since = date - Duration::days(i64::from(self.lookback_days));
        let visible: &[&OutcomeRecord] = match self.groups.get(key) {
            Some(group) => {
                let start = group.partition_point(|r| r.game_date >= date);
                let end = group.partition_point(|r| r.game_date >= since);
                &group[start..end]
            }
            None => &[],
        };
        summarize(key, visible, self.options)
    }
}

/// For each record, the profile its pair had before that record's game date,
/// using the records themselves as history. Returned in input order.
pub fn profiles_as_of(
    records: &[OutcomeRecord],
    options: AggregationOptions,
    lookback_days: u32,
) -> Vec<StreakProfile> {
    let history = ProfileHistory::new(records, options, lookback_days);
    records
        .iter()
        .map(|record| {
            let key = ProfileKey::new(record.player_id.clone(), record.category);
            history.profile_as_of(&key, record.game_date)
        })
        .collect()
}

/// Fills absent streak columns of training rows from their point-in-time
/// profiles. Values already present are kept.
pub fn backfill_training_stats(rows: &mut [TrainingRow], history: &ProfileHistory<'_>) -> usize {
    let mut filled = 0;
    for row in rows.iter_mut().filter(|row| !row.has_stats()) {
        let key = ProfileKey::new(row.record.player_id.clone(), row.record.category);
        let profile = history.profile_as_of(&key, row.record.game_date);
        row.rolling_result_avg_7.get_or_insert(profile.rolling_result_avg_7);
        row.hit_streak.get_or_insert(profile.hit_streak);
        row.win_streak.get_or_insert(profile.win_streak);
        filled += 1;
    }
    filled
}

/// Backfills labeled rows from the same resolved history the aggregation job
/// reads, so training and scoring see the statistics serving would have seen.
pub struct HistoryBackfill {
    source: Arc<dyn OutcomeSource>,
    options: AggregationOptions,
    lookback_days: u32,
}

impl HistoryBackfill {
    pub fn new(source: Arc<dyn OutcomeSource>) -> Self {
        Self {
            source,
            options: AggregationOptions::default(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    pub fn with_options(mut self, options: AggregationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    pub async fn fill(&self, rows: &mut [TrainingRow]) -> Result<usize> {
        let earliest = rows
            .iter()
            .filter(|row| !row.has_stats())
            .map(|row| row.record.game_date)
            .min();
        let Some(earliest) = earliest else {
            return Ok(0);
        };

        let since = earliest - Duration::days(i64::from(self.lookback_days));
        let records = self.source.fetch_resolved_since(since).await?;
        let history = ProfileHistory::new(&records, self.options, self.lookback_days);
        let filled = backfill_training_stats(rows, &history);

        debug!(%since, history = records.len(), filled, "Backfilled streak columns");
        Ok(filled)
    }
}

fn group_recent_first(records: &[OutcomeRecord]) -> BTreeMap<ProfileKey, Vec<&OutcomeRecord>> {
    let mut groups: BTreeMap<ProfileKey, Vec<&OutcomeRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(ProfileKey::new(record.player_id.clone(), record.category))
            .or_default()
            .push(record);
    }
    // `sort_by` is stable.
    for group in groups.values_mut() {
        group.sort_by(|a, b| b.game_date.cmp(&a.game_date));
    }
    groups
}

fn summarize(
    key: &ProfileKey,
    recent_first: &[&OutcomeRecord],
    options: AggregationOptions,
) -> StreakProfile {
    let window = &recent_first[..recent_first.len().min(options.window)];

    let wins = window.iter().filter(|r| r.outcome == Outcome::Win).count();
    let rolling_result_avg_7 = if window.is_empty() {
        0.0
    } else {
        round3(wins as f64 / window.len() as f64)
    };

    let mut hit_streak = 0u32;
    let mut win_streak = 0u32;
    for record in window {
        if record.outcome != Outcome::Win {
            break;
        }
        hit_streak += 1;
        win_streak += 1;
    }

    let streak_type = if options.derive_streak_type {
        match window.first().map(|r| r.outcome) {
            Some(Outcome::Win) => StreakType::Win,
            Some(Outcome::Loss) => StreakType::Loss,
            _ => StreakType::Neutral,
        }
    } else {
        StreakType::Neutral
    };

    StreakProfile {
        player_id: key.player_id.clone(),
        category: key.category,
        hit_streak,
        win_streak,
        rolling_result_avg_7,
        streak_type,
        sample_size: u32::try_from(window.len()).unwrap_or(u32::MAX),
    }
}

fn round3(value: f64) -> f64 {
    (value * 1_000.0).round() / 1_000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregationReport {
    pub since: NaiveDate,
    pub records: usize,
    pub profiles: usize,
}

/// Batch pass: fetch recent resolved history, rebuild every profile, upsert.
pub struct StreakAggregationJob {
    source: Arc<dyn OutcomeSource>,
    store: Arc<dyn ProfileStore>,
    options: AggregationOptions,
    lookback_days: u32,
}

impl StreakAggregationJob {
    pub fn new(source: Arc<dyn OutcomeSource>, store: Arc<dyn ProfileStore>) -> Self {
        Self {
            source,
            store,
            options: AggregationOptions::default(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    pub fn with_options(mut self, options: AggregationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    pub async fn run(&self) -> Result<AggregationReport> {
        self.run_as_of(Utc::now().date_naive()).await
    }

    pub async fn run_as_of(&self, today: NaiveDate) -> Result<AggregationReport> {
        let since = today - Duration::days(i64::from(self.lookback_days));
        let records = self.source.fetch_resolved_since(since).await?;

        if records.is_empty() {
            warn!(%since, "No resolved props found, skipping profile upsert");
            return Ok(AggregationReport {
                since,
                records: 0,
                profiles: 0,
            });
        }

        let profiles: Vec<StreakProfile> =
            aggregate_with(&records, self.options).into_values().collect();
        let written = self.store.upsert_profiles(&profiles).await?;

        info!(%since, records = records.len(), profiles = written, "Aggregated streak profiles");
        Ok(AggregationReport {
            since,
            records: records.len(),
            profiles: written,
        })
    }
}
