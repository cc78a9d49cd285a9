// Shared fixtures for the integration tests
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use propline_db::MemoryStore;
use propline_ml::EnsembleParams;
use propline_models::{CategoryKey, Outcome, OutcomeRecord, TrainingRow, Venue};

pub const OPPONENTS: [&str; 5] = ["NYY", "BOS", "TOR", "TB", "BAL"];

/// Four weeks of resolved props for ten players. Players 0-4 mostly win,
/// players 5-9 mostly lose.
pub fn resolved_history(category: CategoryKey) -> Vec<OutcomeRecord> {
    let mut records = Vec::new();
    for day in 1..=28u32 {
        let date = NaiveDate::from_ymd_opt(2025, 6, day).unwrap();
        for player in 0..10u32 {
            let hot = player < 5;
            let win = if hot { (player + day) % 4 != 0 } else { (player + day) % 4 == 0 };
            let outcome = if win { Outcome::Win } else { Outcome::Loss };
            let venue = if day % 2 == 0 { Venue::Home } else { Venue::Away };

            records.push(
                OutcomeRecord::new(format!("player-{player}"), category, 0.5, outcome, date)
                    .with_venue(venue)
                    .with_opponent(OPPONENTS[(day % 5) as usize])
                    .with_observed_value(if win { 1.0 } else { 0.0 }),
            );
        }
    }
    records
}

pub fn training_rows(records: &[OutcomeRecord]) -> Vec<TrainingRow> {
    records.iter().cloned().map(TrainingRow::new).collect()
}

/// A store holding `records` both as resolved outcomes and as unfilled
/// labeled rows.
pub fn seeded_store(records: &[OutcomeRecord]) -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::new()
            .with_outcomes(records.to_vec())
            .with_training_rows(training_rows(records)),
    )
}

/// `wins` winning rows followed by `losses` losing rows.
pub fn skewed_rows(category: CategoryKey, wins: usize, losses: usize) -> Vec<TrainingRow> {
    (0..wins + losses)
        .map(|i| {
            let outcome = if i < wins { Outcome::Win } else { Outcome::Loss };
            let date = NaiveDate::from_ymd_opt(2025, 5, 1 + (i % 30) as u32).unwrap();
            let player = format!("player-{}", i % 12);
            TrainingRow::new(OutcomeRecord::new(player, category, 1.5, outcome, date))
        })
        .collect()
}

pub fn test_params() -> EnsembleParams {
    EnsembleParams {
        n_trees: 15,
        max_depth: 4,
        ..EnsembleParams::default()
    }
}

pub fn scratch_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("propline-{tag}-{}", uuid::Uuid::new_v4()))
}
