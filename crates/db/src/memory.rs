// In-process stores for tests and local runs

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use propline_models::{
    CategoryKey, OutcomeRecord, ProfileKey, Result, ScoredPrediction, StreakProfile, TrainingRow,
};
use uuid::Uuid;

use crate::repository::{OutcomeSource, PredictionLedger, ProfileStore, TrainingSource};

#[derive(Default)]
pub struct MemoryStore {
    outcomes: RwLock<Vec<OutcomeRecord>>,
    training: RwLock<Vec<TrainingRow>>,
    profiles: RwLock<BTreeMap<ProfileKey, StreakProfile>>,
    scores: RwLock<HashMap<Uuid, ScoredPrediction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(self, records: impl IntoIterator<Item = OutcomeRecord>) -> Self {
        self.outcomes.write().extend(records);
        self
    }

    pub fn with_training_rows(self, rows: impl IntoIterator<Item = TrainingRow>) -> Self {
        self.training.write().extend(rows);
        self
    }

    pub fn push_outcome(&self, record: OutcomeRecord) {
        self.outcomes.write().push(record);
    }

    pub fn profiles(&self) -> Vec<StreakProfile> {
        self.profiles.read().values().cloned().collect()
    }

    pub fn score_for(&self, record_id: Uuid) -> Option<ScoredPrediction> {
        self.scores.read().get(&record_id).cloned()
    }
}

#[async_trait]
impl OutcomeSource for MemoryStore {
    async fn fetch_resolved_since(&self, since: NaiveDate) -> Result<Vec<OutcomeRecord>> {
        let mut records: Vec<OutcomeRecord> = self
            .outcomes
            .read()
            .iter()
            .filter(|record| record.game_date >= since)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.game_date.cmp(&a.game_date));
        Ok(records)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn upsert_profiles(&self, profiles: &[StreakProfile]) -> Result<usize> {
        let mut stored = self.profiles.write();
        for profile in profiles {
            stored.insert(profile.key(), profile.clone());
        }
        Ok(profiles.len())
    }

    async fn get_profile(&self, key: &ProfileKey) -> Result<Option<StreakProfile>> {
        Ok(self.profiles.read().get(key).cloned())
    }
}

#[async_trait]
impl TrainingSource for MemoryStore {
    async fn fetch_labeled(&self, category: CategoryKey) -> Result<Vec<TrainingRow>> {
        Ok(self
            .training
            .read()
            .iter()
            .filter(|row| row.record.category == category && row.record.outcome.label().is_some())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PredictionLedger for MemoryStore {
    async fn fetch_unscored(
        &self,
        categories: &[CategoryKey],
        limit: usize,
    ) -> Result<Vec<TrainingRow>> {
        let training = self.training.read();
        let scores = self.scores.read();
        let mut rows: Vec<TrainingRow> = training
            .iter()
            .filter(|row| categories.contains(&row.record.category))
            .filter(|row| row.record.outcome.label().is_some())
            .filter(|row| !scores.contains_key(&row.record.id))
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.record.game_date);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn record_scores(&self, scores: &[ScoredPrediction]) -> Result<usize> {
        let training = self.training.read();
        let mut stored = self.scores.write();
        let mut updated = 0;
        for score in scores {
            if training.iter().any(|row| row.record.id == score.record_id) {
                stored.insert(score.record_id, score.clone());
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn fetch_scored_since(&self, since: NaiveDate) -> Result<Vec<ScoredPrediction>> {
        let mut scored: Vec<ScoredPrediction> = self
            .scores
            .read()
            .values()
            .filter(|score| score.game_date >= since)
            .cloned()
            .collect();
        scored.sort_by_key(|score| (score.game_date, score.record_id));
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propline_models::{Outcome, PredictedOutcome, StreakType};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn profile(player: &str, hit_streak: u32) -> StreakProfile {
        StreakProfile {
            player_id: player.to_string(),
            category: CategoryKey::Hits,
            hit_streak,
            win_streak: hit_streak,
            rolling_result_avg_7: 0.5,
            streak_type: StreakType::Neutral,
            sample_size: 4,
        }
    }

    #[tokio::test]
    async fn test_resolved_since_filters_and_orders() {
        let store = MemoryStore::new().with_outcomes(vec![
            OutcomeRecord::new("1", CategoryKey::Hits, 0.5, Outcome::Win, date(1)),
            OutcomeRecord::new("1", CategoryKey::Hits, 0.5, Outcome::Loss, date(9)),
            OutcomeRecord::new("1", CategoryKey::Hits, 0.5, Outcome::Win, date(5)),
        ]);

        let records = store.fetch_resolved_since(date(3)).await.unwrap();
        let days: Vec<NaiveDate> = records.iter().map(|r| r.game_date).collect();
        assert_eq!(days, vec![date(9), date(5)]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_key() {
        let store = MemoryStore::new();
        store.upsert_profiles(&[profile("1", 2), profile("2", 0)]).await.unwrap();
        store.upsert_profiles(&[profile("1", 5)]).await.unwrap();

        let key = ProfileKey::new("1", CategoryKey::Hits);
        assert_eq!(store.get_profile(&key).await.unwrap().unwrap().hit_streak, 5);
        assert_eq!(store.profiles().len(), 2);
        assert!(store
            .get_profile(&ProfileKey::new("1", CategoryKey::Walks))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_labeled_rows_exclude_pushes_and_other_categories() {
        let store = MemoryStore::new().with_training_rows(vec![
            row(CategoryKey::Hits, Outcome::Win, 1),
            row(CategoryKey::Hits, Outcome::Push, 2),
            row(CategoryKey::Walks, Outcome::Loss, 3),
        ]);

        let rows = store.fetch_labeled(CategoryKey::Hits).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.outcome, Outcome::Win);
    }

    fn row(category: CategoryKey, outcome: Outcome, day: u32) -> TrainingRow {
        TrainingRow::new(OutcomeRecord::new("1", category, 0.5, outcome, date(day)))
    }

    #[tokio::test]
    async fn test_scored_rows_leave_the_unscored_queue() {
        let rows = vec![
            row(CategoryKey::Hits, Outcome::Loss, 9),
            row(CategoryKey::Hits, Outcome::Push, 2),
            row(CategoryKey::Walks, Outcome::Win, 4),
            row(CategoryKey::Hits, Outcome::Win, 1),
        ];
        let store = MemoryStore::new().with_training_rows(rows.clone());
        let both = [CategoryKey::Hits, CategoryKey::Walks];

        assert!(store.fetch_unscored(&[CategoryKey::HomeRuns], 10).await.unwrap().is_empty());
        let queue = store.fetch_unscored(&both, 2).await.unwrap();
        let days: Vec<NaiveDate> = queue.iter().map(|r| r.record.game_date).collect();
        assert_eq!(days, vec![date(1), date(4)]);

        let scores: Vec<ScoredPrediction> =
            queue.iter().map(|r| ScoredPrediction::new(&r.record, 0.7)).collect();
        assert_eq!(store.record_scores(&scores).await.unwrap(), 2);

        let remaining = store.fetch_unscored(&both, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].record.id, rows[0].record.id);

        let walks = store.score_for(rows[2].record.id).unwrap();
        assert_eq!(walks.predicted_outcome, PredictedOutcome::Win);
        assert_eq!(walks.was_correct, Some(true));
        assert_eq!(store.fetch_scored_since(date(3)).await.unwrap(), vec![walks]);
    }

    #[tokio::test]
    async fn test_scores_for_unknown_rows_are_ignored() {
        let store = MemoryStore::new();
        let stray = OutcomeRecord::new("1", CategoryKey::Hits, 0.5, Outcome::Win, date(1));
        let written = store
            .record_scores(&[ScoredPrediction::new(&stray, 0.2)])
            .await
            .unwrap();

        assert_eq!(written, 0);
        assert!(store.fetch_scored_since(date(1)).await.unwrap().is_empty());
    }
}
