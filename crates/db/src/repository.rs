use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use propline_models::{
    CategoryKey, CategoryNormalizer, OutcomeRecord, ProfileKey, PropError, Result, ScoredPrediction,
    StreakProfile, TrainingRow,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, warn};

use crate::schema::{PlayerPropRow, ScoredPropRow, StreakProfileRow, TrainingPropRow};

/// Rows per upsert statement, well under the Postgres bind limit.
const UPSERT_CHUNK: usize = 1_000;

/// Resolved outcome history the aggregator reads.
#[async_trait]
pub trait OutcomeSource: Send + Sync {
    /// Every resolved record with `game_date >= since`, most recent first.
    async fn fetch_resolved_since(&self, since: NaiveDate) -> Result<Vec<OutcomeRecord>>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert or replace by (player, category). Returns the number written.
    async fn upsert_profiles(&self, profiles: &[StreakProfile]) -> Result<usize>;

    async fn get_profile(&self, key: &ProfileKey) -> Result<Option<StreakProfile>>;
}

/// Labeled history the trainer reads.
#[async_trait]
pub trait TrainingSource: Send + Sync {
    async fn fetch_labeled(&self, category: CategoryKey) -> Result<Vec<TrainingRow>>;
}

/// After-the-fact scores of labeled props, kept next to the rows they score.
#[async_trait]
pub trait PredictionLedger: Send + Sync {
    /// Up to `limit` win/loss rows of `categories` that carry no score yet,
    /// oldest first.
    async fn fetch_unscored(
        &self,
        categories: &[CategoryKey],
        limit: usize,
    ) -> Result<Vec<TrainingRow>>;

    /// Writes each score onto its row. Returns the number of rows updated.
    async fn record_scores(&self, scores: &[ScoredPrediction]) -> Result<usize>;

    /// Every scored row with `game_date >= since`, oldest first.
    async fn fetch_scored_since(&self, since: NaiveDate) -> Result<Vec<ScoredPrediction>>;
}

pub struct PgStore {
    pool: PgPool,
    normalizer: CategoryNormalizer,
}

impl PgStore {
    pub fn new(pool: PgPool, normalizer: CategoryNormalizer) -> Self {
        Self { pool, normalizer }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_db_count(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl OutcomeSource for PgStore {
    async fn fetch_resolved_since(&self, since: NaiveDate) -> Result<Vec<OutcomeRecord>> {
        let rows: Vec<PlayerPropRow> = sqlx::query_as(
            r#"
            SELECT id, player_id, prop_type, prop_value, observed_value, outcome, status,
                   game_date, is_home, opponent, created_at
            FROM player_props
            WHERE status = 'resolved' AND outcome IS NOT NULL AND game_date >= $1
            ORDER BY game_date DESC, created_at ASC, id ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(PropError::upstream)?;

        let fetched = rows.len();
        let mut records = Vec::with_capacity(fetched);
        let mut skipped = 0usize;
        for row in rows {
            let id = row.id;
            match row.into_record(&self.normalizer) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    debug!(%id, error = %e, "Skipping prop row");
                }
            }
        }

        if skipped > 0 {
            warn!(skipped, fetched, "Skipped resolved props with unrecognised categories");
        }
        Ok(records)
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn upsert_profiles(&self, profiles: &[StreakProfile]) -> Result<usize> {
        if profiles.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(PropError::upstream)?;
        for chunk in profiles.chunks(UPSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO player_streak_profiles \
                 (player_id, prop_type, hit_streak, win_streak, rolling_result_avg_7, \
                 streak_type, sample_size, updated_at) ",
            );
            builder.push_values(chunk, |mut row, profile| {
                row.push_bind(&profile.player_id)
                    .push_bind(profile.category.as_str())
                    .push_bind(to_db_count(profile.hit_streak))
                    .push_bind(to_db_count(profile.win_streak))
                    .push_bind(profile.rolling_result_avg_7)
                    .push_bind(profile.streak_type.as_str())
                    .push_bind(to_db_count(profile.sample_size))
                    .push_bind(now);
            });
            builder.push(
                " ON CONFLICT (player_id, prop_type) DO UPDATE SET \
                 hit_streak = EXCLUDED.hit_streak, \
                 win_streak = EXCLUDED.win_streak, \
                 rolling_result_avg_7 = EXCLUDED.rolling_result_avg_7, \
                 streak_type = EXCLUDED.streak_type, \
                 sample_size = EXCLUDED.sample_size, \
                 updated_at = EXCLUDED.updated_at",
            );

            builder.build().execute(&mut *tx).await.map_err(PropError::upstream)?;
        }
        tx.commit().await.map_err(PropError::upstream)?;

        info!(count = profiles.len(), "Upserted streak profiles");
        Ok(profiles.len())
    }

    async fn get_profile(&self, key: &ProfileKey) -> Result<Option<StreakProfile>> {
        let row: Option<StreakProfileRow> = sqlx::query_as(
            r#"
            SELECT player_id, prop_type, hit_streak, win_streak, rolling_result_avg_7,
                   streak_type, sample_size, updated_at
            FROM player_streak_profiles
            WHERE player_id = $1 AND prop_type = $2
            "#,
        )
        .bind(&key.player_id)
        .bind(key.category.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(PropError::upstream)?;

        row.map(StreakProfileRow::into_profile).transpose()
    }
}

#[async_trait]
impl TrainingSource for PgStore {
    async fn fetch_labeled(&self, category: CategoryKey) -> Result<Vec<TrainingRow>> {
        let rows: Vec<TrainingPropRow> = sqlx::query_as(
            r#"
            SELECT id, player_id, prop_type, prop_value, observed_value, outcome, game_date,
                   is_home, opponent, rolling_result_avg_7, hit_streak, win_streak
            FROM model_training_props
            WHERE prop_type = $1 AND outcome IN ('win', 'loss')
            ORDER BY game_date ASC, created_at ASC, id ASC
            "#,
        )
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(PropError::upstream)?;

        debug!(%category, rows = rows.len(), "Fetched training rows");
        Ok(rows.into_iter().map(|row| row.into_training_row(category)).collect())
    }
}

#[async_trait]
impl PredictionLedger for PgStore {
    async fn fetch_unscored(
        &self,
        categories: &[CategoryKey],
        limit: usize,
    ) -> Result<Vec<TrainingRow>> {
        if categories.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = categories.iter().map(|c| c.as_str().to_string()).collect();
        let rows: Vec<TrainingPropRow> = sqlx::query_as(
            r#"
            SELECT id, player_id, prop_type, prop_value, observed_value, outcome, game_date,
                   is_home, opponent, rolling_result_avg_7, hit_streak, win_streak
            FROM model_training_props
            WHERE predicted_outcome IS NULL
              AND outcome IN ('win', 'loss')
              AND prop_type = ANY($1)
            ORDER BY game_date ASC, created_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(keys)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(PropError::upstream)?;

        let fetched = rows.len();
        let mut labeled = Vec::with_capacity(fetched);
        for row in rows {
            match CategoryKey::from_key(&row.prop_type) {
                Some(category) => labeled.push(row.into_training_row(category)),
                None => warn!(id = %row.id, prop_type = %row.prop_type, "Unscorable training row"),
            }
        }

        debug!(fetched, usable = labeled.len(), "Fetched unscored rows");
        Ok(labeled)
    }

    async fn record_scores(&self, scores: &[ScoredPrediction]) -> Result<usize> {
        if scores.is_empty() {
            return Ok(0);
        }

        let mut updated = 0u64;
        let mut tx = self.pool.begin().await.map_err(PropError::upstream)?;
        for chunk in scores.chunks(UPSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "UPDATE model_training_props AS t SET \
                 predicted_outcome = v.predicted_outcome, \
                 confidence_score = v.confidence_score, \
                 was_correct = v.was_correct \
                 FROM (",
            );
            builder.push_values(chunk, |mut row, score| {
                row.push_bind(score.record_id)
                    .push_bind(score.predicted_outcome.as_str())
                    .push_bind(score.confidence_score)
                    .push_bind(score.was_correct);
            });
            builder.push(
                ") AS v (id, predicted_outcome, confidence_score, was_correct) WHERE t.id = v.id",
            );

            let result = builder.build().execute(&mut *tx).await.map_err(PropError::upstream)?;
            updated += result.rows_affected();
        }
        tx.commit().await.map_err(PropError::upstream)?;

        let updated = usize::try_from(updated).unwrap_or(usize::MAX);
        info!(scores = scores.len(), updated, "Recorded prediction scores");
        Ok(updated)
    }

    async fn fetch_scored_since(&self, since: NaiveDate) -> Result<Vec<ScoredPrediction>> {
        let rows: Vec<ScoredPropRow> = sqlx::query_as(
            r#"
            SELECT id, prop_type, game_date, outcome, predicted_outcome, confidence_score,
                   was_correct
            FROM model_training_props
            WHERE predicted_outcome IS NOT NULL AND game_date >= $1
            ORDER BY game_date ASC, id ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(PropError::upstream)?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match row.into_scored() {
                Ok(score) => scored.push(score),
                Err(e) => warn!(%id, error = %e, "Skipping scored row"),
            }
        }
        Ok(scored)
    }
}
