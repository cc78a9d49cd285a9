use chrono::{DateTime, NaiveDate, Utc};
use propline_models::{
    CategoryKey, CategoryNormalizer, Outcome, OutcomeRecord, PredictedOutcome, PropError, Result,
    ScoredPrediction, StreakProfile, StreakType, TrainingRow, Venue,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PlayerPropRow {
    pub id: Uuid,
    pub player_id: String,
    pub prop_type: String,
    pub prop_value: f64,
    pub observed_value: Option<f64>,
    pub outcome: Option<String>,
    pub status: String,
    pub game_date: NaiveDate,
    pub is_home: Option<bool>,
    pub opponent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PlayerPropRow {
    /// Fails with `UnsupportedCategory` when the free-text prop type does not
    /// normalize; callers skip such rows.
    pub fn into_record(self, normalizer: &CategoryNormalizer) -> Result<OutcomeRecord> {
        let category = normalizer.resolve(&self.prop_type)?;
        let outcome = self
            .outcome
            .as_deref()
            .map(Outcome::parse)
            .ok_or_else(|| {
                PropError::invalid("outcome", format!("prop {} is unresolved", self.id))
            })?;

        Ok(OutcomeRecord {
            id: self.id,
            player_id: self.player_id,
            category,
            observed_value: self.observed_value,
            prop_value: self.prop_value,
            outcome,
            game_date: self.game_date,
            venue: self.is_home.map(venue_from_flag),
            opponent: self.opponent,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StreakProfileRow {
    pub player_id: String,
    pub prop_type: String,
    pub hit_streak: i32,
    pub win_streak: i32,
    pub rolling_result_avg_7: f64,
    pub streak_type: String,
    pub sample_size: i32,
    pub updated_at: DateTime<Utc>,
}

impl StreakProfileRow {
    pub fn into_profile(self) -> Result<StreakProfile> {
        let category = CategoryKey::from_key(&self.prop_type).ok_or_else(|| {
            PropError::UnsupportedCategory {
                raw: self.prop_type.clone(),
            }
        })?;

        Ok(StreakProfile {
            player_id: self.player_id,
            category,
            hit_streak: non_negative(self.hit_streak),
            win_streak: non_negative(self.win_streak),
            rolling_result_avg_7: self.rolling_result_avg_7,
            streak_type: StreakType::parse(&self.streak_type),
            sample_size: non_negative(self.sample_size),
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrainingPropRow {
    pub id: Uuid,
    pub player_id: String,
    pub prop_type: String,
    pub prop_value: f64,
    pub observed_value: Option<f64>,
    pub outcome: String,
    pub game_date: NaiveDate,
    pub is_home: Option<bool>,
    pub opponent: Option<String>,
    pub rolling_result_avg_7: Option<f64>,
    pub hit_streak: Option<i32>,
    pub win_streak: Option<i32>,
}

impl TrainingPropRow {
    pub fn into_training_row(self, category: CategoryKey) -> TrainingRow {
        let record = OutcomeRecord {
            id: self.id,
            player_id: self.player_id,
            category,
            observed_value: self.observed_value,
            prop_value: self.prop_value,
            outcome: Outcome::parse(&self.outcome),
            game_date: self.game_date,
            venue: self.is_home.map(venue_from_flag),
            opponent: self.opponent,
        };

        TrainingRow {
            record,
            rolling_result_avg_7: self.rolling_result_avg_7,
            hit_streak: self.hit_streak.map(non_negative),
            win_streak: self.win_streak.map(non_negative),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScoredPropRow {
    pub id: Uuid,
    pub prop_type: String,
    pub game_date: NaiveDate,
    pub outcome: String,
    pub predicted_outcome: String,
    pub confidence_score: Option<f64>,
    pub was_correct: Option<bool>,
}

impl ScoredPropRow {
    pub fn into_scored(self) -> Result<ScoredPrediction> {
        let category = CategoryKey::from_key(&self.prop_type).ok_or_else(|| {
            PropError::UnsupportedCategory {
                raw: self.prop_type.clone(),
            }
        })?;
        let predicted_outcome = PredictedOutcome::parse(&self.predicted_outcome).ok_or_else(|| {
            PropError::invalid(
                "predicted_outcome",
                format!("{:?} on row {}", self.predicted_outcome, self.id),
            )
        })?;
        let outcome = Outcome::parse(&self.outcome);

        Ok(ScoredPrediction {
            record_id: self.id,
            category,
            game_date: self.game_date,
            outcome,
            predicted_outcome,
            confidence_score: self.confidence_score.unwrap_or(0.0),
            was_correct: self.was_correct,
        })
    }
}

fn venue_from_flag(is_home: bool) -> Venue {
    if is_home {
        Venue::Home
    } else {
        Venue::Away
    }
}

fn non_negative(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}
