// Feature engineering shared by training and serving

use std::collections::BTreeMap;

use propline_models::{FeatureVector, PredictRequest, StreakProfile, TrainingRow};
use serde::{Deserialize, Serialize};

/// Logical inputs of one feature row. Training and serving both reduce to this
/// type and then call [`build_features`]; nothing else may produce a
/// [`FeatureVector`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureInput {
    pub rolling_result_avg_7: Option<f64>,
    pub prop_value: Option<f64>,
    pub hit_streak: Option<u32>,
    pub win_streak: Option<u32>,
    pub is_home: Option<bool>,
    pub opponent_encoded: f64,
}

impl FeatureInput {
    /// Training path. The opponent column comes from the dataset-wide encoder.
    pub fn from_training_row(row: &TrainingRow, encoder: &OpponentEncoder) -> Self {
        Self {
            rolling_result_avg_7: row.rolling_result_avg_7,
            prop_value: Some(row.record.prop_value),
            hit_streak: row.hit_streak,
            win_streak: row.win_streak,
            is_home: row.record.is_home(),
            opponent_encoded: encode_opponent_from_dataset(encoder, row.record.opponent.as_deref()),
        }
    }

    /// Serving path. The opponent column is the caller's precomputed win rate.
    pub fn from_request(request: &PredictRequest) -> Self {
        Self {
            rolling_result_avg_7: request.rolling_result_avg_7,
            prop_value: request.prop_value,
            hit_streak: request.hit_streak,
            win_streak: request.win_streak,
            is_home: request.home_flag(),
            opponent_encoded: encode_opponent_from_request(request.opponent_avg_win_rate),
        }
    }

    pub fn from_profile(
        profile: &StreakProfile,
        prop_value: f64,
        is_home: Option<bool>,
        opponent_encoded: f64,
    ) -> Self {
        Self {
            rolling_result_avg_7: Some(profile.rolling_result_avg_7),
            prop_value: Some(prop_value),
            hit_streak: Some(profile.hit_streak),
            win_streak: Some(profile.win_streak),
            is_home,
            opponent_encoded,
        }
    }
}

/// Missing or non-finite numbers become 0.
fn coerce(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

pub fn build_features(input: &FeatureInput) -> FeatureVector {
    FeatureVector {
        line_diff: coerce(input.rolling_result_avg_7) - coerce(input.prop_value),
        hit_streak: f64::from(input.hit_streak.unwrap_or(0)),
        win_streak: f64::from(input.win_streak.unwrap_or(0)),
        is_home: if input.is_home == Some(true) { 1.0 } else { 0.0 },
        opponent_encoded: coerce(Some(input.opponent_encoded)),
    }
}

/// Target-mean encoding of opponents: historical win rate of all labeled rows
/// against each opponent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpponentEncoder {
    win_rates: BTreeMap<String, f64>,
}

impl OpponentEncoder {
    pub fn fit<'a>(rows: impl IntoIterator<Item = &'a TrainingRow>) -> Self {
        let mut tallies: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for row in rows {
            let opponent = row.record.opponent.as_deref();
            let (Some(opponent), Some(label)) = (opponent, row.record.outcome.label()) else {
                continue;
            };
            let entry = tallies.entry(opponent).or_insert((0, 0));
            entry.0 += label;
            entry.1 += 1;
        }

        let win_rates = tallies
            .into_iter()
            .map(|(opponent, (wins, total))| (opponent.to_string(), wins as f64 / total as f64))
            .collect();

        Self { win_rates }
    }

    pub fn win_rate(&self, opponent: &str) -> Option<f64> {
        self.win_rates.get(opponent).copied()
    }

    pub fn len(&self) -> usize {
        self.win_rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.win_rates.is_empty()
    }
}

/// Training-time opponent encoding. Unknown or absent opponents encode as 0.
pub fn encode_opponent_from_dataset(encoder: &OpponentEncoder, opponent: Option<&str>) -> f64 {
    opponent.and_then(|o| encoder.win_rate(o)).unwrap_or(0.0)
}

/// Serving-time opponent encoding: the caller supplies the rate.
pub fn encode_opponent_from_request(opponent_avg_win_rate: Option<f64>) -> f64 {
    coerce(opponent_avg_win_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use propline_models::{CategoryKey, Outcome, OutcomeRecord, OverUnder, StreakType, Venue};

    fn row(outcome: Outcome, opponent: &str) -> TrainingRow {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        TrainingRow::new(
            OutcomeRecord::new("592450", CategoryKey::Hits, 1.5, outcome, date)
                .with_venue(Venue::Home)
                .with_opponent(opponent),
        )
        .with_stats(0.571, 2, 2)
    }

    #[test]
    fn test_column_order_and_values() {
        let features = build_features(&FeatureInput {
            rolling_result_avg_7: Some(0.714),
            prop_value: Some(0.5),
            hit_streak: Some(3),
            win_streak: Some(3),
            is_home: Some(true),
            opponent_encoded: 0.42,
        });

        let values = features.to_array();
        assert!((values[0] - 0.214).abs() < 1e-12);
        assert_eq!(&values[1..], &[3.0, 3.0, 1.0, 0.42]);
    }

    #[test]
    fn test_missing_values_coerce_to_zero() {
        let features = build_features(&FeatureInput::default());
        assert_eq!(features.to_array(), [0.0; 5]);

        let features = build_features(&FeatureInput {
            rolling_result_avg_7: Some(f64::NAN),
            prop_value: Some(1.5),
            is_home: Some(false),
            ..FeatureInput::default()
        });
        assert_eq!(features.line_diff, -1.5);
        assert_eq!(features.is_home, 0.0);
    }

    #[test]
    fn test_opponent_encoder_means() {
        let rows = vec![
            row(Outcome::Win, "NYY"),
            row(Outcome::Loss, "NYY"),
            row(Outcome::Win, "NYY"),
            row(Outcome::Push, "NYY"),
            row(Outcome::Loss, "BOS"),
        ];
        let encoder = OpponentEncoder::fit(&rows);

        assert_eq!(encoder.len(), 2);
        assert!((encoder.win_rate("NYY").unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(encoder.win_rate("BOS"), Some(0.0));
        assert_eq!(encode_opponent_from_dataset(&encoder, Some("TOR")), 0.0);
        assert_eq!(encode_opponent_from_dataset(&encoder, None), 0.0);
    }

    #[test]
    fn test_training_and_serving_paths_agree() {
        let rows = vec![
            row(Outcome::Win, "NYY"),
            row(Outcome::Loss, "NYY"),
            row(Outcome::Win, "NYY"),
        ];
        let encoder = OpponentEncoder::fit(&rows);
        let training = build_features(&FeatureInput::from_training_row(&rows[0], &encoder));

        // A serving caller that precomputes the opponent rate from the same
        // dataset must land on the exact same vector.
        let request = PredictRequest::new("Hits", 1.5, OverUnder::Under)
            .with_streaks(0.571, 2, 2)
            .with_home(true)
            .with_opponent_win_rate(encoder.win_rate("NYY").unwrap());
        let serving = build_features(&FeatureInput::from_request(&request));

        assert_eq!(training, serving);
    }

    #[test]
    fn test_absent_inputs_agree_across_paths() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let bare =
            TrainingRow::new(OutcomeRecord::new("1", CategoryKey::Walks, 0.5, Outcome::Loss, date));
        let encoder = OpponentEncoder::default();
        let training = build_features(&FeatureInput::from_training_row(&bare, &encoder));

        let request = PredictRequest::new("Walks", 0.5, OverUnder::Over);
        let serving = build_features(&FeatureInput::from_request(&request));

        assert_eq!(training, serving);
    }

    #[test]
    fn test_profile_input() {
        let profile = StreakProfile {
            player_id: "1".to_string(),
            category: CategoryKey::Hits,
            hit_streak: 4,
            win_streak: 4,
            rolling_result_avg_7: 0.857,
            streak_type: StreakType::Neutral,
            sample_size: 7,
        };
        let features = build_features(&FeatureInput::from_profile(&profile, 0.5, None, 0.0));
        assert!((features.line_diff - 0.357).abs() < 1e-12);
        assert_eq!(features.hit_streak, 4.0);
        assert_eq!(features.is_home, 0.0);
    }
}
