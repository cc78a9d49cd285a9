use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::category::CategoryKey;

/// Resolution of a prop. Anything that is neither a win nor a loss is a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Push,
}

impl Outcome {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "win" => Self::Win,
            "loss" => Self::Loss,
            _ => Self::Push,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Push => "push",
        }
    }

    /// Training label: win → 1, loss → 0. Pushes carry no label.
    pub fn label(self) -> Option<usize> {
        match self {
            Self::Win => Some(1),
            Self::Loss => Some(0),
            Self::Push => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Home,
    Away,
}

impl Venue {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "home" => Some(Self::Home),
            "away" => Some(Self::Away),
            _ => None,
        }
    }
}

/// One resolved observation from the event store. Read-only to this system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: Uuid,
    pub player_id: String,
    pub category: CategoryKey,
    /// The stat the player actually recorded.
    pub observed_value: Option<f64>,
    pub prop_value: f64,
    pub outcome: Outcome,
    pub game_date: NaiveDate,
    pub venue: Option<Venue>,
    pub opponent: Option<String>,
}

impl OutcomeRecord {
    pub fn new(
        player_id: impl Into<String>,
        category: CategoryKey,
        prop_value: f64,
        outcome: Outcome,
        game_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            player_id: player_id.into(),
            category,
            observed_value: None,
            prop_value,
            outcome,
            game_date,
            venue: None,
            opponent: None,
        }
    }

    pub fn with_venue(mut self, venue: Venue) -> Self {
        self.venue = Some(venue);
        self
    }

    pub fn with_opponent(mut self, opponent: impl Into<String>) -> Self {
        self.opponent = Some(opponent.into());
        self
    }

    pub fn with_observed_value(mut self, value: f64) -> Self {
        self.observed_value = Some(value);
        self
    }

    pub fn is_home(&self) -> Option<bool> {
        self.venue.map(|v| v == Venue::Home)
    }
}

/// A labeled row for training: the record plus the streak statistics that were
/// current when the prop was offered. Missing statistics are coerced to zero by
/// the feature builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub record: OutcomeRecord,
    pub rolling_result_avg_7: Option<f64>,
    pub hit_streak: Option<u32>,
    pub win_streak: Option<u32>,
}

impl TrainingRow {
    pub fn new(record: OutcomeRecord) -> Self {
        Self {
            record,
            rolling_result_avg_7: None,
            hit_streak: None,
            win_streak: None,
        }
    }

    pub fn with_stats(
        mut self,
        rolling_result_avg_7: f64,
        hit_streak: u32,
        win_streak: u32,
    ) -> Self {
        self.rolling_result_avg_7 = Some(rolling_result_avg_7);
        self.hit_streak = Some(hit_streak);
        self.win_streak = Some(win_streak);
        self
    }

    pub fn has_stats(&self) -> bool {
        self.rolling_result_avg_7.is_some()
            && self.hit_streak.is_some()
            && self.win_streak.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_parsing() {
        assert_eq!(Outcome::parse("win"), Outcome::Win);
        assert_eq!(Outcome::parse(" LOSS "), Outcome::Loss);
        assert_eq!(Outcome::parse("void"), Outcome::Push);
        assert_eq!(Outcome::Win.label(), Some(1));
        assert_eq!(Outcome::Loss.label(), Some(0));
        assert_eq!(Outcome::Push.label(), None);
    }

    #[test]
    fn test_record_context() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let record = OutcomeRecord::new("660271", CategoryKey::Hits, 1.5, Outcome::Win, date)
            .with_venue(Venue::Home)
            .with_opponent("NYY");

        assert_eq!(record.is_home(), Some(true));
        assert_eq!(record.opponent.as_deref(), Some("NYY"));
        assert_eq!(Venue::parse("Away"), Some(Venue::Away));
        assert_eq!(Venue::parse("neutral site"), None);
    }
}
