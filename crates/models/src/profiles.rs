use serde::{Deserialize, Serialize};

use crate::category::CategoryKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreakType {
    Win,
    Loss,
    #[default]
    Neutral,
}

impl StreakType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Neutral => "neutral",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "win" => Self::Win,
            "loss" => Self::Loss,
            _ => Self::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProfileKey {
    pub player_id: String,
    pub category: CategoryKey,
}

impl ProfileKey {
    pub fn new(player_id: impl Into<String>, category: CategoryKey) -> Self {
        Self {
            player_id: player_id.into(),
            category,
        }
    }
}

/// Rolling statistics for one (player, category) pair, rebuilt wholesale on
/// every aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakProfile {
    pub player_id: String,
    pub category: CategoryKey,
    pub hit_streak: u32,
    pub win_streak: u32,
    pub rolling_result_avg_7: f64,
    pub streak_type: StreakType,
    /// Number of records that fell inside the window.
    pub sample_size: u32,
}

impl StreakProfile {
    pub fn key(&self) -> ProfileKey {
        ProfileKey::new(self.player_id.clone(), self.category)
    }
}
