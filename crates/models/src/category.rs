use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PropError, Result};

/// Canonical prop category. Every model artifact is keyed by exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKey {
    Hits,
    HomeRuns,
    Rbis,
    StrikeoutsPitching,
    StrikeoutsBatting,
    RunsScored,
    Walks,
    Doubles,
    Triples,
    OutsRecorded,
    EarnedRuns,
    HitsAllowed,
    WalksAllowed,
    StolenBases,
    TotalBases,
    HitsRunsRbis,
    RunsRbis,
    Singles,
}

impl CategoryKey {
    pub const ALL: [CategoryKey; 18] = [
        Self::Hits,
        Self::HomeRuns,
        Self::Rbis,
        Self::StrikeoutsPitching,
        Self::StrikeoutsBatting,
        Self::RunsScored,
        Self::Walks,
        Self::Doubles,
        Self::Triples,
        Self::OutsRecorded,
        Self::EarnedRuns,
        Self::HitsAllowed,
        Self::WalksAllowed,
        Self::StolenBases,
        Self::TotalBases,
        Self::HitsRunsRbis,
        Self::RunsRbis,
        Self::Singles,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hits => "hits",
            Self::HomeRuns => "home_runs",
            Self::Rbis => "rbis",
            Self::StrikeoutsPitching => "strikeouts_pitching",
            Self::StrikeoutsBatting => "strikeouts_batting",
            Self::RunsScored => "runs_scored",
            Self::Walks => "walks",
            Self::Doubles => "doubles",
            Self::Triples => "triples",
            Self::OutsRecorded => "outs_recorded",
            Self::EarnedRuns => "earned_runs",
            Self::HitsAllowed => "hits_allowed",
            Self::WalksAllowed => "walks_allowed",
            Self::StolenBases => "stolen_bases",
            Self::TotalBases => "total_bases",
            Self::HitsRunsRbis => "hits_runs_rbis",
            Self::RunsRbis => "runs_rbis",
            Self::Singles => "singles",
        }
    }

    /// Human-facing label as it appears on sportsbook boards.
    pub fn label(self) -> &'static str {
        match self {
            Self::Hits => "Hits",
            Self::HomeRuns => "Home Runs",
            Self::Rbis => "RBIs",
            Self::StrikeoutsPitching => "Strikeouts (Pitching)",
            Self::StrikeoutsBatting => "Strikeouts (Batting)",
            Self::RunsScored => "Runs Scored",
            Self::Walks => "Walks",
            Self::Doubles => "Doubles",
            Self::Triples => "Triples",
            Self::OutsRecorded => "Outs Recorded",
            Self::EarnedRuns => "Earned Runs",
            Self::HitsAllowed => "Hits Allowed",
            Self::WalksAllowed => "Walks Allowed",
            Self::StolenBases => "Stolen Bases",
            Self::TotalBases => "Total Bases",
            Self::HitsRunsRbis => "Hits + Runs + RBIs",
            Self::RunsRbis => "Runs + RBIs",
            Self::Singles => "Singles",
        }
    }

    /// Exact match on the canonical key text. No normalization is applied.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonicalizes free text: lower-cases, drops parentheses, turns every run of
/// whitespace, `+` or `_` into a single `_` and trims separators at both ends.
///
/// `normalize_label(normalize_label(x)) == normalize_label(x)` for every input.
pub fn normalize_label(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_separator = false;

    for ch in lowered.chars() {
        match ch {
            '(' | ')' => {}
            c if c == '+' || c == '_' || c.is_whitespace() => pending_separator = true,
            c => {
                if pending_separator && !out.is_empty() {
                    out.push('_');
                }
                pending_separator = false;
                out.push(c);
            }
        }
    }

    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Known(CategoryKey),
    /// Carries the normalized text that failed to match, for logging.
    Unknown(String),
}

impl Normalized {
    pub fn key(&self) -> Option<CategoryKey> {
        match self {
            Self::Known(key) => Some(*key),
            Self::Unknown(_) => None,
        }
    }
}

/// Maps human-entered labels onto [`CategoryKey`]. Aliases come from configuration.
#[derive(Debug, Clone)]
pub struct CategoryNormalizer {
    aliases: HashMap<String, CategoryKey>,
}

impl Default for CategoryNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl CategoryNormalizer {
    pub fn new() -> Self {
        Self::empty()
            .with_alias("Runs", CategoryKey::RunsScored)
            .with_alias("Strikeouts", CategoryKey::StrikeoutsBatting)
            .with_alias("RBI", CategoryKey::Rbis)
            .with_alias("HRs", CategoryKey::HomeRuns)
    }

    /// A normalizer that only accepts canonical keys and their labels.
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    pub fn with_alias(mut self, label: &str, key: CategoryKey) -> Self {
        let text = normalize_label(label);
        if !text.is_empty() {
            self.aliases.insert(text, key);
        }
        self
    }

    pub fn normalize(&self, raw: &str) -> Normalized {
        let text = normalize_label(raw);
        if text.is_empty() {
            return Normalized::Unknown(text);
        }

        match CategoryKey::from_key(&text).or_else(|| self.aliases.get(&text).copied()) {
            Some(key) => Normalized::Known(key),
            None => Normalized::Unknown(text),
        }
    }

    pub fn resolve(&self, raw: &str) -> Result<CategoryKey> {
        self.normalize(raw)
            .key()
            .ok_or_else(|| PropError::UnsupportedCategory {
                raw: raw.to_string(),
            })
    }
}
