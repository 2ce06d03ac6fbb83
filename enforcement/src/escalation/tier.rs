//! Sanction tiers
//!
//! ```text
//! CLEAN(0) ─▶ WARN_1(1) ─▶ WARN_2(2) ─▶ WARN_FINAL(threshold-1) ─▶ BANNED(≥threshold)
//! ```
//!
//! The tier is a pure function of the cumulative warning count. Severity
//! never moves an identity along the ladder.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Escalation stage derived from `warning_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SanctionTier {
    Clean,
    #[serde(rename = "WARN_1")]
    Warn1,
    #[serde(rename = "WARN_2")]
    Warn2,
    WarnFinal,
    Banned,
}

impl SanctionTier {
    /// Map a cumulative count onto the ladder.
    ///
    /// With the default threshold of 4 this is the fixed
    /// 0/1/2/3/≥4 ladder. Larger thresholds stretch the `Warn2` band; the
    /// last count before the ban is always `WarnFinal`.
    pub fn from_count(count: u32, ban_threshold: u32) -> Self {
        if count == 0 {
            Self::Clean
        } else if count >= ban_threshold {
            Self::Banned
        } else if count == ban_threshold - 1 {
            Self::WarnFinal
        } else if count == 1 {
            Self::Warn1
        } else {
            Self::Warn2
        }
    }

    pub fn is_banned(&self) -> bool {
        matches!(self, Self::Banned)
    }

    /// The caller-facing tier, `None` for `Clean`.
    pub fn outcome_tier(&self) -> Option<OutcomeTier> {
        match self {
            Self::Clean => None,
            Self::Warn1 => Some(OutcomeTier::Warning(1)),
            Self::Warn2 => Some(OutcomeTier::Warning(2)),
            Self::WarnFinal => Some(OutcomeTier::Warning(3)),
            Self::Banned => Some(OutcomeTier::Banned),
        }
    }
}

impl std::fmt::Display for SanctionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "CLEAN"),
            Self::Warn1 => write!(f, "WARN_1"),
            Self::Warn2 => write!(f, "WARN_2"),
            Self::WarnFinal => write!(f, "WARN_FINAL"),
            Self::Banned => write!(f, "BANNED"),
        }
    }
}

/// Tier as reported in a `ModerationOutcome`: `1`, `2`, `3` or `"banned"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeTier {
    Warning(u8),
    Banned,
}

impl Serialize for OutcomeTier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Warning(n) => serializer.serialize_u8(*n),
            Self::Banned => serializer.serialize_str("banned"),
        }
    }
}

impl<'de> Deserialize<'de> for OutcomeTier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u8),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n @ 1..=3) => Ok(Self::Warning(n)),
            Raw::Number(n) => Err(serde::de::Error::custom(format!(
                "warning tier must be 1, 2 or 3, got {n}"
            ))),
            Raw::Text(s) if s == "banned" => Ok(Self::Banned),
            Raw::Text(s) => Err(serde::de::Error::custom(format!(
                "unknown tier \"{s}\""
            ))),
        }
    }
}
