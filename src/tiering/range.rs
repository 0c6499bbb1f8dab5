use std::fmt;
use std::str::FromStr;

use crate::error::RiskSyncError;

/// A configured score interval. Both bounds of `Bounded` are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreRange {
    /// `"from-to"`
    Bounded { from: i64, to: i64 },
    /// `"N+"`: any score at or above `N`.
    AtLeast(i64),
}

impl ScoreRange {
    pub fn contains(&self, score: i64) -> bool {
        match *self {
            ScoreRange::Bounded { from, to } => from <= score && score <= to,
            ScoreRange::AtLeast(min) => score >= min,
        }
    }
}

impl FromStr for ScoreRange {
    type Err = RiskSyncError;

    /// A key containing `+` is open-ended; anything else must be exactly two
    /// integers joined by `-`.
    fn from_str(key: &str) -> Result<Self, RiskSyncError> {
        if key.contains('+') {
            let min = parse_bound(key, &key.replace('+', ""))?;
            return Ok(ScoreRange::AtLeast(min));
        }

        let parts: Vec<&str> = key.split('-').collect();
        let [from, to] = parts.as_slice() else {
            return Err(RiskSyncError::ConfigFormat(format!(
                "'{key}' is neither \"from-to\" nor \"N+\""
            )));
        };

        Ok(ScoreRange::Bounded {
            from: parse_bound(key, from)?,
            to: parse_bound(key, to)?,
        })
    }
}

fn parse_bound(key: &str, value: &str) -> Result<i64, RiskSyncError> {
    value
        .trim()
        .parse()
        .map_err(|e| RiskSyncError::ConfigParse(format!("'{key}': {e}")))
}

impl fmt::Display for ScoreRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreRange::Bounded { from, to } => write!(f, "{from}-{to}"),
            ScoreRange::AtLeast(min) => write!(f, "{min}+"),
        }
    }
}
