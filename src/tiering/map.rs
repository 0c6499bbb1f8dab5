use crate::error::RiskSyncError;

use super::range::ScoreRange;

/// Ordered, compiled score-range → tier group rules.
///
/// Order is the configured order and is significant: see [`super::assign_tiers`].
#[derive(Clone, PartialEq, Eq)]
pub struct TierMap {
    rules: Vec<TierRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierRule {
    pub range: ScoreRange,
    pub group: String,
}

impl std::fmt::Debug for TierMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierMap")
            .field("rule_count", &self.rules.len())
            .finish()
    }
}

impl TierMap {
    /// Compile `(range key, group name)` pairs, keeping their order.
    ///
    /// Fails on the first malformed key rather than skipping it.
    pub fn compile<'a, I>(entries: I) -> Result<Self, RiskSyncError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let rules = entries
            .into_iter()
            .map(|(key, group)| {
                let group = group.trim();
                if group.is_empty() {
                    return Err(RiskSyncError::ConfigFormat(format!(
                        "range '{key}' has an empty group name"
                    )));
                }
                Ok(TierRule {
                    range: key.parse()?,
                    group: group.to_owned(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[TierRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
