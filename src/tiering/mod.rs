pub mod map;
pub mod range;

use std::collections::BTreeMap;

pub use map::{TierMap, TierRule};
pub use range::ScoreRange;

/// Map each user's score to a tier group name.
///
/// Rules are tried in configured order and every matching rule overwrites the
/// previous assignment, so with overlapping ranges the *last* matching rule
/// decides the tier. Users matching no rule are left out of the result.
pub fn assign_tiers(scores: &BTreeMap<String, i64>, tiers: &TierMap) -> BTreeMap<String, String> {
    let mut assignment = BTreeMap::new();
    for rule in tiers.rules() {
        for (user, &score) in scores {
            if rule.range.contains(score) {
                assignment.insert(user.clone(), rule.group.clone());
            }
        }
    }
    assignment
}
