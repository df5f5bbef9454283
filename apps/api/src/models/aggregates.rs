use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Location key used when a posting carries no location.
pub const UNSPECIFIED_LOCATION: &str = "Undefined";

/// Group key for skills whose taxonomy group is not resolved.
pub const UNKNOWN_GROUP: &str = "UNKNOWN";

/// Read-only projection of a run's running totals, published as `CHART_MAP`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub locations: BTreeMap<String, u64>,
    /// group -> skill -> cumulative proficiency weight
    pub skills: BTreeMap<String, BTreeMap<String, u64>>,
}

impl AggregateSnapshot {
    pub fn location_count(&self, location: &str) -> u64 {
        self.locations.get(location).copied().unwrap_or(0)
    }

    pub fn skill_weight(&self, group: &str, skill: &str) -> u64 {
        self.skills
            .get(group)
            .and_then(|skills| skills.get(skill))
            .copied()
            .unwrap_or(0)
    }
}

/// Previously committed totals for one skill, used to seed a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillTotal {
    pub group: Option<String>,
    pub total: u64,
}
