use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::aggregates::{AggregateSnapshot, SkillTotal, UNKNOWN_GROUP, UNSPECIFIED_LOCATION};
use crate::models::job::EnrichedJob;

#[derive(Debug, Default)]
struct Totals {
    locations: BTreeMap<String, u64>,
    /// Keyed by skill name as reported by the analyzer.
    skills: BTreeMap<String, SkillTotal>,
}

/// Running location and skill totals for a single run.
///
/// Every mutation happens under one lock, so a snapshot never observes half of a merge.
#[derive(Debug, Default)]
pub struct AggregationStore {
    totals: Mutex<Totals>,
}

impl AggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preloads totals committed by earlier runs for the same query.
    pub fn seed(&self, locations: HashMap<Option<String>, u64>, skills: HashMap<String, SkillTotal>) {
        let mut totals = self.lock();
        for (location, count) in locations {
            *totals
                .locations
                .entry(location_key(location.as_deref()))
                .or_insert(0) += count;
        }
        for (skill, seeded) in skills {
            add_skill(&mut totals.skills, skill, seeded.group, seeded.total);
        }
    }

    pub fn merge(&self, jobs: &[EnrichedJob]) {
        let mut totals = self.lock();
        for job in jobs {
            let location = location_key(job.posting.candidate_required_location.as_deref());
            *totals.locations.entry(location).or_insert(0) += 1;

            for skill in &job.skills {
                add_skill(
                    &mut totals.skills,
                    skill.name.clone(),
                    skill.group.clone(),
                    u64::from(skill.level),
                );
            }
        }
    }

    pub fn snapshot(&self) -> AggregateSnapshot {
        let totals = self.lock();
        let mut skills: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        for (skill, total) in &totals.skills {
            let group = total.group.as_deref().unwrap_or(UNKNOWN_GROUP);
            skills
                .entry(group.to_string())
                .or_default()
                .insert(skill.clone(), total.total);
        }

        AggregateSnapshot {
            locations: totals.locations.clone(),
            skills,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Totals> {
        // Entry updates are single adds; poisoned totals are still consistent.
        self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn location_key(location: Option<&str>) -> String {
    match location.map(str::trim) {
        Some(loc) if !loc.is_empty() => loc.to_string(),
        _ => UNSPECIFIED_LOCATION.to_string(),
    }
}

fn add_skill(skills: &mut BTreeMap<String, SkillTotal>, name: String, group: Option<String>, weight: u64) {
    let entry = skills.entry(name).or_insert(SkillTotal {
        group: None,
        total: 0,
    });
    entry.total += weight;
    // First resolved group wins; an unresolved entry is upgraded once a group is known.
    if entry.group.is_none() {
        entry.group = group;
    }
}
