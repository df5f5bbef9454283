use anyhow::Result;

use crate::models::job::JobPosting;
use crate::storage::JobStore;

/// Drops candidates whose natural key is already stored. Survivors keep their input order.
pub async fn filter_new(candidates: Vec<JobPosting>, store: &dyn JobStore) -> Result<Vec<JobPosting>> {
    if candidates.is_empty() {
        return Ok(candidates);
    }

    let keys: Vec<String> = candidates.iter().map(JobPosting::natural_key).collect();
    let existing = store.existing_keys(&keys).await?;

    Ok(candidates
        .into_iter()
        .zip(keys)
        .filter(|(_, key)| !existing.contains(key))
        .map(|(posting, _)| posting)
        .collect())
}
