use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LocationCountRow {
    pub location: Option<String>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SkillTotalRow {
    pub skill: String,
    pub group_name: Option<String>,
    pub total_level: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SkillGroupRow {
    pub skill: String,
    pub group_name: String,
}
