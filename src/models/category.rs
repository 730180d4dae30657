use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Category as listed on the categories page, with how many posts use it.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWithCount {
    pub id: i64,
    pub name: String,
    pub post_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CategoryInput {
    pub name: String,
}
