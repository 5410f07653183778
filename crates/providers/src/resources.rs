//! Optional resource recommendation seam.
//!
//! Recommendation internals live outside the core; this trait is the only
//! surface the tool registry sees. When no recommender is wired, the
//! resource tools report a structured "not configured" error instead of
//! failing the turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dl_domain::error::Result;

/// A recommended learning resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

#[async_trait]
pub trait ResourceRecommender: Send + Sync {
    /// Free-text search over the resource catalog.
    async fn search(&self, user_id: &str, query: &str, limit: usize)
        -> Result<Vec<ResourceSummary>>;

    /// Resources recommended for the user, optionally filtered by category.
    async fn list(&self, user_id: &str, category: Option<&str>) -> Result<Vec<ResourceSummary>>;
}
