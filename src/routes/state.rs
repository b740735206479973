use std::sync::Arc;

use tokio::sync::RwLock;

use crate::services::PlaylistRecommender;

/// Shared application state
///
/// The recommender slot starts empty when artifacts fail to load; handlers
/// answer 503 until one is installed.
#[derive(Clone)]
pub struct AppState {
    recommender: Arc<RwLock<Option<Arc<dyn PlaylistRecommender>>>>,
    /// Candidates fetched per request before paging
    pub fetch_size: usize,
}

impl AppState {
    /// Creates state with no recommender loaded
    pub fn new(fetch_size: usize) -> Self {
        Self {
            recommender: Arc::new(RwLock::new(None)),
            fetch_size,
        }
    }

    pub fn with_recommender(recommender: Arc<dyn PlaylistRecommender>, fetch_size: usize) -> Self {
        Self {
            recommender: Arc::new(RwLock::new(Some(recommender))),
            fetch_size,
        }
    }

    /// Publishes a new recommender; in-flight requests keep the one they cloned
    pub async fn install(&self, recommender: Arc<dyn PlaylistRecommender>) {
        *self.recommender.write().await = Some(recommender);
    }

    pub async fn recommender(&self) -> Option<Arc<dyn PlaylistRecommender>> {
        self.recommender.read().await.clone()
    }

    pub async fn is_ready(&self) -> bool {
        self.recommender.read().await.is_some()
    }
}
