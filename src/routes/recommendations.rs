use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::{
    error::{AppError, AppResult},
    models::Recommendation,
    services::paginate,
};

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    pub playlist_id: i64,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    10
}

impl RecommendationRequest {
    /// Returns `(page, page_size)` once both are positive
    fn paging(&self) -> AppResult<(usize, usize)> {
        if self.page < 1 {
            return Err(AppError::InvalidInput(format!("page must be >= 1, got {}", self.page)));
        }
        if self.page_size < 1 {
            return Err(AppError::InvalidInput(format!(
                "page_size must be >= 1, got {}",
                self.page_size
            )));
        }
        Ok((self.page as usize, self.page_size as usize))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub recommendations: Vec<Recommendation>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// Handler for recommendations endpoint
///
/// Fetches `fetch_size` ranked tracks once and slices out the requested page.
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    let (page, page_size) = request.paging()?;

    let recommender = state.recommender().await.ok_or_else(|| {
        AppError::Unavailable("Model is not available. Please check server logs.".to_string())
    })?;

    let ranked = recommender
        .recommend(request.playlist_id, state.fetch_size)
        .await?;
    let page = paginate(ranked, page, page_size);

    tracing::info!(
        playlist_id = request.playlist_id,
        returned = page.items.len(),
        has_more = page.has_more,
        "Served recommendations"
    );

    Ok(Json(RecommendationResponse {
        recommendations: page.items,
        has_more: page.has_more,
    }))
}
