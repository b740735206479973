use ndarray::Array1;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::gnn::{EmbeddingSnapshot, HeteroSage, ShapeError};
use crate::graph::artifacts::WEIGHTS_FILE;
use crate::graph::{ArtifactError, ArtifactSet, ArtifactStore, GraphError, IdMapping};
use crate::models::Recommendation;

/// Failures while turning artifacts into a ready engine
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("Invalid graph: {0}")]
    Graph(#[from] GraphError),
    #[error("Model does not fit the graph: {0}")]
    ShapeMismatch(#[from] ShapeError),
    #[error("Inconsistent artifacts: {0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecommendError {
    #[error("Playlist with ID {0} not found.")]
    PlaylistNotFound(i64),
}

/// Anything that can rank tracks for a playlist
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PlaylistRecommender: Send + Sync {
    /// Up to `count` distinct tracks not already in the playlist, best first
    async fn recommend(
        &self,
        playlist_id: i64,
        count: usize,
    ) -> Result<Vec<Recommendation>, RecommendError>;
}

/// Serves recommendations from embeddings computed once at construction
///
/// Immutable after construction, so it can be shared across request handlers
/// behind an `Arc` without locking.
#[derive(Debug)]
pub struct RecommendationEngine {
    snapshot: Arc<EmbeddingSnapshot>,
    playlist_mapping: IdMapping,
    /// Track indices present in each playlist, by playlist index
    known_tracks: Vec<HashSet<usize>>,
    /// Display metadata by track index
    display: Vec<Recommendation>,
}

impl RecommendationEngine {
    /// Loads every artifact from `dir` and runs the single forward pass
    pub fn initialize(dir: impl AsRef<Path>) -> Result<Self, LoadError> {
        let start = Instant::now();
        let store = ArtifactStore::new(dir.as_ref());
        let set = store.load_set()?;
        let model: HeteroSage = store.read_json(WEIGHTS_FILE)?;
        let engine = Self::from_parts(set, &model)?;

        tracing::info!(
            dir = %dir.as_ref().display(),
            tracks = engine.num_tracks(),
            playlists = engine.num_playlists(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Recommendation engine initialized"
        );
        Ok(engine)
    }

    pub fn from_parts(set: ArtifactSet, model: &HeteroSage) -> Result<Self, LoadError> {
        let ArtifactSet {
            graph,
            track_mapping,
            playlist_mapping,
            interactions,
        } = set;

        graph.validate()?;
        model.check_compatible(&graph)?;
        if track_mapping.len() != graph.num_tracks() {
            return Err(LoadError::Inconsistent(format!(
                "track mapping has {} entries for {} tracks",
                track_mapping.len(),
                graph.num_tracks()
            )));
        }
        if playlist_mapping.len() != graph.num_playlists {
            return Err(LoadError::Inconsistent(format!(
                "playlist mapping has {} entries for {} playlists",
                playlist_mapping.len(),
                graph.num_playlists
            )));
        }

        let mut known_tracks = vec![HashSet::new(); playlist_mapping.len()];
        let mut display: Vec<Option<Recommendation>> = vec![None; track_mapping.len()];
        for row in &interactions {
            let track = track_mapping.index_of(&row.track_id).ok_or_else(|| {
                LoadError::Inconsistent(format!("track {} is not mapped", row.track_id))
            })?;
            let playlist = playlist_mapping
                .index_of(&row.pid.to_string())
                .ok_or_else(|| {
                    LoadError::Inconsistent(format!("playlist {} is not mapped", row.pid))
                })?;

            known_tracks[playlist].insert(track);
            // First row wins
            display[track].get_or_insert_with(|| row.display());
        }

        let mut unnamed = 0usize;
        let display: Vec<Recommendation> = display
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                entry.unwrap_or_else(|| {
                    // Tracks outside every playlist fall back to their id
                    unnamed += 1;
                    Recommendation {
                        track_name: track_mapping.id_of(index).unwrap_or_default().to_string(),
                        artist: String::new(),
                    }
                })
            })
            .collect();
        if unnamed > 0 {
            tracing::warn!(
                tracks = unnamed,
                "Tracks without interaction rows have no display metadata"
            );
        }

        Ok(Self {
            snapshot: Arc::new(model.forward(&graph)),
            playlist_mapping,
            known_tracks,
            display,
        })
    }

    pub fn num_tracks(&self) -> usize {
        self.display.len()
    }

    pub fn num_playlists(&self) -> usize {
        self.playlist_mapping.len()
    }

    pub fn snapshot(&self) -> Arc<EmbeddingSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Ranks tracks for `playlist_id`, excluding tracks already in it
    ///
    /// Returns at most `count` entries, unique by (track name, artist), in
    /// descending score order with ties broken by ascending track index.
    pub fn recommend(
        &self,
        playlist_id: i64,
        count: usize,
    ) -> Result<Vec<Recommendation>, RecommendError> {
        let playlist = self
            .playlist_mapping
            .index_of(&playlist_id.to_string())
            .ok_or(RecommendError::PlaylistNotFound(playlist_id))?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let scores = self.snapshot.scores_for_playlist(playlist);
        let known = &self.known_tracks[playlist];
        let candidates: Vec<usize> = (0..scores.len()).filter(|t| !known.contains(t)).collect();

        let mut k = count.min(candidates.len());
        loop {
            let ranked = top_k(&scores, &candidates, k);
            let mut seen = HashSet::with_capacity(ranked.len());
            let picked: Vec<Recommendation> = ranked
                .into_iter()
                .map(|t| &self.display[t])
                .filter(|entry| seen.insert(*entry))
                .take(count)
                .cloned()
                .collect();

            if picked.len() == count || k == candidates.len() {
                tracing::debug!(
                    playlist_id,
                    count,
                    returned = picked.len(),
                    "Recommendations ranked"
                );
                return Ok(picked);
            }
            // Duplicates ate into the selection; widen it
            k = (k * 2).min(candidates.len());
        }
    }
}

#[async_trait::async_trait]
impl PlaylistRecommender for RecommendationEngine {
    async fn recommend(
        &self,
        playlist_id: i64,
        count: usize,
    ) -> Result<Vec<Recommendation>, RecommendError> {
        RecommendationEngine::recommend(self, playlist_id, count)
    }
}

/// Highest-scoring `k` candidates, best first, ties to the lower index
fn top_k(scores: &Array1<f32>, candidates: &[usize], k: usize) -> Vec<usize> {
    let order = |a: &usize, b: &usize| scores[*b].total_cmp(&scores[*a]).then(a.cmp(b));
    let mut ranked = candidates.to_vec();
    if k < ranked.len() {
        ranked.select_nth_unstable_by(k, order);
        ranked.truncate(k);
    }
    ranked.sort_unstable_by(order);
    ranked
}

/// One 1-based page of an already ranked list
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let start = page.saturating_sub(1).saturating_mul(page_size);
    let end = start.saturating_add(page_size);
    let has_more = end < items.len();
    let items = items.into_iter().skip(start).take(page_size).collect();
    Page { items, has_more }
}
