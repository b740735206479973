//! Bipartite playlist–track graph, its identifier mappings, and on-disk artifacts.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod artifacts;
pub mod builder;
pub mod mapping;

pub use artifacts::{ArtifactError, ArtifactSet, ArtifactStore};
pub use builder::{GraphBuilder, NullPolicy};
pub use mapping::{IdMapping, MappingError};

/// Errors raised while constructing the graph from raw data
#[derive(Debug, Error)]
pub enum GraphBuildError {
    #[error("No interaction documents found in {0}")]
    EmptyInput(String),
    #[error("No interactions survived the feature join")]
    EmptyJoin,
    #[error("Identifier {0} has no index in its mapping")]
    UnmappedId(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed interaction document {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Malformed feature source: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Structural defects of a [`HeteroGraph`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("track_to_playlist has {src} sources but {dst} destinations")]
    RaggedEdges { src: usize, dst: usize },
    #[error("playlist_to_track is not the inverse of track_to_playlist")]
    BrokenInverse,
    #[error("track index {index} out of range {len}")]
    TrackOutOfRange { index: usize, len: usize },
    #[error("playlist index {index} out of range {len}")]
    PlaylistOutOfRange { index: usize, len: usize },
}

/// A directed edge list stored as two parallel index arrays
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeIndex {
    pub src: Vec<usize>,
    pub dst: Vec<usize>,
}

impl EdgeIndex {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let (src, dst) = pairs.into_iter().unzip();
        Self { src, dst }
    }

    pub fn len(&self) -> usize {
        self.src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    /// Same endpoint pairs in reverse direction
    pub fn flipped(&self) -> Self {
        Self {
            src: self.dst.clone(),
            dst: self.src.clone(),
        }
    }

    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.src.iter().copied().zip(self.dst.iter().copied())
    }
}

/// Canonical bipartite graph: track features, playlist count, two inverse relations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeteroGraph {
    /// `num_tracks × F`, row `i` belongs to track index `i`
    pub track_features: Array2<f32>,
    pub num_playlists: usize,
    /// track → playlist
    pub track_to_playlist: EdgeIndex,
    /// playlist → track, always the flip of `track_to_playlist`
    pub playlist_to_track: EdgeIndex,
}

impl HeteroGraph {
    pub fn new(track_features: Array2<f32>, num_playlists: usize, edges: EdgeIndex) -> Self {
        let playlist_to_track = edges.flipped();
        Self {
            track_features,
            num_playlists,
            track_to_playlist: edges,
            playlist_to_track,
        }
    }

    pub fn num_tracks(&self) -> usize {
        self.track_features.nrows()
    }

    pub fn num_track_features(&self) -> usize {
        self.track_features.ncols()
    }

    /// Same node sets, different message-passing edges
    pub fn with_edges(&self, edges: EdgeIndex) -> Self {
        Self::new(self.track_features.clone(), self.num_playlists, edges)
    }

    /// Checks index ranges and that the two relations mirror each other
    pub fn validate(&self) -> Result<(), GraphError> {
        let t2p = &self.track_to_playlist;
        if t2p.src.len() != t2p.dst.len() {
            return Err(GraphError::RaggedEdges {
                src: t2p.src.len(),
                dst: t2p.dst.len(),
            });
        }
        if self.playlist_to_track != t2p.flipped() {
            return Err(GraphError::BrokenInverse);
        }
        if let Some(&index) = t2p.src.iter().find(|&&t| t >= self.num_tracks()) {
            return Err(GraphError::TrackOutOfRange {
                index,
                len: self.num_tracks(),
            });
        }
        if let Some(&index) = t2p.dst.iter().find(|&&p| p >= self.num_playlists) {
            return Err(GraphError::PlaylistOutOfRange {
                index,
                len: self.num_playlists,
            });
        }
        Ok(())
    }
}
