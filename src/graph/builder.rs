use ndarray::Array2;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::graph::{
    ArtifactSet, ArtifactStore, EdgeIndex, GraphBuildError, HeteroGraph, IdMapping,
};
use crate::models::{
    CleanedInteraction, FeatureRecord, FlatInteraction, RawDocument, NUM_TRACK_FEATURES,
};

/// How rows with missing fields are handled during the feature join
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NullPolicy {
    /// An interaction is either fully enriched or discarded
    #[default]
    DropRow,
}

/// Builds the canonical bipartite graph from raw playlist documents and a feature table
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    null_policy: NullPolicy,
}

impl GraphBuilder {
    pub fn new(null_policy: NullPolicy) -> Self {
        Self { null_policy }
    }

    /// Builds from raw inputs and persists the result as one artifact set
    pub fn process(
        &self,
        data_dir: &Path,
        features_path: &Path,
        store: &ArtifactStore,
    ) -> Result<ArtifactSet, GraphBuildError> {
        let set = self.build_from_paths(data_dir, features_path)?;
        store.save_set(&set)?;
        Ok(set)
    }

    /// Reads every `*.json` document in `data_dir` and the feature CSV, then builds
    pub fn build_from_paths(
        &self,
        data_dir: &Path,
        features_path: &Path,
    ) -> Result<ArtifactSet, GraphBuildError> {
        let start = Instant::now();

        let rows = read_interactions(data_dir)?;
        if rows.is_empty() {
            return Err(GraphBuildError::EmptyInput(data_dir.display().to_string()));
        }
        let features = read_features(features_path)?;

        tracing::info!(
            interactions = rows.len(),
            feature_rows = features.len(),
            "Raw data loaded"
        );

        let set = self.build(rows, features)?;

        tracing::info!(
            processing_time_ms = start.elapsed().as_millis(),
            "Graph construction completed"
        );
        Ok(set)
    }

    /// Joins, cleans, indexes and assembles the graph from in-memory records
    pub fn build(
        &self,
        rows: Vec<FlatInteraction>,
        features: Vec<FeatureRecord>,
    ) -> Result<ArtifactSet, GraphBuildError> {
        if rows.is_empty() {
            return Err(GraphBuildError::EmptyInput("<memory>".to_string()));
        }

        let interactions = self.join(&rows, features);
        if interactions.is_empty() {
            return Err(GraphBuildError::EmptyJoin);
        }

        // Indices come from surviving rows only, in sorted id order
        let track_ids: BTreeSet<&str> = interactions.iter().map(|r| r.track_id.as_str()).collect();
        let pids: BTreeSet<i64> = interactions.iter().map(|r| r.pid).collect();
        let track_mapping = IdMapping::from_ordered(track_ids);
        let playlist_mapping = IdMapping::from_ordered(pids.iter().map(i64::to_string));

        let track_features = feature_matrix(&interactions, &track_mapping);

        let mut seen = HashSet::new();
        let mut pairs = Vec::new();
        for row in &interactions {
            let pair = (
                mapped_index(&track_mapping, &row.track_id)?,
                mapped_index(&playlist_mapping, &row.pid.to_string())?,
            );
            if seen.insert(pair) {
                pairs.push(pair);
            }
        }
        let graph = HeteroGraph::new(
            track_features,
            playlist_mapping.len(),
            EdgeIndex::from_pairs(pairs),
        );

        tracing::info!(
            tracks = track_mapping.len(),
            playlists = playlist_mapping.len(),
            edges = graph.track_to_playlist.len(),
            "Graph built"
        );

        Ok(ArtifactSet {
            graph,
            track_mapping,
            playlist_mapping,
            interactions,
        })
    }

    /// Left join on track id followed by the null policy
    fn join(
        &self,
        rows: &[FlatInteraction],
        features: Vec<FeatureRecord>,
    ) -> Vec<CleanedInteraction> {
        let mut by_track: HashMap<String, Vec<FeatureRecord>> = HashMap::new();
        for record in features {
            if let Some(id) = record.track_id.clone() {
                by_track.entry(id).or_default().push(record);
            }
        }

        let mut cleaned = Vec::new();
        let mut unmatched = 0usize;
        let mut incomplete = 0usize;

        for row in rows {
            let matches = row.track_id.as_ref().and_then(|id| by_track.get(id));
            let Some(matches) = matches else {
                unmatched += 1;
                continue;
            };
            for record in matches {
                match (self.null_policy, CleanedInteraction::join(row, record)) {
                    (NullPolicy::DropRow, Some(joined)) => cleaned.push(joined),
                    (NullPolicy::DropRow, None) => incomplete += 1,
                }
            }
        }

        if unmatched + incomplete > 0 {
            tracing::warn!(
                unmatched,
                incomplete,
                kept = cleaned.len(),
                "Dropped interactions during feature join"
            );
        }

        cleaned
    }
}

fn mapped_index(mapping: &IdMapping, id: &str) -> Result<usize, GraphBuildError> {
    mapping
        .index_of(id)
        .ok_or_else(|| GraphBuildError::UnmappedId(id.to_string()))
}

/// One row per mapped track, taken from its first occurrence in the cleaned table
fn feature_matrix(interactions: &[CleanedInteraction], mapping: &IdMapping) -> Array2<f32> {
    let mut first: HashMap<&str, [f32; NUM_TRACK_FEATURES]> = HashMap::new();
    for row in interactions {
        first.entry(row.track_id.as_str()).or_insert_with(|| row.feature_vector());
    }

    let mut matrix = Array2::zeros((mapping.len(), NUM_TRACK_FEATURES));
    for (i, id) in mapping.ids().iter().enumerate() {
        if let Some(values) = first.get(id.as_str()) {
            for (j, v) in values.iter().enumerate() {
                matrix[[i, j]] = *v;
            }
        }
    }
    matrix
}

/// Flattens all `*.json` documents in `dir` (sorted by file name) into one row per
/// (playlist, track reference)
pub fn read_interactions(dir: &Path) -> Result<Vec<FlatInteraction>, GraphBuildError> {
    let entries = fs::read_dir(dir).map_err(|source| GraphBuildError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(GraphBuildError::EmptyInput(dir.display().to_string()));
    }

    let mut rows = Vec::new();
    for path in &files {
        let text = fs::read_to_string(path).map_err(|source| GraphBuildError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let document: RawDocument =
            serde_json::from_str(&text).map_err(|source| GraphBuildError::Json {
                path: path.display().to_string(),
                source,
            })?;

        let before = rows.len();
        for playlist in document.playlists {
            for track in playlist.tracks {
                rows.push(FlatInteraction::new(playlist.pid, playlist.name.clone(), track));
            }
        }
        tracing::debug!(file = %path.display(), rows = rows.len() - before, "Document flattened");
    }

    Ok(rows)
}

/// Reads the feature CSV; columns are matched by header name
pub fn read_features(path: &Path) -> Result<Vec<FeatureRecord>, GraphBuildError> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader.deserialize().collect::<Result<Vec<FeatureRecord>, _>>()?;
    Ok(records)
}
