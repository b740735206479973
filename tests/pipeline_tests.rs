mod common;

use std::collections::HashSet;

use tempfile::TempDir;

use common::{build_artifacts, pid, track_id, tracks_of, NUM_PLAYLISTS, NUM_TRACKS};
use playlist_gnn::graph::artifacts::{REPORT_FILE, WEIGHTS_FILE};
use playlist_gnn::graph::ArtifactStore;
use playlist_gnn::services::{LoadError, RecommendError, RecommendationEngine};
use playlist_gnn::training::TrainingReport;

#[test]
fn test_process_persists_consistent_artifacts() {
    let dir = TempDir::new().unwrap();
    let store = build_artifacts(dir.path());
    let set = store.load_set().unwrap();

    assert_eq!(set.graph.num_tracks(), NUM_TRACKS);
    assert_eq!(set.graph.num_playlists, NUM_PLAYLISTS);
    assert_eq!(set.track_mapping.len(), NUM_TRACKS);
    assert_eq!(set.track_mapping.id_of(0), Some(track_id(0).as_str()));
    assert_eq!(set.playlist_mapping.index_of(&pid(0).to_string()), Some(0));
    assert_eq!(set.graph.playlist_to_track, set.graph.track_to_playlist.flipped());
    assert!(set.graph.validate().is_ok());

    let report: TrainingReport = store.read_json(REPORT_FILE).unwrap();
    assert_eq!(report.epochs.len(), 3);
    assert!(report.epochs.iter().all(|e| e.loss.is_finite()));
    assert!(store.path(WEIGHTS_FILE).exists());
}

#[test]
fn test_recommendations_exclude_playlist_tracks() {
    let dir = TempDir::new().unwrap();
    let store = build_artifacts(dir.path());
    let engine = RecommendationEngine::initialize(store.root()).unwrap();

    for playlist in 0..NUM_PLAYLISTS {
        let recs = engine.recommend(pid(playlist), 5).unwrap();
        assert_eq!(recs.len(), 5);

        let owned: HashSet<String> = tracks_of(playlist)
            .into_iter()
            .map(|t| format!("Song {}", t))
            .collect();
        for rec in &recs {
            assert!(
                !owned.contains(&rec.track_name),
                "{} is already in the playlist",
                rec.track_name
            );
        }

        let unique: HashSet<_> = recs.iter().collect();
        assert_eq!(unique.len(), recs.len());
    }

    // Only NUM_TRACKS - 6 candidates remain
    let all = engine.recommend(pid(0), 500).unwrap();
    assert_eq!(all.len(), NUM_TRACKS - tracks_of(0).len());
    assert_eq!(engine.recommend(pid(0), 7).unwrap(), engine.recommend(pid(0), 7).unwrap());
}

#[test]
fn test_unknown_playlist_fails() {
    let dir = TempDir::new().unwrap();
    let store = build_artifacts(dir.path());
    let engine = RecommendationEngine::initialize(store.root()).unwrap();

    assert_eq!(
        engine.recommend(-1, 5).unwrap_err(),
        RecommendError::PlaylistNotFound(-1)
    );
}

#[test]
fn test_initialize_without_weights_fails() {
    let dir = TempDir::new().unwrap();
    let store = build_artifacts(dir.path());
    std::fs::remove_file(store.path(WEIGHTS_FILE)).unwrap();

    let err = RecommendationEngine::initialize(store.root()).unwrap_err();
    assert!(matches!(err, LoadError::Artifact(_)));
}

#[test]
fn test_initialize_from_empty_dir_fails() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path().join("missing"));
    assert!(RecommendationEngine::initialize(store.root()).is_err());
}
