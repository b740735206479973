#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

use playlist_gnn::config::TrainingConfig;
use playlist_gnn::graph::{ArtifactStore, GraphBuilder};
use playlist_gnn::training::Trainer;

pub const NUM_TRACKS: usize = 20;
pub const NUM_PLAYLISTS: usize = 8;
pub const TRACKS_PER_PLAYLIST: usize = 6;

const FEATURE_HEADER: &str = ",track_id,artists,album_name,track_name,popularity,duration_ms,explicit,danceability,energy,key,loudness,mode,speechiness,acousticness,instrumentalness,liveness,valence,tempo,time_signature,track_genre";

pub fn pid(playlist: usize) -> i64 {
    1000 + playlist as i64
}

pub fn track_id(track: usize) -> String {
    format!("t{:02}", track)
}

pub fn tracks_of(playlist: usize) -> Vec<usize> {
    (0..TRACKS_PER_PLAYLIST)
        .map(|j| (playlist * 3 + j) % NUM_TRACKS)
        .collect()
}

/// Writes one playlist document plus a feature CSV; returns `(data_dir, features_path)`
pub fn write_raw_data(root: &Path) -> (PathBuf, PathBuf) {
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let playlists: Vec<_> = (0..NUM_PLAYLISTS)
        .map(|p| {
            let tracks: Vec<_> = tracks_of(p)
                .into_iter()
                .map(|t| {
                    json!({
                        "track_uri": format!("spotify:track:{}", track_id(t)),
                        "track_name": format!("Song {}", t),
                        "artist_name": format!("Artist {}", t % 7),
                        "album_name": "Album",
                        "duration_ms": 180000 + t as u64,
                    })
                })
                .collect();
            json!({ "pid": pid(p), "name": format!("mix {}", p), "tracks": tracks })
        })
        .collect();
    fs::write(
        data_dir.join("mpd.slice.0-999.json"),
        serde_json::to_string(&json!({ "playlists": playlists })).unwrap(),
    )
    .unwrap();

    let mut csv = String::from(FEATURE_HEADER);
    csv.push('\n');
    for t in 0..NUM_TRACKS {
        let x = t as f32 / NUM_TRACKS as f32;
        csv.push_str(&format!(
            "{t},{id},Artist {a},Album,Song {t},{pop},180000,False,{x:.3},{e:.3},1,-6.5,1,0.05,{ac:.3},0.0,0.1,{x:.3},{tempo:.1},4,pop\n",
            t = t,
            id = track_id(t),
            a = t % 7,
            pop = 40 + t,
            x = x,
            e = 1.0 - x,
            ac = x / 2.0,
            tempo = 90.0 + t as f32,
        ));
    }
    let features_path = root.join("features.csv");
    fs::write(&features_path, csv).unwrap();

    (data_dir, features_path)
}

pub fn small_training_config() -> TrainingConfig {
    TrainingConfig {
        hidden_channels: 8,
        epochs: 3,
        ..TrainingConfig::default()
    }
}

/// Runs processing and a short training run; returns the artifact store
pub fn build_artifacts(root: &Path) -> ArtifactStore {
    let (data_dir, features_path) = write_raw_data(root);
    let store = ArtifactStore::new(root.join("artifacts"));

    GraphBuilder::default()
        .process(&data_dir, &features_path, &store)
        .unwrap();
    Trainer::new(small_training_config()).run(&store).unwrap();
    store
}
