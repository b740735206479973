use serde::{Deserialize, Serialize};

/// Audio descriptors projected into the track feature matrix, in column order
pub const FEATURE_COLUMNS: [&str; 10] = [
    "danceability",
    "energy",
    "loudness",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
    "popularity",
];

/// Width of a track feature vector
pub const NUM_TRACK_FEATURES: usize = FEATURE_COLUMNS.len();

// ============================================================================
// Raw Interaction Documents
// ============================================================================

/// One raw interaction document (a slice of playlists)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub playlists: Vec<RawPlaylist>,
}

/// A playlist as it appears in a raw document, with its embedded track references
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlaylist {
    #[serde(default)]
    pub pid: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tracks: Vec<RawTrackRef>,
}

/// A track reference embedded in a raw playlist
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrackRef {
    /// Namespaced reference, e.g. `spotify:track:4uLU6hMCjMI75M1A2tKUQC`
    #[serde(default)]
    pub track_uri: Option<String>,
    #[serde(default)]
    pub track_name: Option<String>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub album_name: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

/// One (playlist, track reference) pair after flattening the nested documents
#[derive(Debug, Clone)]
pub struct FlatInteraction {
    pub pid: Option<i64>,
    pub playlist_name: Option<String>,
    /// Bare external track identifier (namespacing stripped)
    pub track_id: Option<String>,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub duration_ms: Option<u64>,
}

impl FlatInteraction {
    pub fn new(pid: Option<i64>, playlist_name: Option<String>, track: RawTrackRef) -> Self {
        Self {
            pid,
            playlist_name,
            track_id: track.track_uri.as_deref().map(normalize_track_id),
            track_name: track.track_name,
            artist_name: track.artist_name,
            album_name: track.album_name,
            duration_ms: track.duration_ms,
        }
    }
}

/// Strips any namespacing prefix from a track reference (`spotify:track:abc` -> `abc`)
pub fn normalize_track_id(reference: &str) -> String {
    reference
        .rsplit(':')
        .next()
        .unwrap_or(reference)
        .to_string()
}

// ============================================================================
// Feature Source
// ============================================================================

/// One row of the tabular feature source, keyed by `track_id`
///
/// Every column is optional; an empty cell deserializes to `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureRecord {
    pub track_id: Option<String>,
    pub artists: Option<String>,
    pub album_name: Option<String>,
    pub track_name: Option<String>,
    pub popularity: Option<f32>,
    pub duration_ms: Option<f64>,
    pub explicit: Option<String>,
    pub danceability: Option<f32>,
    pub energy: Option<f32>,
    pub key: Option<f32>,
    pub loudness: Option<f32>,
    pub mode: Option<f32>,
    pub speechiness: Option<f32>,
    pub acousticness: Option<f32>,
    pub instrumentalness: Option<f32>,
    pub liveness: Option<f32>,
    pub valence: Option<f32>,
    pub tempo: Option<f32>,
    pub time_signature: Option<f32>,
    pub track_genre: Option<String>,
}

// ============================================================================
// Cleaned Interaction Table
// ============================================================================

/// A fully enriched interaction row: every field present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedInteraction {
    pub pid: i64,
    pub playlist_name: String,
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    pub duration_ms: u64,
    pub artists: String,
    pub feature_album_name: String,
    pub feature_track_name: String,
    pub popularity: f32,
    pub explicit: String,
    pub danceability: f32,
    pub energy: f32,
    pub key: f32,
    pub loudness: f32,
    pub mode: f32,
    pub speechiness: f32,
    pub acousticness: f32,
    pub instrumentalness: f32,
    pub liveness: f32,
    pub valence: f32,
    pub tempo: f32,
    pub time_signature: f32,
    pub track_genre: String,
}

fn finite(value: Option<f32>) -> Option<f32> {
    value.filter(|v| v.is_finite())
}

impl CleanedInteraction {
    /// Joins a flattened interaction with one feature row.
    ///
    /// Returns `None` if any field of either side is missing. A `NaN` or
    /// infinite feature counts as missing.
    pub fn join(row: &FlatInteraction, features: &FeatureRecord) -> Option<Self> {
        Some(Self {
            pid: row.pid?,
            playlist_name: row.playlist_name.clone()?,
            track_id: row.track_id.clone()?,
            track_name: row.track_name.clone()?,
            artist_name: row.artist_name.clone()?,
            album_name: row.album_name.clone()?,
            duration_ms: row.duration_ms?,
            artists: features.artists.clone()?,
            feature_album_name: features.album_name.clone()?,
            feature_track_name: features.track_name.clone()?,
            popularity: finite(features.popularity)?,
            explicit: features.explicit.clone()?,
            danceability: finite(features.danceability)?,
            energy: finite(features.energy)?,
            key: finite(features.key)?,
            loudness: finite(features.loudness)?,
            mode: finite(features.mode)?,
            speechiness: finite(features.speechiness)?,
            acousticness: finite(features.acousticness)?,
            instrumentalness: finite(features.instrumentalness)?,
            liveness: finite(features.liveness)?,
            valence: finite(features.valence)?,
            tempo: finite(features.tempo)?,
            time_signature: finite(features.time_signature)?,
            track_genre: features.track_genre.clone()?,
        })
    }

    /// Projects the row onto [`FEATURE_COLUMNS`]
    pub fn feature_vector(&self) -> [f32; NUM_TRACK_FEATURES] {
        [
            self.danceability,
            self.energy,
            self.loudness,
            self.speechiness,
            self.acousticness,
            self.instrumentalness,
            self.liveness,
            self.valence,
            self.tempo,
            self.popularity,
        ]
    }

    /// Display metadata shown to clients
    pub fn display(&self) -> Recommendation {
        Recommendation {
            track_name: self.track_name.clone(),
            artist: self.artists.clone(),
        }
    }
}

// ============================================================================
// Recommendation Output
// ============================================================================

/// A recommended track as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recommendation {
    pub track_name: String,
    pub artist: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_track_id_strips_namespace() {
        assert_eq!(
            normalize_track_id("spotify:track:4uLU6hMCjMI75M1A2tKUQC"),
            "4uLU6hMCjMI75M1A2tKUQC"
        );
    }

    #[test]
    fn test_normalize_track_id_bare_passthrough() {
        assert_eq!(normalize_track_id("abc123"), "abc123");
    }

    #[test]
    fn test_raw_document_tolerates_missing_fields() {
        let doc: RawDocument = serde_json::from_str(
            r#"{"info": {}, "playlists": [{"pid": 7, "tracks": [{"track_uri": "spotify:track:x"}]}]}"#,
        )
        .unwrap();

        assert_eq!(doc.playlists.len(), 1);
        assert_eq!(doc.playlists[0].pid, Some(7));
        assert_eq!(doc.playlists[0].name, None);
        assert_eq!(doc.playlists[0].tracks[0].track_uri.as_deref(), Some("spotify:track:x"));
    }

    #[test]
    fn test_join_drops_on_any_missing_field() {
        let row = FlatInteraction {
            pid: Some(1),
            playlist_name: Some("chill".to_string()),
            track_id: Some("t1".to_string()),
            track_name: Some("Song".to_string()),
            artist_name: Some("Band".to_string()),
            album_name: Some("Album".to_string()),
            duration_ms: Some(1000),
        };
        let mut features = FeatureRecord {
            track_id: Some("t1".to_string()),
            artists: Some("Band".to_string()),
            album_name: Some("Album".to_string()),
            track_name: Some("Song".to_string()),
            popularity: Some(50.0),
            duration_ms: Some(1000.0),
            explicit: Some("False".to_string()),
            danceability: Some(0.5),
            energy: Some(0.5),
            key: Some(1.0),
            loudness: Some(-5.0),
            mode: Some(1.0),
            speechiness: Some(0.1),
            acousticness: Some(0.2),
            instrumentalness: Some(0.0),
            liveness: Some(0.1),
            valence: Some(0.7),
            tempo: Some(120.0),
            time_signature: Some(4.0),
            track_genre: Some("pop".to_string()),
        };

        let joined = CleanedInteraction::join(&row, &features).unwrap();
        assert_eq!(joined.feature_vector()[8], 120.0);
        assert_eq!(joined.feature_vector()[9], 50.0);

        features.valence = None;
        assert!(CleanedInteraction::join(&row, &features).is_none());
    }
}
