use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::graph::{HeteroGraph, IdMapping};
use crate::models::CleanedInteraction;

pub const GRAPH_FILE: &str = "graph_data.json";
pub const TRACK_MAPPING_FILE: &str = "track_mapping.json";
pub const PLAYLIST_MAPPING_FILE: &str = "playlist_mapping.json";
pub const INTERACTIONS_FILE: &str = "cleaned_interactions.csv";
pub const WEIGHTS_FILE: &str = "model_weights.json";
pub const REPORT_FILE: &str = "training_report.json";

/// Errors reading or writing an artifact file
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Everything the Graph Builder produces and downstream stages consume
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub graph: HeteroGraph,
    pub track_mapping: IdMapping,
    pub playlist_mapping: IdMapping,
    pub interactions: Vec<CleanedInteraction>,
}

/// An artifact directory on local disk
///
/// Files are written under a temporary name and renamed into place, so a reader
/// never sees a half-written artifact.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Persists graph, both mappings, and the cleaned interaction table
    ///
    /// All four files are staged before any is renamed into place, so a failed
    /// write leaves the previous set untouched.
    pub fn save_set(&self, set: &ArtifactSet) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.root).map_err(|source| ArtifactError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut staged = Vec::with_capacity(4);
        if let Err(e) = self.stage_set(set, &mut staged) {
            for (tmp, _) in &staged {
                let _ = fs::remove_file(tmp);
            }
            return Err(e);
        }
        for (tmp, path) in &staged {
            commit(tmp, path)?;
        }

        tracing::info!(
            dir = %self.root.display(),
            tracks = set.track_mapping.len(),
            playlists = set.playlist_mapping.len(),
            interactions = set.interactions.len(),
            "Graph artifacts saved"
        );
        Ok(())
    }

    fn stage_set(&self, set: &ArtifactSet, staged: &mut Vec<Staged>) -> Result<(), ArtifactError> {
        staged.push(self.stage_json(GRAPH_FILE, &set.graph)?);
        staged.push(self.stage_json(TRACK_MAPPING_FILE, &set.track_mapping)?);
        staged.push(self.stage_json(PLAYLIST_MAPPING_FILE, &set.playlist_mapping)?);
        staged.push(self.stage_interactions(&set.interactions)?);
        Ok(())
    }

    pub fn load_set(&self) -> Result<ArtifactSet, ArtifactError> {
        Ok(ArtifactSet {
            graph: self.read_json(GRAPH_FILE)?,
            track_mapping: self.read_json(TRACK_MAPPING_FILE)?,
            playlist_mapping: self.read_json(PLAYLIST_MAPPING_FILE)?,
            interactions: self.read_interactions()?,
        })
    }

    pub fn load_graph(&self) -> Result<HeteroGraph, ArtifactError> {
        self.read_json(GRAPH_FILE)
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), ArtifactError> {
        let (tmp, path) = self.stage_json(name, value)?;
        commit(&tmp, &path)
    }

    fn stage_json<T: Serialize>(&self, name: &str, value: &T) -> Result<Staged, ArtifactError> {
        let path = self.path(name);
        stage(path.clone(), |file| {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, value).map_err(|source| ArtifactError::Json {
                path: path.clone(),
                source,
            })?;
            writer.flush().map_err(|source| ArtifactError::Io {
                path: path.clone(),
                source,
            })
        })
    }

    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArtifactError> {
        let path = self.path(name);
        let file = File::open(&path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ArtifactError::Json { path, source })
    }

    fn stage_interactions(&self, rows: &[CleanedInteraction]) -> Result<Staged, ArtifactError> {
        let path = self.path(INTERACTIONS_FILE);
        stage(path.clone(), |file| {
            let csv_err = |source| ArtifactError::Csv {
                path: path.clone(),
                source,
            };
            let mut writer = csv::Writer::from_writer(file);
            for row in rows {
                writer.serialize(row).map_err(csv_err)?;
            }
            writer.flush().map_err(|source| ArtifactError::Io {
                path: path.clone(),
                source,
            })
        })
    }

    fn read_interactions(&self) -> Result<Vec<CleanedInteraction>, ArtifactError> {
        let path = self.path(INTERACTIONS_FILE);
        let mut reader = csv::Reader::from_path(&path).map_err(|source| ArtifactError::Csv {
            path: path.clone(),
            source,
        })?;
        reader
            .deserialize()
            .collect::<Result<Vec<CleanedInteraction>, _>>()
            .map_err(|source| ArtifactError::Csv { path, source })
    }
}

/// A fully written temporary file and the name it will be renamed to
type Staged = (PathBuf, PathBuf);

fn stage<F>(path: PathBuf, write: F) -> Result<Staged, ArtifactError>
where
    F: FnOnce(File) -> Result<(), ArtifactError>,
{
    let tmp = path.with_extension("tmp");
    let file = File::create(&tmp).map_err(|source| ArtifactError::Io {
        path: tmp.clone(),
        source,
    })?;
    if let Err(e) = write(file) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok((tmp, path))
}

fn commit(tmp: &Path, path: &Path) -> Result<(), ArtifactError> {
    fs::rename(tmp, path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}
