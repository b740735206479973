use chrono::{DateTime, Utc};
use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

use super::metrics::{roc_auc, sigmoid, EvaluationError};
use super::split::{random_link_split, LabeledEdges, Partition, SplitError};
use crate::config::TrainingConfig;
use crate::gnn::{Adam, EmbeddingSnapshot, HeteroSage};
use crate::graph::artifacts::{REPORT_FILE, WEIGHTS_FILE};
use crate::graph::{ArtifactError, ArtifactStore, GraphError, HeteroGraph};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Invalid graph: {0}")]
    InvalidGraph(#[from] GraphError),
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("Loss diverged at epoch {0}")]
    NonFiniteLoss(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    /// `None` when the partition holds a single label class
    pub val_auc: Option<f64>,
    pub test_auc: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub config: TrainingConfig,
    pub epochs: Vec<EpochMetrics>,
    pub completed_at: DateTime<Utc>,
}

impl TrainingReport {
    pub fn final_epoch(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }
}

/// Full-batch link-prediction training of [`HeteroSage`]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Splits the graph once, then runs `epochs` optimizer steps
    ///
    /// Deterministic for a given seed.
    pub fn train(&self, graph: &HeteroGraph) -> Result<(HeteroSage, TrainingReport), TrainError> {
        graph.validate()?;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let split = random_link_split(graph, &self.config, &mut rng)?;

        let mut model = HeteroSage::new(
            self.config.hidden_channels,
            graph.num_playlists,
            graph.num_track_features(),
            &mut rng,
        );
        let mut optimizer = Adam::new(self.config.learning_rate);
        let mut epochs = Vec::with_capacity(self.config.epochs);
        let start = Instant::now();

        for epoch in 1..=self.config.epochs {
            let loss = train_step(&mut model, &mut optimizer, &split.train);
            if !loss.is_finite() {
                return Err(TrainError::NonFiniteLoss(epoch));
            }

            let val_auc = report_auc("val", epoch, evaluate(&model, &split.val));
            let test_auc = report_auc("test", epoch, evaluate(&model, &split.test));

            tracing::info!(
                "Epoch: {:03}, Loss: {:.4}, Val AUC: {}, Test AUC: {}",
                epoch,
                loss,
                format_auc(val_auc),
                format_auc(test_auc)
            );
            epochs.push(EpochMetrics {
                epoch,
                loss,
                val_auc,
                test_auc,
            });
        }

        tracing::info!(
            epochs = self.config.epochs,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Training finished"
        );

        let report = TrainingReport {
            config: self.config.clone(),
            epochs,
            completed_at: Utc::now(),
        };
        Ok((model, report))
    }

    /// Trains on the stored graph and persists the weights and report next to it
    pub fn run(&self, store: &ArtifactStore) -> Result<TrainingReport, TrainError> {
        let graph = store.load_graph()?;
        let (model, report) = self.train(&graph)?;
        store.write_json(WEIGHTS_FILE, &model)?;
        store.write_json(REPORT_FILE, &report)?;
        tracing::info!(dir = %store.root().display(), "Model weights saved");
        Ok(report)
    }
}

/// One full-batch step; returns the loss before the update
fn train_step(model: &mut HeteroSage, optimizer: &mut Adam, partition: &Partition) -> f32 {
    let (snapshot, cache) = model.forward_with_cache(&partition.graph);
    let supervision = &partition.supervision;
    if supervision.is_empty() {
        return 0.0;
    }

    let logits = decode(&snapshot, supervision);
    let n = supervision.len() as f32;
    let loss = logits
        .iter()
        .zip(&supervision.labels)
        .map(|(&z, &y)| bce_with_logits(z, y))
        .sum::<f32>()
        / n;

    let mut grad_tracks = Array2::<f32>::zeros(snapshot.tracks.raw_dim());
    let mut grad_playlists = Array2::<f32>::zeros(snapshot.playlists.raw_dim());
    for (((&z, &y), &t), &p) in logits
        .iter()
        .zip(&supervision.labels)
        .zip(&supervision.tracks)
        .zip(&supervision.playlists)
    {
        let d = (sigmoid(z) - y) / n;
        grad_tracks.row_mut(t).scaled_add(d, &snapshot.playlists.row(p));
        grad_playlists.row_mut(p).scaled_add(d, &snapshot.tracks.row(t));
    }

    let grads = model.backward(&partition.graph, &cache, &grad_tracks, &grad_playlists);
    model.apply_gradients(&grads, optimizer);
    loss
}

fn evaluate(model: &HeteroSage, partition: &Partition) -> Result<f64, EvaluationError> {
    let snapshot = model.forward(&partition.graph);
    let probs: Vec<f32> = decode(&snapshot, &partition.supervision)
        .into_iter()
        .map(sigmoid)
        .collect();
    roc_auc(&probs, &partition.supervision.labels)
}

fn decode(snapshot: &EmbeddingSnapshot, edges: &LabeledEdges) -> Vec<f32> {
    edges.pairs().map(|(t, p)| snapshot.decode(t, p)).collect()
}

/// Numerically stable binary cross-entropy on a raw logit
fn bce_with_logits(z: f32, y: f32) -> f32 {
    z.max(0.0) - z * y + (-z.abs()).exp().ln_1p()
}

fn report_auc(partition: &str, epoch: usize, result: Result<f64, EvaluationError>) -> Option<f64> {
    match result {
        Ok(auc) => Some(auc),
        Err(e) => {
            tracing::warn!(partition, epoch, error = %e, "AUC unavailable");
            None
        }
    }
}

fn format_auc(auc: Option<f64>) -> String {
    auc.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeIndex;
    use ndarray::array;
    use tempfile::TempDir;

    /// Two communities: tracks 0..6 with feature [1, 0] in playlists 0..3,
    /// tracks 6..12 with feature [0, 1] in playlists 3..6
    fn community_graph() -> HeteroGraph {
        let mut features = Array2::<f32>::zeros((12, 2));
        let mut pairs = Vec::new();
        for t in 0..12 {
            let community = t / 6;
            features[[t, community]] = 1.0;
            for p in 0..3 {
                if (t + p) % 2 == 0 {
                    pairs.push((t, community * 3 + p));
                }
            }
        }
        HeteroGraph::new(features, 6, EdgeIndex::from_pairs(pairs))
    }

    fn small_config(epochs: usize) -> TrainingConfig {
        TrainingConfig {
            hidden_channels: 8,
            epochs,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_bce_matches_naive_formula() {
        for (z, y) in [(0.3f32, 1.0f32), (-1.2, 0.0), (2.0, 0.0)] {
            let p = sigmoid(z);
            let naive = -(y * p.ln() + (1.0 - y) * (1.0 - p).ln());
            assert!((bce_with_logits(z, y) - naive).abs() < 1e-5);
        }
        assert!(bce_with_logits(-80.0, 1.0).is_finite());
    }

    #[test]
    fn test_training_reduces_loss() {
        let trainer = Trainer::new(small_config(60));
        let (_, report) = trainer.train(&community_graph()).unwrap();

        assert_eq!(report.epochs.len(), 60);
        let first = report.epochs[0].loss;
        let last = report.final_epoch().unwrap().loss;
        assert!(last < first, "loss went from {} to {}", first, last);
        for metrics in &report.epochs {
            if let Some(auc) = metrics.val_auc {
                assert!((0.0..=1.0).contains(&auc));
            }
        }
    }

    #[test]
    fn test_same_seed_same_model() {
        let graph = community_graph();
        let (a, _) = Trainer::new(small_config(5)).train(&graph).unwrap();
        let (b, _) = Trainer::new(small_config(5)).train(&graph).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_graph_is_rejected() {
        let graph = HeteroGraph::new(array![[1.0f32]], 1, EdgeIndex::from_pairs([(0, 4)]));
        let err = Trainer::new(small_config(1)).train(&graph).unwrap_err();
        assert!(matches!(
            err,
            TrainError::InvalidGraph(GraphError::PlaylistOutOfRange { index: 4, len: 1 })
        ));
    }

    #[test]
    fn test_run_persists_weights_and_report() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let graph = community_graph();
        store.write_json(crate::graph::artifacts::GRAPH_FILE, &graph).unwrap();

        let report = Trainer::new(small_config(3)).run(&store).unwrap();
        assert_eq!(report.epochs.len(), 3);

        let model: HeteroSage = store.read_json(WEIGHTS_FILE).unwrap();
        assert!(model.check_compatible(&graph).is_ok());
        let saved: TrainingReport = store.read_json(REPORT_FILE).unwrap();
        assert_eq!(saved.epochs, report.epochs);
    }

    #[test]
    fn test_without_validation_edges_auc_is_null() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.write_json(crate::graph::artifacts::GRAPH_FILE, &community_graph()).unwrap();

        let config = TrainingConfig {
            val_ratio: 0.0,
            ..small_config(4)
        };
        let report = Trainer::new(config).run(&store).unwrap();

        assert_eq!(report.epochs.len(), 4);
        assert!(report.epochs.iter().all(|m| m.val_auc.is_none()));
        assert!(report.epochs.iter().all(|m| m.loss.is_finite()));

        let saved: serde_json::Value = store.read_json(REPORT_FILE).unwrap();
        for epoch in saved["epochs"].as_array().unwrap() {
            assert!(epoch["val_auc"].is_null());
        }
    }
}
