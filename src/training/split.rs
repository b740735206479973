use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use thiserror::Error;

use crate::config::TrainingConfig;
use crate::graph::{EdgeIndex, HeteroGraph};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error(
        "{edges} edges leave no training edges at val_ratio={val_ratio}, test_ratio={test_ratio}"
    )]
    NoTrainingEdges {
        edges: usize,
        val_ratio: String,
        test_ratio: String,
    },
}

/// (track, playlist) pairs with binary labels: 1 = interaction, 0 = sampled negative
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledEdges {
    pub tracks: Vec<usize>,
    pub playlists: Vec<usize>,
    pub labels: Vec<f32>,
}

impl LabeledEdges {
    fn push(&mut self, track: usize, playlist: usize, label: f32) {
        self.tracks.push(track);
        self.playlists.push(playlist);
        self.labels.push(label);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l > 0.5).count()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.tracks.iter().copied().zip(self.playlists.iter().copied())
    }
}

/// Message-passing graph plus the labeled edges supervised on it
#[derive(Debug, Clone)]
pub struct Partition {
    pub graph: HeteroGraph,
    pub supervision: LabeledEdges,
}

#[derive(Debug, Clone)]
pub struct LinkSplit {
    pub train: Partition,
    pub val: Partition,
    pub test: Partition,
}

/// Splits the track→playlist relation into train/validation/test partitions
///
/// Edges are shuffled; the tail goes to test, the slice before it to validation.
/// A `disjoint_train_ratio` share of the training edges is supervision-only and
/// absent from training message passing. Validation passes messages over all
/// training edges, test over training and validation edges. Each partition gets
/// `round(neg_sampling_ratio × positives)` negatives that are not edges anywhere
/// in the full graph.
pub fn random_link_split<R: Rng>(
    graph: &HeteroGraph,
    config: &TrainingConfig,
    rng: &mut R,
) -> Result<LinkSplit, SplitError> {
    let mut edges: Vec<(usize, usize)> = graph.track_to_playlist.pairs().collect();
    let total = edges.len();
    edges.shuffle(rng);

    let num_val = (config.val_ratio * total as f64).floor() as usize;
    let num_test = (config.test_ratio * total as f64).floor() as usize;
    let num_train = total.saturating_sub(num_val + num_test);
    if num_train == 0 {
        return Err(SplitError::NoTrainingEdges {
            edges: total,
            val_ratio: config.val_ratio.to_string(),
            test_ratio: config.test_ratio.to_string(),
        });
    }

    let (train_edges, rest) = edges.split_at(num_train);
    let (val_edges, test_edges) = rest.split_at(num_val);

    let num_disjoint = (config.disjoint_train_ratio * num_train as f64).floor() as usize;
    let (train_supervision, train_message) = if num_disjoint > 0 && num_disjoint < num_train {
        (&train_edges[..num_disjoint], &train_edges[num_disjoint..])
    } else {
        // No disjoint share: supervision edges also carry messages
        (train_edges, train_edges)
    };

    let known: HashSet<(usize, usize)> = graph.track_to_playlist.pairs().collect();
    let mut sampler = NegativeSampler {
        known: &known,
        num_tracks: graph.num_tracks(),
        num_playlists: graph.num_playlists,
        ratio: config.neg_sampling_ratio,
    };

    let train = Partition {
        graph: graph.with_edges(EdgeIndex::from_pairs(train_message.iter().copied())),
        supervision: sampler.label(train_supervision, rng),
    };
    let val = Partition {
        graph: graph.with_edges(EdgeIndex::from_pairs(train_edges.iter().copied())),
        supervision: sampler.label(val_edges, rng),
    };
    let test = Partition {
        graph: graph.with_edges(EdgeIndex::from_pairs(
            train_edges.iter().chain(val_edges).copied(),
        )),
        supervision: sampler.label(test_edges, rng),
    };

    tracing::info!(
        train_message = train.graph.track_to_playlist.len(),
        train_supervision = train.supervision.len(),
        val_supervision = val.supervision.len(),
        test_supervision = test.supervision.len(),
        "Link split created"
    );

    Ok(LinkSplit { train, val, test })
}

struct NegativeSampler<'a> {
    known: &'a HashSet<(usize, usize)>,
    num_tracks: usize,
    num_playlists: usize,
    ratio: f64,
}

impl NegativeSampler<'_> {
    /// Positives labeled 1 followed by uniformly sampled non-edges labeled 0
    fn label<R: Rng>(&mut self, positives: &[(usize, usize)], rng: &mut R) -> LabeledEdges {
        let mut labeled = LabeledEdges::default();
        for &(t, p) in positives {
            labeled.push(t, p, 1.0);
        }

        let wanted = (self.ratio * positives.len() as f64).round() as usize;
        if wanted == 0 || self.num_tracks == 0 || self.num_playlists == 0 {
            return labeled;
        }

        // Bounded so a near-complete graph cannot spin forever
        let max_attempts = wanted * 10 + 100;
        let mut sampled = 0;
        let mut attempts = 0;
        while sampled < wanted && attempts < max_attempts {
            attempts += 1;
            let pair = (
                rng.random_range(0..self.num_tracks),
                rng.random_range(0..self.num_playlists),
            );
            if !self.known.contains(&pair) {
                labeled.push(pair.0, pair.1, 0.0);
                sampled += 1;
            }
        }

        if sampled < wanted {
            tracing::warn!(wanted, sampled, "Negative sampling fell short");
        }
        labeled
    }
}
