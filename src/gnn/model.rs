use ndarray::{Array1, Array2, ArrayView2, ArrayViewD, ArrayViewMutD};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gnn::optim::Adam;
use crate::gnn::sage::{Linear, SageCache, SageConv};
use crate::graph::HeteroGraph;

/// A stored parameter whose shape does not fit the graph it is used with
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("playlist_embedding is {actual:?}, graph needs {expected:?}")]
    Embedding {
        actual: (usize, usize),
        expected: (usize, usize),
    },
    #[error("{parameter}.weight is {actual:?}, expected {expected:?}")]
    Weight {
        parameter: &'static str,
        actual: (usize, usize),
        expected: (usize, usize),
    },
    #[error("{parameter}.bias has {actual} entries, expected {expected}")]
    Bias {
        parameter: &'static str,
        actual: usize,
        expected: usize,
    },
}

/// One round of message passing over both relations
///
/// Each node type is the destination of exactly one relation, so the per-type
/// sum over relations has a single term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeteroLayer {
    pub track_to_playlist: SageConv,
    pub playlist_to_track: SageConv,
}

#[derive(Debug, Clone)]
struct LayerCache {
    track_to_playlist: SageCache,
    playlist_to_track: SageCache,
}

impl HeteroLayer {
    fn new<R: Rng>(track_dim: usize, playlist_dim: usize, hidden: usize, rng: &mut R) -> Self {
        Self {
            track_to_playlist: SageConv::new(track_dim, playlist_dim, hidden, rng),
            playlist_to_track: SageConv::new(playlist_dim, track_dim, hidden, rng),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            track_to_playlist: self.track_to_playlist.zeros_like(),
            playlist_to_track: self.playlist_to_track.zeros_like(),
        }
    }

    /// Returns `(track_out, playlist_out)`
    fn forward(
        &self,
        x_tracks: &ArrayView2<f32>,
        x_playlists: &ArrayView2<f32>,
        graph: &HeteroGraph,
    ) -> (Array2<f32>, Array2<f32>, LayerCache) {
        let (to_playlists, t2p) = self
            .track_to_playlist
            .forward(x_tracks, x_playlists, &graph.track_to_playlist);
        let (to_tracks, p2t) = self
            .playlist_to_track
            .forward(x_playlists, x_tracks, &graph.playlist_to_track);
        (
            to_tracks,
            to_playlists,
            LayerCache {
                track_to_playlist: t2p,
                playlist_to_track: p2t,
            },
        )
    }

    /// Returns `(grad_x_tracks, grad_x_playlists)`
    #[allow(clippy::too_many_arguments)]
    fn backward(
        &self,
        grad_tracks: &Array2<f32>,
        grad_playlists: &Array2<f32>,
        x_tracks: &ArrayView2<f32>,
        x_playlists: &ArrayView2<f32>,
        graph: &HeteroGraph,
        cache: &LayerCache,
        grads: &mut HeteroLayer,
    ) -> (Array2<f32>, Array2<f32>) {
        let (tracks_as_src, playlists_as_dst) = self.track_to_playlist.backward(
            grad_playlists,
            x_tracks,
            x_playlists,
            &graph.track_to_playlist,
            &cache.track_to_playlist,
            &mut grads.track_to_playlist,
        );
        let (playlists_as_src, tracks_as_dst) = self.playlist_to_track.backward(
            grad_tracks,
            x_playlists,
            x_tracks,
            &graph.playlist_to_track,
            &cache.playlist_to_track,
            &mut grads.playlist_to_track,
        );
        (
            tracks_as_src + tracks_as_dst,
            playlists_as_src + playlists_as_dst,
        )
    }
}

/// Per-node embeddings from one full forward evaluation
///
/// Valid only for the (graph, weights) pair that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSnapshot {
    pub tracks: Array2<f32>,
    pub playlists: Array2<f32>,
}

impl EmbeddingSnapshot {
    /// Dot-product similarity of one (track, playlist) pair
    pub fn decode(&self, track: usize, playlist: usize) -> f32 {
        self.tracks.row(track).dot(&self.playlists.row(playlist))
    }

    /// Similarity of every track against one playlist
    pub fn scores_for_playlist(&self, playlist: usize) -> Array1<f32> {
        self.tracks.dot(&self.playlists.row(playlist))
    }
}

/// Intermediates of a training forward pass
#[derive(Debug, Clone)]
pub struct ForwardCache {
    layer1: LayerCache,
    layer2: LayerCache,
    pre_tracks: Array2<f32>,
    pre_playlists: Array2<f32>,
    hidden_tracks: Array2<f32>,
    hidden_playlists: Array2<f32>,
}

/// Two-layer heterogeneous GraphSAGE over tracks and playlists
///
/// Tracks start from their feature rows, playlists from a learned identity
/// embedding. Serialized field names double as parameter keys in the weight file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeteroSage {
    pub hidden_channels: usize,
    pub playlist_embedding: Array2<f32>,
    pub conv1: HeteroLayer,
    pub conv2: HeteroLayer,
}

impl HeteroSage {
    pub fn new<R: Rng>(
        hidden_channels: usize,
        num_playlists: usize,
        num_track_features: usize,
        rng: &mut R,
    ) -> Self {
        let playlist_embedding: Array2<f32> =
            Array2::from_shape_fn((num_playlists, hidden_channels), |_| rng.sample(StandardNormal));
        Self {
            hidden_channels,
            playlist_embedding,
            conv1: HeteroLayer::new(num_track_features, hidden_channels, hidden_channels, rng),
            conv2: HeteroLayer::new(hidden_channels, hidden_channels, hidden_channels, rng),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            hidden_channels: self.hidden_channels,
            playlist_embedding: Array2::zeros(self.playlist_embedding.raw_dim()),
            conv1: self.conv1.zeros_like(),
            conv2: self.conv2.zeros_like(),
        }
    }

    pub fn forward(&self, graph: &HeteroGraph) -> EmbeddingSnapshot {
        self.forward_with_cache(graph).0
    }

    pub fn forward_with_cache(&self, graph: &HeteroGraph) -> (EmbeddingSnapshot, ForwardCache) {
        let x_tracks = graph.track_features.view();
        let x_playlists = self.playlist_embedding.view();

        let (pre_tracks, pre_playlists, layer1) =
            self.conv1.forward(&x_tracks, &x_playlists, graph);
        let hidden_tracks = pre_tracks.mapv(relu);
        let hidden_playlists = pre_playlists.mapv(relu);

        let (tracks, playlists, layer2) = self
            .conv2
            .forward(&hidden_tracks.view(), &hidden_playlists.view(), graph);

        (
            EmbeddingSnapshot { tracks, playlists },
            ForwardCache {
                layer1,
                layer2,
                pre_tracks,
                pre_playlists,
                hidden_tracks,
                hidden_playlists,
            },
        )
    }

    /// Gradients of all parameters given the gradients of the output embeddings
    pub fn backward(
        &self,
        graph: &HeteroGraph,
        cache: &ForwardCache,
        grad_tracks: &Array2<f32>,
        grad_playlists: &Array2<f32>,
    ) -> HeteroSage {
        let mut grads = self.zeros_like();

        let (grad_hidden_tracks, grad_hidden_playlists) = self.conv2.backward(
            grad_tracks,
            grad_playlists,
            &cache.hidden_tracks.view(),
            &cache.hidden_playlists.view(),
            graph,
            &cache.layer2,
            &mut grads.conv2,
        );

        let grad_pre_tracks = grad_hidden_tracks * cache.pre_tracks.mapv(relu_grad);
        let grad_pre_playlists = grad_hidden_playlists * cache.pre_playlists.mapv(relu_grad);

        let (_, grad_embedding) = self.conv1.backward(
            &grad_pre_tracks,
            &grad_pre_playlists,
            &graph.track_features.view(),
            &self.playlist_embedding.view(),
            graph,
            &cache.layer1,
            &mut grads.conv1,
        );
        grads.playlist_embedding = grad_embedding;

        grads
    }

    /// One optimizer step over every learnable parameter
    pub fn apply_gradients(&mut self, grads: &HeteroSage, optimizer: &mut Adam) {
        optimizer.begin_step();
        self.visit_parameters(grads, |slot, param, grad| optimizer.update(slot, param, grad));
    }

    fn visit_parameters<F>(&mut self, grads: &HeteroSage, mut f: F)
    where
        F: FnMut(usize, ArrayViewMutD<f32>, ArrayViewD<f32>),
    {
        let mut slot = 0;
        f(
            slot,
            self.playlist_embedding.view_mut().into_dyn(),
            grads.playlist_embedding.view().into_dyn(),
        );
        let layers = [
            (&mut self.conv1, &grads.conv1),
            (&mut self.conv2, &grads.conv2),
        ];
        for (layer, layer_grads) in layers {
            for (conv, conv_grads) in [
                (&mut layer.track_to_playlist, &layer_grads.track_to_playlist),
                (&mut layer.playlist_to_track, &layer_grads.playlist_to_track),
            ] {
                for (lin, lin_grads) in [
                    (&mut conv.lin_l, &conv_grads.lin_l),
                    (&mut conv.lin_r, &conv_grads.lin_r),
                ] {
                    slot += 1;
                    f(
                        slot,
                        lin.weight.view_mut().into_dyn(),
                        lin_grads.weight.view().into_dyn(),
                    );
                    if let (Some(bias), Some(bias_grad)) =
                        (lin.bias.as_mut(), lin_grads.bias.as_ref())
                    {
                        slot += 1;
                        f(slot, bias.view_mut().into_dyn(), bias_grad.view().into_dyn());
                    }
                }
            }
        }
    }

    /// Verifies that every parameter shape fits `graph`
    pub fn check_compatible(&self, graph: &HeteroGraph) -> Result<(), ShapeError> {
        let h = self.hidden_channels;
        let f = graph.num_track_features();

        let expected = (graph.num_playlists, h);
        if self.playlist_embedding.dim() != expected {
            return Err(ShapeError::Embedding {
                actual: self.playlist_embedding.dim(),
                expected,
            });
        }

        let conv1 = &self.conv1;
        let conv2 = &self.conv2;
        let linears: [(&'static str, &Linear, usize); 8] = [
            ("conv1.track_to_playlist.lin_l", &conv1.track_to_playlist.lin_l, f),
            ("conv1.track_to_playlist.lin_r", &conv1.track_to_playlist.lin_r, h),
            ("conv1.playlist_to_track.lin_l", &conv1.playlist_to_track.lin_l, h),
            ("conv1.playlist_to_track.lin_r", &conv1.playlist_to_track.lin_r, f),
            ("conv2.track_to_playlist.lin_l", &conv2.track_to_playlist.lin_l, h),
            ("conv2.track_to_playlist.lin_r", &conv2.track_to_playlist.lin_r, h),
            ("conv2.playlist_to_track.lin_l", &conv2.playlist_to_track.lin_l, h),
            ("conv2.playlist_to_track.lin_r", &conv2.playlist_to_track.lin_r, h),
        ];
        for (parameter, lin, in_dim) in linears {
            if lin.in_dim() != in_dim || lin.out_dim() != h {
                return Err(ShapeError::Weight {
                    parameter,
                    actual: (lin.in_dim(), lin.out_dim()),
                    expected: (in_dim, h),
                });
            }
            if let Some(bias) = &lin.bias {
                if bias.len() != h {
                    return Err(ShapeError::Bias {
                        parameter,
                        actual: bias.len(),
                        expected: h,
                    });
                }
            }
        }
        Ok(())
    }
}

fn relu(v: f32) -> f32 {
    v.max(0.0)
}

fn relu_grad(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else {
        0.0
    }
}
