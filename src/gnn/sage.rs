use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::graph::EdgeIndex;

/// Dense affine map `x · weight + bias`, weight stored as `in × out`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    pub weight: Array2<f32>,
    pub bias: Option<Array1<f32>>,
}

impl Linear {
    /// Uniform init in ±1/sqrt(fan_in), zero bias
    pub fn new<R: Rng>(in_dim: usize, out_dim: usize, bias: bool, rng: &mut R) -> Self {
        let bound = 1.0 / (in_dim.max(1) as f32).sqrt();
        let weight = Array2::from_shape_fn((in_dim, out_dim), |_| rng.random_range(-bound..=bound));
        Self {
            weight,
            bias: bias.then(|| Array1::zeros(out_dim)),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            weight: Array2::zeros(self.weight.raw_dim()),
            bias: self.bias.as_ref().map(|b| Array1::zeros(b.raw_dim())),
        }
    }

    pub fn in_dim(&self) -> usize {
        self.weight.nrows()
    }

    pub fn out_dim(&self) -> usize {
        self.weight.ncols()
    }

    pub fn forward(&self, x: &ArrayView2<f32>) -> Array2<f32> {
        let mut out = x.dot(&self.weight);
        if let Some(bias) = &self.bias {
            out += bias;
        }
        out
    }

    /// Accumulates parameter gradients into `grads`; returns the input gradient
    fn backward(
        &self,
        x: &ArrayView2<f32>,
        grad_out: &Array2<f32>,
        grads: &mut Linear,
    ) -> Array2<f32> {
        grads.weight += &x.t().dot(grad_out);
        if let Some(db) = grads.bias.as_mut() {
            *db += &grad_out.sum_axis(Axis(0));
        }
        grad_out.dot(&self.weight.t())
    }
}

/// Intermediates kept from a forward pass for the matching backward pass
#[derive(Debug, Clone)]
pub struct SageCache {
    /// Mean of source neighbours per destination node
    aggregated: Array2<f32>,
    /// In-degree per destination node
    degree: Vec<f32>,
}

/// Relation-specific GraphSAGE convolution over a bipartite edge list:
/// `out_i = lin_l(mean_{j -> i} x_j) + lin_r(x_i)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SageConv {
    pub lin_l: Linear,
    pub lin_r: Linear,
}

impl SageConv {
    pub fn new<R: Rng>(src_dim: usize, dst_dim: usize, out_dim: usize, rng: &mut R) -> Self {
        Self {
            lin_l: Linear::new(src_dim, out_dim, true, rng),
            lin_r: Linear::new(dst_dim, out_dim, false, rng),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            lin_l: self.lin_l.zeros_like(),
            lin_r: self.lin_r.zeros_like(),
        }
    }

    pub fn forward(
        &self,
        x_src: &ArrayView2<f32>,
        x_dst: &ArrayView2<f32>,
        edges: &EdgeIndex,
    ) -> (Array2<f32>, SageCache) {
        let num_dst = x_dst.nrows();
        let mut aggregated = Array2::<f32>::zeros((num_dst, x_src.ncols()));
        let mut degree = vec![0.0f32; num_dst];

        for (s, d) in edges.pairs() {
            aggregated.row_mut(d).scaled_add(1.0, &x_src.row(s));
            degree[d] += 1.0;
        }
        // Isolated destinations keep a zero aggregate
        for (d, &deg) in degree.iter().enumerate() {
            if deg > 0.0 {
                aggregated.row_mut(d).mapv_inplace(|v| v / deg);
            }
        }

        let out = self.lin_l.forward(&aggregated.view()) + self.lin_r.forward(x_dst);
        (out, SageCache { aggregated, degree })
    }

    /// Returns `(grad_x_src, grad_x_dst)` and accumulates parameter gradients into `grads`
    pub fn backward(
        &self,
        grad_out: &Array2<f32>,
        x_src: &ArrayView2<f32>,
        x_dst: &ArrayView2<f32>,
        edges: &EdgeIndex,
        cache: &SageCache,
        grads: &mut SageConv,
    ) -> (Array2<f32>, Array2<f32>) {
        let grad_agg = self
            .lin_l
            .backward(&cache.aggregated.view(), grad_out, &mut grads.lin_l);
        let grad_dst = self.lin_r.backward(x_dst, grad_out, &mut grads.lin_r);

        let mut grad_src = Array2::<f32>::zeros(x_src.raw_dim());
        for (s, d) in edges.pairs() {
            grad_src
                .row_mut(s)
                .scaled_add(1.0 / cache.degree[d], &grad_agg.row(d));
        }
        (grad_src, grad_dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_mean_aggregation_and_isolated_nodes() {
        let conv = SageConv {
            lin_l: Linear {
                weight: array![[1.0], [1.0]],
                bias: Some(array![0.5]),
            },
            lin_r: Linear {
                weight: array![[2.0]],
                bias: None,
            },
        };
        let x_src = array![[1.0, 0.0], [3.0, 2.0]];
        let x_dst = array![[1.0], [10.0]];
        // dst 0 gets both sources, dst 1 none
        let edges = EdgeIndex::from_pairs([(0, 0), (1, 0)]);

        let (out, _) = conv.forward(&x_src.view(), &x_dst.view(), &edges);

        // mean = [2, 1] -> 3 + 0.5 + 2*1
        assert!((out[[0, 0]] - 5.5).abs() < 1e-6);
        // isolated: 0 + 0.5 + 2*10
        assert!((out[[1, 0]] - 20.5).abs() < 1e-6);
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(7);
        let conv = SageConv::new(3, 2, 2, &mut rng);
        let x_src = Array2::from_shape_fn((4, 3), |(i, j)| (i as f32 - j as f32) * 0.3);
        let x_dst = Array2::from_shape_fn((3, 2), |(i, j)| (i + j) as f32 * 0.2 - 0.1);
        let edges = EdgeIndex::from_pairs([(0, 0), (1, 0), (2, 1), (3, 1), (3, 2)]);

        // loss = sum(out)
        let loss = |c: &SageConv, xs: &Array2<f32>| {
            c.forward(&xs.view(), &x_dst.view(), &edges).0.sum()
        };

        let (out, cache) = conv.forward(&x_src.view(), &x_dst.view(), &edges);
        let mut grads = conv.zeros_like();
        let (grad_src, _) = conv.backward(
            &Array2::ones(out.raw_dim()),
            &x_src.view(),
            &x_dst.view(),
            &edges,
            &cache,
            &mut grads,
        );

        let eps = 1e-2;
        let mut bumped = conv.clone();
        bumped.lin_l.weight[[1, 0]] += eps;
        let numeric = (loss(&bumped, &x_src) - loss(&conv, &x_src)) / eps;
        assert!((numeric - grads.lin_l.weight[[1, 0]]).abs() < 1e-2);

        let mut bumped_x = x_src.clone();
        bumped_x[[3, 2]] += eps;
        let numeric = (loss(&conv, &bumped_x) - loss(&conv, &x_src)) / eps;
        assert!((numeric - grad_src[[3, 2]]).abs() < 1e-2);
    }
}
