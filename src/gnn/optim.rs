use ndarray::{ArrayViewD, ArrayViewMutD};

/// Adam optimizer with a fixed learning rate
///
/// Moment buffers are keyed by parameter slot and allocated on first use.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    step: i32,
    moments: Vec<Option<(Vec<f32>, Vec<f32>)>>,
}

impl Adam {
    pub fn new(lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            step: 0,
            moments: Vec::new(),
        }
    }

    /// Advances the bias-correction step; call once before updating every slot
    pub fn begin_step(&mut self) {
        self.step += 1;
    }

    pub fn update(&mut self, slot: usize, mut param: ArrayViewMutD<f32>, grad: ArrayViewD<f32>) {
        if self.moments.len() <= slot {
            self.moments.resize(slot + 1, None);
        }
        let (m, v) = self.moments[slot]
            .get_or_insert_with(|| (vec![0.0; grad.len()], vec![0.0; grad.len()]));

        let t = self.step.max(1);
        let correction1 = 1.0 - self.beta1.powi(t);
        let correction2 = 1.0 - self.beta2.powi(t);

        for (((p, g), m), v) in param
            .iter_mut()
            .zip(grad.iter())
            .zip(m.iter_mut())
            .zip(v.iter_mut())
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let m_hat = *m / correction1;
            let v_hat = *v / correction2;
            *p -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}
