//! Dense multi-layer perceptron with manual backprop and Adam.
//!
//! ReLU on every hidden layer, linear output. Gradients accumulate across
//! `backward_from_output_grad` calls until `zero_grad`.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPS: f32 = 1e-8;

/// One named parameter tensor, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Opaque snapshot of every parameter of a `Net`, in layer order
/// (`dense_i/kernel`, `dense_i/bias`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    pub tensors: Vec<Tensor>,
}

impl Weights {
    pub fn len(&self) -> usize {
        self.tensors.iter().map(|t| t.data.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
struct Dense {
    n_in: usize,
    n_out: usize,
    w: Vec<f32>,  // n_out x n_in
    b: Vec<f32>,  // n_out
    gw: Vec<f32>, // accumulated dL/dw
    gb: Vec<f32>, // accumulated dL/db
    // Adam moments
    mw: Vec<f32>,
    vw: Vec<f32>,
    mb: Vec<f32>,
    vb: Vec<f32>,
}

impl Dense {
    /// Glorot-uniform kernel, zero bias.
    fn new<R: Rng + ?Sized>(n_in: usize, n_out: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (n_in + n_out) as f32).sqrt();
        let w = (0..n_in * n_out).map(|_| rng.gen_range(-limit..limit)).collect();
        Self {
            n_in,
            n_out,
            w,
            b: vec![0.0; n_out],
            gw: vec![0.0; n_in * n_out],
            gb: vec![0.0; n_out],
            mw: vec![0.0; n_in * n_out],
            vw: vec![0.0; n_in * n_out],
            mb: vec![0.0; n_out],
            vb: vec![0.0; n_out],
        }
    }

    fn affine(&self, x: &[f32]) -> Vec<f32> {
        (0..self.n_out)
            .map(|o| {
                let row = &self.w[o * self.n_in..(o + 1) * self.n_in];
                self.b[o] + row.iter().zip(x).map(|(w, x)| w * x).sum::<f32>()
            })
            .collect()
    }
}

/// Activations recorded during a forward pass, needed for backprop.
pub struct Trace {
    acts: Vec<Vec<f32>>, // a0 = input, a1.., last = output
    pre: Vec<Vec<f32>>,  // pre-activation of each layer
}

impl Trace {
    pub fn output(&self) -> &[f32] {
        self.acts.last().map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Clone)]
pub struct Net {
    layers: Vec<Dense>,
    adam_t: i32, // optimizer step counter for bias correction
}

impl Net {
    /// `sizes` = [inputs, hidden..., outputs]; needs at least two entries,
    /// none of them zero.
    pub fn new<R: Rng + ?Sized>(sizes: &[usize], rng: &mut R) -> Result<Self> {
        if sizes.len() < 2 {
            return Err(Error::Config(format!("network needs input and output widths, got {sizes:?}")));
        }
        if sizes.contains(&0) {
            return Err(Error::Config(format!("zero-width layer in {sizes:?}")));
        }
        let layers = sizes.windows(2).map(|p| Dense::new(p[0], p[1], &mut *rng)).collect();
        Ok(Self { layers, adam_t: 0 })
    }

    /// Layer widths, input first.
    pub fn topology(&self) -> Vec<usize> {
        let mut t = vec![self.layers[0].n_in];
        t.extend(self.layers.iter().map(|l| l.n_out));
        t
    }

    pub fn input_dim(&self) -> usize { self.layers[0].n_in }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map(|l| l.n_out).unwrap_or(0)
    }

    pub fn forward(&self, x: &[f32]) -> Vec<f32> {
        let last = self.layers.len() - 1;
        let mut a = x.to_vec();
        for (i, layer) in self.layers.iter().enumerate() {
            a = layer.affine(&a);
            if i < last {
                a.iter_mut().for_each(|v| *v = v.max(0.0));
            }
        }
        a
    }

    /// Forward over a batch; rows are independent so they run in parallel.
    pub fn forward_batch<S: AsRef<[f32]> + Sync>(&self, xs: &[S]) -> Vec<Vec<f32>> {
        xs.par_iter().map(|x| self.forward(x.as_ref())).collect()
    }

    pub fn forward_trace(&self, x: &[f32]) -> Trace {
        let last = self.layers.len() - 1;
        let mut acts = vec![x.to_vec()];
        let mut pre = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.affine(&acts[i]);
            let a = if i < last { z.iter().map(|v| v.max(0.0)).collect() } else { z.clone() };
            pre.push(z);
            acts.push(a);
        }
        Trace { acts, pre }
    }

    pub fn zero_grad(&mut self) {
        for l in &mut self.layers {
            l.gw.iter_mut().for_each(|g| *g = 0.0);
            l.gb.iter_mut().for_each(|g| *g = 0.0);
        }
    }

    /// Accumulates parameter gradients given dL/d(output) for one sample.
    pub fn backward_from_output_grad(&mut self, trace: &Trace, d_out: &[f32]) {
        let mut delta = d_out.to_vec();
        for li in (0..self.layers.len()).rev() {
            let a_prev = &trace.acts[li];
            let layer = &mut self.layers[li];
            for o in 0..layer.n_out {
                let d = delta[o];
                if d == 0.0 {
                    continue;
                }
                layer.gb[o] += d;
                let row = &mut layer.gw[o * layer.n_in..(o + 1) * layer.n_in];
                for (g, &a) in row.iter_mut().zip(a_prev) {
                    *g += d * a;
                }
            }
            if li == 0 {
                break;
            }
            // propagate through W^T and the ReLU of the layer below
            let z_prev = &trace.pre[li - 1];
            let mut d_prev = vec![0.0f32; layer.n_in];
            for o in 0..layer.n_out {
                let d = delta[o];
                if d == 0.0 {
                    continue;
                }
                let row = &layer.w[o * layer.n_in..(o + 1) * layer.n_in];
                for (dp, &w) in d_prev.iter_mut().zip(row) {
                    *dp += d * w;
                }
            }
            for (dp, &z) in d_prev.iter_mut().zip(z_prev) {
                if z <= 0.0 {
                    *dp = 0.0;
                }
            }
            delta = d_prev;
        }
    }

    /// Squared L2 norm of all accumulated gradients.
    pub fn grad_l2_sum_all(&self) -> f32 {
        self.layers
            .iter()
            .map(|l| l.gw.iter().chain(&l.gb).map(|g| g * g).sum::<f32>())
            .sum()
    }

    /// One Adam update with the accumulated gradients.
    pub fn step_adam(&mut self, lr: f32) {
        self.adam_t += 1;
        let bc1 = 1.0 - ADAM_BETA1.powi(self.adam_t);
        let bc2 = 1.0 - ADAM_BETA2.powi(self.adam_t);
        for l in &mut self.layers {
            adam_update(&mut l.w, &l.gw, &mut l.mw, &mut l.vw, lr, bc1, bc2);
            adam_update(&mut l.b, &l.gb, &mut l.mb, &mut l.vb, lr, bc1, bc2);
        }
    }

    /// True if any parameter or gradient is NaN/Inf.
    pub fn non_finite_any(&self) -> bool {
        self.layers.iter().any(|l| {
            l.w.iter().chain(&l.b).chain(&l.gw).chain(&l.gb).any(|v| !v.is_finite())
        })
    }

    pub fn weights(&self) -> Weights {
        let mut tensors = Vec::with_capacity(self.layers.len() * 2);
        for (i, l) in self.layers.iter().enumerate() {
            tensors.push(Tensor {
                name: format!("dense_{i}/kernel"),
                shape: vec![l.n_out, l.n_in],
                data: l.w.clone(),
            });
            tensors.push(Tensor {
                name: format!("dense_{i}/bias"),
                shape: vec![l.n_out],
                data: l.b.clone(),
            });
        }
        Weights { tensors }
    }

    /// Replaces every parameter. Checks the whole snapshot first, so a
    /// mismatching one leaves the network untouched. Optimizer state is kept.
    pub fn set_weights(&mut self, weights: &Weights) -> Result<()> {
        if weights.tensors.len() != self.layers.len() * 2 {
            return Err(Error::ShapeMismatch {
                expected: self.layers.len() * 2,
                found: weights.tensors.len(),
            });
        }
        for (l, pair) in self.layers.iter().zip(weights.tensors.chunks(2)) {
            let (k, b) = (&pair[0], &pair[1]);
            if k.data.len() != l.w.len() || k.shape != [l.n_out, l.n_in] {
                return Err(Error::ShapeMismatch { expected: l.w.len(), found: k.data.len() });
            }
            if b.data.len() != l.b.len() {
                return Err(Error::ShapeMismatch { expected: l.b.len(), found: b.data.len() });
            }
        }
        for (l, pair) in self.layers.iter_mut().zip(weights.tensors.chunks(2)) {
            l.w.copy_from_slice(&pair[0].data);
            l.b.copy_from_slice(&pair[1].data);
        }
        Ok(())
    }

    /// Hard copy of parameters from a network with the same topology.
    pub fn copy_from(&mut self, other: &Net) {
        debug_assert_eq!(self.topology(), other.topology());
        for (dst, src) in self.layers.iter_mut().zip(&other.layers) {
            dst.w.copy_from_slice(&src.w);
            dst.b.copy_from_slice(&src.b);
        }
    }
}

fn adam_update(p: &mut [f32], g: &[f32], m: &mut [f32], v: &mut [f32], lr: f32, bc1: f32, bc2: f32) {
    for i in 0..p.len() {
        m[i] = ADAM_BETA1 * m[i] + (1.0 - ADAM_BETA1) * g[i];
        v[i] = ADAM_BETA2 * v[i] + (1.0 - ADAM_BETA2) * g[i] * g[i];
        let m_hat = m[i] / bc1;
        let v_hat = v[i] / bc2;
        p[i] -= lr * m_hat / (v_hat.sqrt() + ADAM_EPS);
    }
}
