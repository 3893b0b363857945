//! GRU inference for the inflow sequence model.
//!
//! Single-layer GRU, input dimension 1, with a linear readout head:
//!
//! ```text
//! z = sigmoid(w_update·x + U_update·h + b_update)
//! r = sigmoid(w_reset·x  + U_reset·h  + b_reset)
//! n = tanh(w_cand·x + U_cand·(r ∘ h) + b_cand)
//! h' = (1 − z) ∘ n + z ∘ h
//! y  = w_out·h' + b_out
//! ```
//!
//! Inference only — weights are frozen at load. The rollout is exposed as a
//! lazy finite iterator; each call to `rollout` re-runs the warm-up pass, so
//! a rollout is not restartable.

use super::checkpoint::ForecastCheckpoint;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Frozen GRU model built from a validated checkpoint.
#[derive(Debug, Clone)]
pub struct GruModel {
    cp: ForecastCheckpoint,
}

impl GruModel {
    pub fn new(cp: ForecastCheckpoint) -> Self {
        Self { cp }
    }

    pub fn window_size(&self) -> usize {
        self.cp.window_size
    }

    pub fn horizon(&self) -> usize {
        self.cp.horizon
    }

    /// Validation MAE as a fraction of mean inflow.
    pub fn val_mae_ratio(&self) -> f64 {
        self.cp.val_mae_ratio
    }

    fn normalize(&self, raw: f64) -> f64 {
        (raw - self.cp.inflow_mean) / self.cp.inflow_std
    }

    fn denormalize(&self, norm: f64) -> f64 {
        norm * self.cp.inflow_std + self.cp.inflow_mean
    }

    /// One GRU step: update hidden state in place from a normalized input.
    fn step(&self, hidden: &mut [f64], x: f64) {
        let h = self.cp.hidden_size;
        let w = &self.cp.weights;
        let prev = hidden.to_vec();

        for i in 0..h {
            let mut z_pre = w.w_update[i] * x + w.b_update[i];
            let mut r_pre = w.w_reset[i] * x + w.b_reset[i];
            for j in 0..h {
                z_pre += w.u_update[i * h + j] * prev[j];
                r_pre += w.u_reset[i * h + j] * prev[j];
            }
            let z = sigmoid(z_pre);
            let r = sigmoid(r_pre);

            let mut n_pre = w.w_cand[i] * x + w.b_cand[i];
            for j in 0..h {
                n_pre += w.u_cand[i * h + j] * (r * prev[j]);
            }
            let n = n_pre.tanh();

            hidden[i] = (1.0 - z) * n + z * prev[i];
        }
    }

    fn readout(&self, hidden: &[f64]) -> f64 {
        let w = &self.cp.weights;
        let mut y = w.b_out;
        for (wi, hi) in w.w_out.iter().zip(hidden.iter()) {
            y += wi * hi;
        }
        y
    }

    /// Warm the hidden state over the observation window, then return a lazy
    /// autoregressive rollout of `horizon` forecast steps.
    ///
    /// `window` is raw inflow (m³ per 15 min), oldest first, and must be at
    /// least `window_size` long — callers slice it from the historical
    /// series. Forecast values are clamped to be nonnegative.
    pub fn rollout(&self, window: &[f64]) -> Rollout<'_> {
        let mut hidden = vec![0.0; self.cp.hidden_size];
        for &raw in window {
            self.step(&mut hidden, self.normalize(raw));
        }
        let first = self.denormalize(self.readout(&hidden)).max(0.0);
        Rollout {
            model: self,
            hidden,
            next_value: first,
            remaining: self.cp.horizon,
        }
    }
}

/// Lazy finite sequence of forecast values.
pub struct Rollout<'a> {
    model: &'a GruModel,
    hidden: Vec<f64>,
    next_value: f64,
    remaining: usize,
}

impl Iterator for Rollout<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let value = self.next_value;
        // Feed the prediction back to advance the state for the next step.
        let x = self.model.normalize(value);
        self.model.step(&mut self.hidden, x);
        self.next_value = self.model.denormalize(self.model.readout(&self.hidden)).max(0.0);
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Rollout<'_> {}
