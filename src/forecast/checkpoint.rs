//! Forecaster checkpoint: serializable GRU weights and normalization stats.
//!
//! The model is trained offline; this module only restores (and, for
//! tooling parity, saves) the artifact. Restore validates every weight
//! matrix shape against the declared hidden size before the model is
//! allowed near an inference call.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

/// Current checkpoint format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// GRU weight tensors, stored flat row-major.
///
/// Input dimension is 1 (the inflow sample), so the input weights are plain
/// vectors of length `hidden`; recurrent matrices are `hidden × hidden`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruWeights {
    pub w_update: Vec<f64>,
    pub w_reset: Vec<f64>,
    pub w_cand: Vec<f64>,
    pub u_update: Vec<f64>,
    pub u_reset: Vec<f64>,
    pub u_cand: Vec<f64>,
    pub b_update: Vec<f64>,
    pub b_reset: Vec<f64>,
    pub b_cand: Vec<f64>,
    /// Readout head: hidden → next normalized inflow
    pub w_out: Vec<f64>,
    pub b_out: f64,
}

impl GruWeights {
    pub fn num_params(&self) -> usize {
        self.w_update.len()
            + self.w_reset.len()
            + self.w_cand.len()
            + self.u_update.len()
            + self.u_reset.len()
            + self.u_cand.len()
            + self.b_update.len()
            + self.b_reset.len()
            + self.b_cand.len()
            + self.w_out.len()
            + 1
    }
}

/// Complete forecaster artifact as written by the training pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastCheckpoint {
    /// Format version for forward compatibility.
    pub version: u32,
    /// GRU hidden state width.
    pub hidden_size: usize,
    /// Input window length (15-min samples) the model was trained on.
    pub window_size: usize,
    /// Autoregressive rollout horizon (15-min steps).
    pub horizon: usize,
    /// Training-set inflow mean (m³ per 15 min), for normalization.
    pub inflow_mean: f64,
    /// Training-set inflow standard deviation.
    pub inflow_std: f64,
    /// Validation MAE as a fraction of mean inflow; feeds the snapshot
    /// confidence.
    pub val_mae_ratio: f64,
    pub weights: GruWeights,
}

/// Errors restoring a checkpoint from disk.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse checkpoint {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported checkpoint version {found} (supported: {supported})")]
    Version { found: u32, supported: u32 },
    #[error("checkpoint shape mismatch: {0}")]
    Shape(String),
}

impl ForecastCheckpoint {
    /// Load and shape-validate a checkpoint.
    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| CheckpointError::Io {
            path: display.clone(),
            source,
        })?;
        let cp: Self = serde_json::from_str(&contents).map_err(|source| CheckpointError::Parse {
            path: display,
            source,
        })?;
        cp.validate()?;
        Ok(cp)
    }

    /// Validate declared dimensions against the weight tensors.
    pub fn validate(&self) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        let h = self.hidden_size;
        if h == 0 || self.window_size == 0 || self.horizon == 0 {
            return Err(CheckpointError::Shape(
                "hidden_size, window_size and horizon must be nonzero".to_string(),
            ));
        }
        if self.inflow_std <= 0.0 || !self.inflow_std.is_finite() {
            return Err(CheckpointError::Shape(format!(
                "inflow_std must be positive, got {}",
                self.inflow_std
            )));
        }
        let w = &self.weights;
        let vector_checks = [
            ("w_update", w.w_update.len()),
            ("w_reset", w.w_reset.len()),
            ("w_cand", w.w_cand.len()),
            ("b_update", w.b_update.len()),
            ("b_reset", w.b_reset.len()),
            ("b_cand", w.b_cand.len()),
            ("w_out", w.w_out.len()),
        ];
        for (name, len) in vector_checks {
            if len != h {
                return Err(CheckpointError::Shape(format!(
                    "{name} has length {len}, expected hidden_size {h}"
                )));
            }
        }
        let matrix_checks = [
            ("u_update", w.u_update.len()),
            ("u_reset", w.u_reset.len()),
            ("u_cand", w.u_cand.len()),
        ];
        for (name, len) in matrix_checks {
            if len != h * h {
                return Err(CheckpointError::Shape(format!(
                    "{name} has length {len}, expected {h}×{h}"
                )));
            }
        }
        Ok(())
    }

    /// Save atomically (write temp file alongside the target, then rename).
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)
    }
}
