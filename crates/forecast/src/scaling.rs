//! Affine input/output scaling around the forecaster.
//!
//! The pretrained model consumes and produces normalized ranges; the scaler
//! pair is an external artifact loaded once at startup, mirroring the
//! model's training-time scalers.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A scalar-affine transform: `y = x * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineScaler {
    pub scale: f32,
    pub offset: f32,
}

impl AffineScaler {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }

    pub fn apply(&self, x: f32) -> f32 {
        x * self.scale + self.offset
    }

    pub fn invert(&self, y: f32) -> f32 {
        (y - self.offset) / self.scale
    }

    pub fn apply_slice(&self, values: &mut [f32]) {
        for v in values.iter_mut() {
            *v = self.apply(*v);
        }
    }

    pub fn invert_slice(&self, values: &mut [f32]) {
        for v in values.iter_mut() {
            *v = self.invert(*v);
        }
    }
}

impl Default for AffineScaler {
    fn default() -> Self {
        Self::identity()
    }
}

/// The independent input and output transforms bracketing a prediction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScalerPair {
    #[serde(default)]
    pub input: AffineScaler,
    #[serde(default)]
    pub output: AffineScaler,
}

impl ScalerPair {
    pub fn identity() -> Self {
        Self::default()
    }

    /// Load a scaler pair from a JSON sidecar file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ScalingError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let pair = serde_json::from_str(&content)?;
        Ok(pair)
    }
}

#[derive(Debug, Error)]
pub enum ScalingError {
    #[error("Failed to read scaler file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse scaler file: {0}")]
    Parse(#[from] serde_json::Error),
}
