//! Residual history used for re-orthogonalization.

use orthocg_simd::{SimdCapability, real_axpy, real_dot_product};

/// Number of classical Gram-Schmidt sweeps per projection.
///
/// One sweep leaves a measurable component along old residuals after
/// O(√n) iterations; the second restores orthogonality to working precision.
pub const REORTH_PASSES: usize = 2;

/// Residuals accepted so far together with their squared norms.
///
/// The squared norm of each residual is captured when it is stored and is
/// never recomputed; it is the divisor in every later projection.
#[derive(Debug, Clone, Default)]
pub struct ResidualHistory {
    residuals: Vec<Vec<f64>>,
    squared_norms: Vec<f64>,
}

impl ResidualHistory {
    /// Create an empty history with room for `capacity` residuals.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            residuals: Vec::with_capacity(capacity),
            squared_norms: Vec::with_capacity(capacity),
        }
    }

    /// Store a residual and its squared norm.
    pub fn push(&mut self, residual: Vec<f64>, squared_norm: f64) {
        self.residuals.push(residual);
        self.squared_norms.push(squared_norm);
    }

    /// Number of stored residuals.
    pub fn len(&self) -> usize {
        self.residuals.len()
    }

    /// Returns true if nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.residuals.is_empty()
    }

    /// Stored residual vectors, oldest first.
    pub fn residuals(&self) -> &[Vec<f64>] {
        &self.residuals
    }

    /// Stored squared norms, oldest first.
    pub fn squared_norms(&self) -> &[f64] {
        &self.squared_norms
    }

    /// Squared norm of the most recently stored residual.
    pub fn last_squared_norm(&self) -> Option<f64> {
        self.squared_norms.last().copied()
    }

    /// Remove the components of `r` along every stored residual.
    ///
    /// Runs [`REORTH_PASSES`] sweeps of classical Gram-Schmidt. Within a
    /// sweep each coefficient is taken against the partially projected `r`.
    pub fn reorthogonalize(&self, r: &mut [f64], cap: SimdCapability) {
        for _pass in 0..REORTH_PASSES {
            for (h, &h2) in self.residuals.iter().zip(self.squared_norms.iter()) {
                let coeff = real_dot_product(r, h, cap) / h2;
                real_axpy(-coeff, h, r);
            }
        }
    }

    /// Residual norms (square roots of the stored squared norms).
    pub fn norms(&self) -> Vec<f64> {
        self.squared_norms.iter().map(|s| s.sqrt()).collect()
    }

    /// Largest absolute cosine between any two distinct stored residuals.
    ///
    /// Zero-norm residuals are skipped.
    pub fn max_pairwise_cosine(&self, cap: SimdCapability) -> f64 {
        let norms: Vec<f64> = self
            .residuals
            .iter()
            .map(|h| real_dot_product(h, h, cap).sqrt())
            .collect();

        let mut worst: f64 = 0.0;
        for i in 0..self.residuals.len() {
            for j in (i + 1)..self.residuals.len() {
                let denom = norms[i] * norms[j];
                if denom == 0.0 {
                    continue;
                }
                let cos = real_dot_product(&self.residuals[i], &self.residuals[j], cap) / denom;
                worst = worst.max(cos.abs());
            }
        }
        worst
    }
}
