//! Shared helpers for integration tests that drive the native library.
//!
//! Only compiled into test targets gated on the `native-tests` feature.
//! [`init_native`] fails the test when `libxgboost` cannot be loaded, so a
//! missing library is reported instead of passing silently.

#![allow(dead_code)]

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use xgboost_bridge::{sys, DMatrix, Params};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Load the native library or fail the calling test.
pub fn init_native() {
    init_tracing();
    if let Err(e) = sys::api() {
        panic!(
            "native-tests enabled but libxgboost could not be loaded \
             (set {} or {}): {e}",
            sys::LIB_PATH_ENV,
            sys::LIB_DIR_ENV
        );
    }
}

// =============================================================================
// Synthetic Data
// =============================================================================

/// Deterministic values in `[0, 1)` from a fixed-seed LCG.
pub fn uniform(n: usize, seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 40) as f32) / (1u64 << 24) as f32
        })
        .collect()
}

/// Row-major features and a binary label driven by the first two columns.
pub fn binary_data(n_rows: usize, n_cols: usize, seed: u64) -> (Vec<f32>, Vec<f32>) {
    let features = uniform(n_rows * n_cols, seed);
    let labels = features
        .chunks(n_cols)
        .map(|row| {
            let score = row[0] + 0.5 * row.get(1).copied().unwrap_or(0.0);
            if score > 0.75 {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    (features, labels)
}

/// Row-major features and a label in `0..n_classes` taken from the first column.
pub fn multiclass_data(n_rows: usize, n_cols: usize, n_classes: usize, seed: u64) -> (Vec<f32>, Vec<f32>) {
    let features = uniform(n_rows * n_cols, seed);
    let labels = features
        .chunks(n_cols)
        .map(|row| ((row[0] * n_classes as f32) as usize).min(n_classes - 1) as f32)
        .collect();
    (features, labels)
}

pub fn binary_matrix(n_rows: usize, n_cols: usize, seed: u64) -> DMatrix {
    let (features, labels) = binary_data(n_rows, n_cols, seed);
    let mut dmat = DMatrix::from_dense(&features, n_rows, n_cols, f32::NAN).unwrap();
    dmat.set_labels(&labels).unwrap();
    dmat
}

pub fn binary_params() -> Params {
    Params::new()
        .with("objective", "binary:logistic")
        .with("max_depth", 3)
        .with("eta", 0.3)
        .with("nthread", 1)
        .with("seed", 0)
}
