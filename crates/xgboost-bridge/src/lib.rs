//! xgboost-bridge: safe Rust access to the native XGBoost library.
//!
//! The native library does the numerical work. This crate owns its handles,
//! marshals typed data and parameters across the C boundary, and decodes
//! variable-shape prediction buffers into typed tensors.
//!
//! # Key Types
//!
//! - [`DMatrix`] - Feature matrix with labels and column metadata
//! - [`Booster`] - Training, prediction, persistence, dumps, feature importance
//! - [`Params`] / [`ParamValue`] - Typed booster parameters
//! - [`PredictOptions`] / [`Prediction`] - Prediction requests and results
//! - [`XgbError`] - Every failure, including native error messages
//!
//! # Loading the Library
//!
//! The shared library is opened on first use. Point `XGBOOST_LIB_PATH` at the
//! file or `XGBOOST_LIB_DIR` at its directory, or call [`sys::init`] with an
//! explicit [`LibraryConfig`]. See the [`sys`] module for details.
//!
//! # Threads
//!
//! [`DMatrix`] and [`Booster`] are `Send` but not `Sync`. Wrap them in a
//! mutex to share one across threads.

pub mod booster;
pub mod dmatrix;
pub mod error;
pub mod handle;
pub mod model;
pub mod params;
pub mod predict;
pub mod sys;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use booster::Booster;
pub use dmatrix::{DMatrix, FeatureInfo, FeatureType};
pub use error::{Result, XgbError};
pub use model::{DumpFormat, FeatureMap, FeatureScore, FeatureScores, ImportanceType, ModelFormat};
pub use params::{ParamValue, Params};
pub use predict::{PredictOptions, PredictType, Prediction};
pub use sys::LibraryConfig;
