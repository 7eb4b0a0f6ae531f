//! Prediction requests and decoded prediction tensors.
//!
//! The shaped native prediction call returns a flat `f32` buffer plus a shape
//! descriptor of one to four dimensions. Which rank comes back depends on the
//! requested output and the model:
//!
//! | Request                      | Typical shape                               |
//! |------------------------------|---------------------------------------------|
//! | normal / margin, 1 output    | `[n_rows]`                                  |
//! | normal / margin, k classes   | `[n_rows, k]`                               |
//! | contributions                | `[n_rows, n_features + 1]`                  |
//! | contributions, k classes     | `[n_rows, k, n_features + 1]`               |
//! | interactions                 | `[n_rows, n_features + 1, n_features + 1]`  |
//! | interactions, k classes      | `[n_rows, k, n_features + 1, n_features + 1]` |
//! | leaf index                   | `[n_rows, n_trees]`                         |
//!
//! The rank is decided once here, in [`Prediction::from_raw`]; everything
//! downstream works with a typed [`Prediction`].

use ndarray::{Array1, Array2, Array3, Array4, ArrayD, ArrayViewD, IxDyn};
use serde::Serialize;

use crate::error::{Result, XgbError};

// =============================================================================
// PredictType
// =============================================================================

/// Kind of output requested from the model. Exactly one per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictType {
    /// Transformed predictions (probabilities for classifiers).
    #[default]
    Normal,
    /// Untransformed margin scores.
    OutputMargin,
    /// Exact per-feature contributions plus bias.
    Contributions,
    /// Approximate per-feature contributions plus bias.
    ApproxContributions,
    /// Exact pairwise feature interactions.
    Interactions,
    /// Approximate pairwise feature interactions.
    ApproxInteractions,
    /// Leaf index reached in every tree.
    LeafIndex,
}

impl PredictType {
    /// Native integer code for the `type` config field.
    pub fn code(&self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::OutputMargin => 1,
            Self::Contributions => 2,
            Self::ApproxContributions => 3,
            Self::Interactions => 4,
            Self::ApproxInteractions => 5,
            Self::LeafIndex => 6,
        }
    }
}

// =============================================================================
// PredictOptions
// =============================================================================

/// Validated options for [`Booster::predict`](crate::Booster::predict).
///
/// Built either directly from a [`PredictType`] or with boolean flags through
/// the builder, which rejects conflicting output types before anything
/// reaches the native library.
///
/// # Example
///
/// ```
/// use xgboost_bridge::{PredictOptions, PredictType};
///
/// let opts = PredictOptions::builder()
///     .pred_contribs(true)
///     .approx_contribs(true)
///     .build()
///     .unwrap();
/// assert_eq!(opts.predict_type(), PredictType::ApproxContributions);
///
/// let conflict = PredictOptions::builder()
///     .output_margin(true)
///     .pred_leaf(true)
///     .build();
/// assert!(conflict.is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PredictOptions {
    predict_type: PredictType,
    iteration_range: (u32, u32),
    training: bool,
    strict_shape: bool,
}

#[bon::bon]
impl PredictOptions {
    /// Resolve prediction flags into a single output type.
    ///
    /// `approx_contribs` switches contributions or interactions to their
    /// approximate variants and has no effect on its own. `training` only
    /// matters for DART boosters. `iteration_range` selects trees from
    /// boosting rounds `[begin, end)`; `(0, 0)` uses all of them.
    ///
    /// # Errors
    ///
    /// `Configuration` if more than one output type is requested or the
    /// iteration range is reversed.
    #[builder]
    pub fn new(
        #[builder(default)] output_margin: bool,
        #[builder(default)] pred_leaf: bool,
        #[builder(default)] pred_contribs: bool,
        #[builder(default)] approx_contribs: bool,
        #[builder(default)] pred_interactions: bool,
        #[builder(default)] training: bool,
        #[builder(default)] iteration_range: (u32, u32),
        #[builder(default)] strict_shape: bool,
    ) -> Result<Self> {
        let requested = [
            (output_margin, PredictType::OutputMargin),
            (
                pred_contribs,
                if approx_contribs {
                    PredictType::ApproxContributions
                } else {
                    PredictType::Contributions
                },
            ),
            (
                pred_interactions,
                if approx_contribs {
                    PredictType::ApproxInteractions
                } else {
                    PredictType::Interactions
                },
            ),
            (pred_leaf, PredictType::LeafIndex),
        ];

        let mut predict_type = PredictType::Normal;
        for (flag, kind) in requested {
            if !flag {
                continue;
            }
            if predict_type != PredictType::Normal {
                return Err(XgbError::Configuration(format!(
                    "only one prediction type at a time: {predict_type:?} and {kind:?} both requested"
                )));
            }
            predict_type = kind;
        }

        Self::of(predict_type)
            .with_training(training)
            .with_strict_shape(strict_shape)
            .with_iteration_range(iteration_range.0, iteration_range.1)
    }

    /// Options for a single output type with defaults for everything else.
    pub fn of(predict_type: PredictType) -> Self {
        Self {
            predict_type,
            ..Self::default()
        }
    }

    /// Restrict to trees from boosting rounds `[begin, end)`.
    ///
    /// `end == 0` means "up to the last round".
    pub fn with_iteration_range(mut self, begin: u32, end: u32) -> Result<Self> {
        if end != 0 && begin > end {
            return Err(XgbError::Configuration(format!(
                "iteration range [{begin}, {end}) is reversed"
            )));
        }
        self.iteration_range = (begin, end);
        Ok(self)
    }

    pub fn with_training(mut self, training: bool) -> Self {
        self.training = training;
        self
    }

    /// Ask the library to always return the full-rank shape.
    pub fn with_strict_shape(mut self, strict_shape: bool) -> Self {
        self.strict_shape = strict_shape;
        self
    }

    pub fn predict_type(&self) -> PredictType {
        self.predict_type
    }

    pub fn iteration_range(&self) -> (u32, u32) {
        self.iteration_range
    }

    pub fn training(&self) -> bool {
        self.training
    }

    pub fn strict_shape(&self) -> bool {
        self.strict_shape
    }

    /// JSON config for `XGBoosterPredictFromDMatrix`.
    pub(crate) fn to_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct NativeConfig {
            #[serde(rename = "type")]
            kind: u8,
            training: bool,
            iteration_begin: u32,
            iteration_end: u32,
            strict_shape: bool,
        }

        Ok(serde_json::to_string(&NativeConfig {
            kind: self.predict_type.code(),
            training: self.training,
            iteration_begin: self.iteration_range.0,
            iteration_end: self.iteration_range.1,
            strict_shape: self.strict_shape,
        })?)
    }
}

impl From<PredictType> for PredictOptions {
    fn from(predict_type: PredictType) -> Self {
        Self::of(predict_type)
    }
}

// =============================================================================
// Prediction
// =============================================================================

/// Decoded prediction tensor, row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Vector(Array1<f32>),
    Matrix(Array2<f32>),
    Tensor3(Array3<f32>),
    Tensor4(Array4<f32>),
}

impl Prediction {
    /// Reshape a flat buffer according to a native shape descriptor.
    ///
    /// Element `(i0, .., in)` is `values[Σ ij · Π_{m>j} dim_m]`.
    ///
    /// # Errors
    ///
    /// - `Shape` if the rank is not 1..=4 or the buffer length differs from
    ///   the product of the dimensions.
    /// - `Overflow` if the product exceeds the addressable size.
    pub fn from_raw(values: Vec<f32>, shape: &[u64]) -> Result<Self> {
        check_rank(shape)?;
        let count = element_count(shape)?;
        if values.len() != count {
            return Err(XgbError::Shape(format!(
                "shape {shape:?} needs {count} values, buffer has {}",
                values.len()
            )));
        }

        // element_count guarantees every dimension fits in usize.
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let shape_err = |e: ndarray::ShapeError| XgbError::Shape(e.to_string());
        Ok(match dims[..] {
            [_] => Self::Vector(Array1::from_vec(values)),
            [a, b] => Self::Matrix(Array2::from_shape_vec((a, b), values).map_err(shape_err)?),
            [a, b, c] => Self::Tensor3(Array3::from_shape_vec((a, b, c), values).map_err(shape_err)?),
            [a, b, c, d] => {
                Self::Tensor4(Array4::from_shape_vec((a, b, c, d), values).map_err(shape_err)?)
            }
            _ => unreachable!("rank checked above"),
        })
    }

    /// Dimension sizes.
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Vector(a) => a.shape(),
            Self::Matrix(a) => a.shape(),
            Self::Tensor3(a) => a.shape(),
            Self::Tensor4(a) => a.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total number of values.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_vector(&self) -> Option<&Array1<f32>> {
        match self {
            Self::Vector(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&Array2<f32>> {
        match self {
            Self::Matrix(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_tensor3(&self) -> Option<&Array3<f32>> {
        match self {
            Self::Tensor3(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_tensor4(&self) -> Option<&Array4<f32>> {
        match self {
            Self::Tensor4(a) => Some(a),
            _ => None,
        }
    }

    /// Value at a full multi-index, if in bounds.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        if index.len() != self.ndim() {
            return None;
        }
        self.view_dyn().get(IxDyn(index)).copied()
    }

    /// Dynamic-rank view.
    pub fn view_dyn(&self) -> ArrayViewD<'_, f32> {
        match self {
            Self::Vector(a) => a.view().into_dyn(),
            Self::Matrix(a) => a.view().into_dyn(),
            Self::Tensor3(a) => a.view().into_dyn(),
            Self::Tensor4(a) => a.view().into_dyn(),
        }
    }

    /// Convert into a dynamic-rank array.
    pub fn into_dyn(self) -> ArrayD<f32> {
        match self {
            Self::Vector(a) => a.into_dyn(),
            Self::Matrix(a) => a.into_dyn(),
            Self::Tensor3(a) => a.into_dyn(),
            Self::Tensor4(a) => a.into_dyn(),
        }
    }

    /// Values in row-major order.
    pub fn to_flat_vec(&self) -> Vec<f32> {
        self.view_dyn().iter().copied().collect()
    }

    /// Take back the row-major buffer.
    pub fn into_raw_vec(self) -> Vec<f32> {
        let array = self.into_dyn();
        if array.is_standard_layout() {
            array.into_raw_vec_and_offset().0
        } else {
            array.iter().copied().collect()
        }
    }
}

/// Reject shapes outside rank 1..=4.
pub(crate) fn check_rank(shape: &[u64]) -> Result<()> {
    if shape.is_empty() || shape.len() > 4 {
        return Err(XgbError::Shape(format!(
            "unsupported prediction rank {} (shape {shape:?})",
            shape.len()
        )));
    }
    Ok(())
}

/// Number of elements described by `shape`.
///
/// # Errors
///
/// `Overflow` if the product does not fit in `usize` or the `f32` buffer would
/// exceed `isize::MAX` bytes.
pub fn element_count(shape: &[u64]) -> Result<usize> {
    let overflow = || XgbError::Overflow {
        dims: shape.to_vec(),
    };
    let count = shape
        .iter()
        .try_fold(1usize, |acc, &d| {
            usize::try_from(d).ok().and_then(|d| acc.checked_mul(d))
        })
        .ok_or_else(overflow)?;
    let bytes = count
        .checked_mul(std::mem::size_of::<f32>())
        .ok_or_else(overflow)?;
    if bytes > isize::MAX as usize {
        return Err(overflow());
    }
    Ok(count)
}
