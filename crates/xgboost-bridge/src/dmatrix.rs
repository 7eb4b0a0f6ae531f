//! Native feature matrix.
//!
//! [`DMatrix`] owns one native matrix built from dense row-major `f32` data.
//! Labels, weights and per-column metadata live on the native side only:
//! every setter forwards immediately and every getter copies the current
//! native value, so there is nothing local that could drift out of sync.
//!
//! # Example
//!
//! ```no_run
//! use xgboost_bridge::DMatrix;
//!
//! let rows: Vec<Vec<f32>> = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
//! let labels = [0.0, 1.0];
//! let mut dtrain = DMatrix::from_rows(&rows, Some(&labels[..])).unwrap();
//! dtrain.set_feature_names(&["age", "income"]).unwrap();
//! assert_eq!(dtrain.labels().unwrap(), vec![0.0, 1.0]);
//! ```

use std::ffi::{c_char, CStr, CString};
use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView2;

use crate::error::{xgb_call, Result, XgbError};
use crate::handle::{MatrixKind, NativeHandle};
use crate::sys::{self, BstUlong, DMatrixHandle};

// =============================================================================
// Field Names
// =============================================================================

/// Named string metadata stored per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureInfo {
    /// Column names (`feature_name`).
    Name,
    /// Column types (`feature_type`).
    Type,
}

impl FeatureInfo {
    /// Native field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "feature_name",
            Self::Type => "feature_type",
        }
    }
}

/// Column type as understood by the native library.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeatureType {
    /// Quantitative (float) feature, `"q"`.
    #[default]
    Quantitative,
    /// Integer feature, `"int"`.
    Integer,
    /// Binary indicator feature, `"i"`.
    Indicator,
    /// Categorical feature, `"c"`.
    Categorical,
    /// Any other type string reported by the library.
    Other(String),
}

impl FeatureType {
    /// Native type string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Quantitative => "q",
            Self::Integer => "int",
            Self::Indicator => "i",
            Self::Categorical => "c",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for FeatureType {
    fn from(s: &str) -> Self {
        match s {
            "q" | "float" => Self::Quantitative,
            "int" => Self::Integer,
            "i" => Self::Indicator,
            "c" => Self::Categorical,
            other => Self::Other(other.to_string()),
        }
    }
}

impl FromStr for FeatureType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// DMatrix
// =============================================================================

/// Owned native feature matrix.
#[derive(Debug)]
pub struct DMatrix {
    handle: NativeHandle<MatrixKind>,
    missing: f32,
}

impl DMatrix {
    /// Create a matrix from a flat row-major buffer.
    ///
    /// `missing` marks absent values; use `f32::NAN` for the usual sentinel.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `data.len() != n_rows * n_cols`, `NativeCall` if
    /// the library rejects the data.
    pub fn from_dense(data: &[f32], n_rows: usize, n_cols: usize, missing: f32) -> Result<Self> {
        let expected = n_rows.checked_mul(n_cols).ok_or_else(|| {
            XgbError::InvalidArgument(format!("{n_rows} x {n_cols} matrix is too large"))
        })?;
        if data.len() != expected {
            return Err(XgbError::InvalidArgument(format!(
                "buffer has {} values, expected {n_rows} x {n_cols} = {expected}",
                data.len()
            )));
        }

        let api = sys::api()?;
        let mut out: DMatrixHandle = std::ptr::null_mut();
        xgb_call!(
            api,
            XGDMatrixCreateFromMat(
                data.as_ptr(),
                n_rows as BstUlong,
                n_cols as BstUlong,
                missing,
                &mut out
            )
        )?;
        // SAFETY: the creation call succeeded and we are the only owner.
        let handle = unsafe { NativeHandle::from_raw(out)? };
        tracing::trace!(n_rows, n_cols, "created DMatrix");
        Ok(Self { handle, missing })
    }

    /// Create a matrix from row vectors, with optional labels.
    ///
    /// Shape is inferred from the input; missing values are NaN.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the rows have different lengths or `labels` does
    /// not have one entry per row.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R], labels: Option<&[f32]>) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, |r| r.as_ref().len());
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.as_ref().len() != n_cols)
        {
            return Err(XgbError::InvalidArgument(format!(
                "rows are not rectangular: row {i} has {} values, row 0 has {n_cols}",
                row.as_ref().len()
            )));
        }
        if let Some(labels) = labels {
            check_row_field("label", labels.len(), n_rows)?;
        }

        let flat: Vec<f32> = rows.iter().flat_map(|r| r.as_ref().iter().copied()).collect();
        let mut dmat = Self::from_dense(&flat, n_rows, n_cols, f32::NAN)?;
        if let Some(labels) = labels {
            dmat.set_labels(labels)?;
        }
        Ok(dmat)
    }

    /// Create a matrix from a 2-D array view of any memory layout.
    pub fn from_array(data: ArrayView2<'_, f32>, missing: f32) -> Result<Self> {
        let (n_rows, n_cols) = data.dim();
        match data.as_slice() {
            Some(slice) => Self::from_dense(slice, n_rows, n_cols, missing),
            None => {
                let owned = data.as_standard_layout();
                let slice = owned.as_slice().ok_or_else(|| {
                    XgbError::InvalidArgument("array is not contiguous".to_string())
                })?;
                Self::from_dense(slice, n_rows, n_cols, missing)
            }
        }
    }

    /// Missing-value sentinel used at construction.
    pub fn missing(&self) -> f32 {
        self.missing
    }

    /// Number of rows held by the native matrix.
    pub fn n_rows(&self) -> Result<usize> {
        let mut out: BstUlong = 0;
        xgb_call!(sys::api()?, XGDMatrixNumRow(self.as_ptr()?, &mut out))?;
        Ok(out as usize)
    }

    /// Number of columns held by the native matrix.
    pub fn n_cols(&self) -> Result<usize> {
        let mut out: BstUlong = 0;
        xgb_call!(sys::api()?, XGDMatrixNumCol(self.as_ptr()?, &mut out))?;
        Ok(out as usize)
    }

    pub(crate) fn as_ptr(&self) -> Result<DMatrixHandle> {
        self.handle.as_ptr()
    }

    /// Release the native matrix now. Later calls return `Disposed`.
    pub fn free(&mut self) -> Result<()> {
        self.handle.free()
    }

    /// True after [`free`](Self::free).
    pub fn is_freed(&self) -> bool {
        self.handle.is_invalid()
    }

    // =========================================================================
    // Float Fields
    // =========================================================================

    /// Copy a named float field (`label`, `weight`, `base_margin`, ...).
    pub fn get_float_info(&self, field: &str) -> Result<Vec<f32>> {
        let field = to_cstring(field)?;
        let mut len: BstUlong = 0;
        let mut dptr: *const f32 = std::ptr::null();
        xgb_call!(
            sys::api()?,
            XGDMatrixGetFloatInfo(self.as_ptr()?, field.as_ptr(), &mut len, &mut dptr)
        )?;
        // SAFETY: on success the library reports `len` floats at `dptr`,
        // valid until the next call on this matrix.
        Ok(unsafe { copy_slice(dptr, len) })
    }

    /// Replace a named float field. The exact slice length is passed through.
    pub fn set_float_info(&mut self, field: &str, values: &[f32]) -> Result<()> {
        let field = to_cstring(field)?;
        xgb_call!(
            sys::api()?,
            XGDMatrixSetFloatInfo(
                self.as_ptr()?,
                field.as_ptr(),
                values.as_ptr(),
                values.len() as BstUlong
            )
        )
    }

    /// Labels (one per row).
    pub fn labels(&self) -> Result<Vec<f32>> {
        self.get_float_info("label")
    }

    /// Set labels (one per row).
    pub fn set_labels(&mut self, labels: &[f32]) -> Result<()> {
        self.set_float_info("label", labels)
    }

    /// Instance weights.
    pub fn weights(&self) -> Result<Vec<f32>> {
        self.get_float_info("weight")
    }

    /// Set instance weights.
    pub fn set_weights(&mut self, weights: &[f32]) -> Result<()> {
        self.set_float_info("weight", weights)
    }

    /// Base margin used as the starting prediction.
    pub fn base_margin(&self) -> Result<Vec<f32>> {
        self.get_float_info("base_margin")
    }

    /// Set the base margin.
    pub fn set_base_margin(&mut self, margin: &[f32]) -> Result<()> {
        self.set_float_info("base_margin", margin)
    }

    // =========================================================================
    // String Feature Fields
    // =========================================================================

    /// Copy per-column string metadata.
    pub fn get_str_feature_info(&self, info: FeatureInfo) -> Result<Vec<String>> {
        let field = to_cstring(info.as_str())?;
        let mut len: BstUlong = 0;
        let mut strings: *mut *const c_char = std::ptr::null_mut();
        xgb_call!(
            sys::api()?,
            XGDMatrixGetStrFeatureInfo(self.as_ptr()?, field.as_ptr(), &mut len, &mut strings)
        )?;
        // SAFETY: on success `strings` holds `len` NUL-terminated strings
        // owned by the library until the next call.
        unsafe { copy_strings(strings, len) }
    }

    /// Replace per-column string metadata.
    ///
    /// All values are validated before the native call, so a string with an
    /// interior NUL leaves the matrix untouched.
    pub fn set_str_feature_info<S: AsRef<str>>(&mut self, info: FeatureInfo, values: &[S]) -> Result<()> {
        let field = to_cstring(info.as_str())?;
        let owned = values
            .iter()
            .map(|v| to_cstring(v.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let mut ptrs: Vec<*const c_char> = owned.iter().map(|s| s.as_ptr()).collect();
        xgb_call!(
            sys::api()?,
            XGDMatrixSetStrFeatureInfo(
                self.as_ptr()?,
                field.as_ptr(),
                ptrs.as_mut_ptr(),
                ptrs.len() as BstUlong
            )
        )
    }

    /// Column names.
    pub fn feature_names(&self) -> Result<Vec<String>> {
        self.get_str_feature_info(FeatureInfo::Name)
    }

    /// Set column names.
    pub fn set_feature_names<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        self.set_str_feature_info(FeatureInfo::Name, names)
    }

    /// Column types.
    pub fn feature_types(&self) -> Result<Vec<FeatureType>> {
        Ok(self
            .get_str_feature_info(FeatureInfo::Type)?
            .iter()
            .map(|s| FeatureType::from(s.as_str()))
            .collect())
    }

    /// Set column types.
    pub fn set_feature_types(&mut self, types: &[FeatureType]) -> Result<()> {
        let strings: Vec<&str> = types.iter().map(FeatureType::as_str).collect();
        self.set_str_feature_info(FeatureInfo::Type, &strings)
    }
}

// =============================================================================
// Marshaling Helpers
// =============================================================================

fn check_row_field(field: &str, len: usize, n_rows: usize) -> Result<()> {
    if len == n_rows {
        Ok(())
    } else {
        Err(XgbError::InvalidArgument(format!(
            "{field} has {len} values but the matrix has {n_rows} rows"
        )))
    }
}

/// Convert to a C string, rejecting interior NUL bytes.
pub(crate) fn to_cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|e| {
        XgbError::InvalidArgument(format!(
            "string {s:?} contains a NUL byte at position {}",
            e.nul_position()
        ))
    })
}

/// Copy a native float buffer into owned memory.
///
/// # Safety
///
/// `ptr` must point to `len` readable floats, or `len` must be zero.
pub(crate) unsafe fn copy_slice<T: Copy>(ptr: *const T, len: BstUlong) -> Vec<T> {
    if len == 0 || ptr.is_null() {
        return Vec::new();
    }
    std::slice::from_raw_parts(ptr, len as usize).to_vec()
}

/// Copy a native array of C strings into owned strings.
///
/// # Safety
///
/// `ptr` must point to `len` valid NUL-terminated strings, or `len` must be zero.
pub(crate) unsafe fn copy_strings(ptr: *const *const c_char, len: BstUlong) -> Result<Vec<String>> {
    if len == 0 || ptr.is_null() {
        return Ok(Vec::new());
    }
    std::slice::from_raw_parts(ptr, len as usize)
        .iter()
        .map(|&s| -> Result<String> { Ok(CStr::from_ptr(s).to_str()?.to_owned()) })
        .collect()
}
