//! Native gradient-boosted model.
//!
//! A [`Booster`] owns one native booster handle. It is created either from
//! training matrices plus [`Params`], or empty and then filled from a saved
//! model. Training advances one round per [`Booster::update`]; prediction,
//! persistence, dumps and feature importance all read the current ensemble.
//!
//! # Example
//!
//! ```no_run
//! use xgboost_bridge::{Booster, DMatrix, ModelFormat, Params, PredictOptions};
//!
//! let rows: Vec<Vec<f32>> = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
//! let dtrain = DMatrix::from_rows(&rows, Some(&[0.0, 1.0][..]))?;
//!
//! let params = Params::new()
//!     .with("objective", "binary:logistic")
//!     .with("max_depth", 2);
//! let booster = Booster::train(&dtrain, &params, 10)?;
//!
//! let probs = booster.predict(&dtrain, &PredictOptions::default())?;
//! let bytes = booster.save_to_buffer(ModelFormat::Ubj)?;
//! let restored = Booster::load_from_buffer(&bytes)?;
//! assert_eq!(restored.predict(&dtrain, &PredictOptions::default())?, probs);
//! # Ok::<(), xgboost_bridge::XgbError>(())
//! ```

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::path::Path;

use indexmap::IndexMap;
use ndarray::Array2;
use serde_json::Value;

use crate::dmatrix::{copy_slice, copy_strings, to_cstring, DMatrix};
use crate::error::{xgb_call, Result, XgbError};
use crate::handle::{BoosterKind, NativeHandle};
use crate::model::{DumpFormat, FeatureMap, FeatureScores, ImportanceType, ModelFormat};
use crate::params::{ParamValue, Params, NUM_CLASS};
use crate::predict::{check_rank, element_count, PredictOptions, Prediction};
use crate::sys::{self, BoosterHandle, BstUlong, DMatrixHandle};

/// Location of the class count in the native JSON config.
const NUM_CLASS_POINTER: &str = "/learner/learner_model_param/num_class";

/// Owned native booster.
#[derive(Debug)]
pub struct Booster {
    handle: NativeHandle<BoosterKind>,
    /// Encoded parameters in application order.
    params: IndexMap<String, String>,
    num_class: usize,
}

impl Booster {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Create a booster caching `dmats` and apply `params` in order.
    ///
    /// # Errors
    ///
    /// `Configuration` if `num_class` is present but not a non-negative integer
    /// (checked before any native call), `Disposed` if a matrix was freed,
    /// `NativeCall` if the library rejects a parameter.
    pub fn new(dmats: &[&DMatrix], params: &Params) -> Result<Self> {
        params.num_class()?;
        let ptrs = dmats
            .iter()
            .map(|d| d.as_ptr())
            .collect::<Result<Vec<DMatrixHandle>>>()?;

        let mut booster = Self::create(&ptrs)?;
        booster.set_params(params)?;
        tracing::debug!(
            n_cached = ptrs.len(),
            n_params = params.len(),
            num_class = booster.num_class,
            "created booster"
        );
        Ok(booster)
    }

    /// Create a booster and run `rounds` boosting rounds on `dtrain`.
    pub fn train(dtrain: &DMatrix, params: &Params, rounds: i32) -> Result<Self> {
        let mut booster = Self::new(&[dtrain], params)?;
        for iteration in 0..rounds {
            booster.update(dtrain, iteration)?;
        }
        tracing::debug!(rounds, "training finished");
        Ok(booster)
    }

    /// Load a model file. The format is detected by the library.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let fname = path_cstring(path)?;
        let mut booster = Self::create(&[])?;
        xgb_call!(
            sys::api()?,
            XGBoosterLoadModel(booster.as_ptr()?, fname.as_ptr())
        )?;
        booster.refresh_num_class()?;
        tracing::debug!(path = %path.display(), num_class = booster.num_class, "loaded model");
        Ok(booster)
    }

    /// Load a model from bytes produced by [`save_to_buffer`](Self::save_to_buffer).
    ///
    /// The slice is only borrowed for the duration of the native call.
    pub fn load_from_buffer(bytes: &[u8]) -> Result<Self> {
        let mut booster = Self::create(&[])?;
        xgb_call!(
            sys::api()?,
            XGBoosterLoadModelFromBuffer(
                booster.as_ptr()?,
                bytes.as_ptr() as *const c_void,
                bytes.len() as BstUlong
            )
        )?;
        booster.refresh_num_class()?;
        tracing::debug!(len = bytes.len(), num_class = booster.num_class, "loaded model from buffer");
        Ok(booster)
    }

    fn create(dmats: &[DMatrixHandle]) -> Result<Self> {
        let mut out: BoosterHandle = std::ptr::null_mut();
        let dmats_ptr = if dmats.is_empty() {
            std::ptr::null()
        } else {
            dmats.as_ptr()
        };
        xgb_call!(
            sys::api()?,
            XGBoosterCreate(dmats_ptr, dmats.len() as BstUlong, &mut out)
        )?;
        // SAFETY: the creation call succeeded and we are the only owner.
        let handle = unsafe { NativeHandle::from_raw(out)? };
        Ok(Self {
            handle,
            params: IndexMap::new(),
            num_class: 1,
        })
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    /// Set one parameter. Setting `num_class` also updates the cached class
    /// count.
    pub fn set_param(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<()> {
        let value = value.into();
        let num_class = if name == NUM_CLASS {
            Params::new().with(NUM_CLASS, value.clone()).num_class()?
        } else {
            None
        };

        let encoded = value.encode();
        let c_name = to_cstring(name)?;
        let c_value = to_cstring(&encoded)?;
        xgb_call!(
            sys::api()?,
            XGBoosterSetParam(self.as_ptr()?, c_name.as_ptr(), c_value.as_ptr())
        )?;
        tracing::trace!(name, value = %encoded, "set parameter");

        if let Some(n) = num_class {
            self.num_class = n;
        }
        self.params.insert(name.to_string(), encoded);
        Ok(())
    }

    /// Set every parameter in order. Stops at the first failure.
    pub fn set_params(&mut self, params: &Params) -> Result<()> {
        for (name, value) in params.iter() {
            self.set_param(name, value.clone())?;
        }
        Ok(())
    }

    /// Parameters applied through this handle, as encoded strings.
    ///
    /// Parameters stored inside a loaded model are not listed; use
    /// [`save_config`](Self::save_config) for the full native view.
    pub fn params(&self) -> &IndexMap<String, String> {
        &self.params
    }

    /// Cached number of classes (1 for single-output models).
    pub fn num_class(&self) -> usize {
        self.num_class
    }

    // =========================================================================
    // Training
    // =========================================================================

    /// Run one boosting round on `dtrain`.
    pub fn update(&mut self, dtrain: &DMatrix, iteration: i32) -> Result<()> {
        xgb_call!(
            sys::api()?,
            XGBoosterUpdateOneIter(self.as_ptr()?, iteration, dtrain.as_ptr()?)
        )?;
        tracing::trace!(iteration, "boosting round done");
        Ok(())
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Predict with the shaped API and decode the result.
    pub fn predict(&self, dmat: &DMatrix, options: &PredictOptions) -> Result<Prediction> {
        let config = to_cstring(&options.to_json()?)?;
        let mut shape_ptr: *const BstUlong = std::ptr::null();
        let mut dim: BstUlong = 0;
        let mut result: *const f32 = std::ptr::null();
        xgb_call!(
            sys::api()?,
            XGBoosterPredictFromDMatrix(
                self.as_ptr()?,
                dmat.as_ptr()?,
                config.as_ptr(),
                &mut shape_ptr,
                &mut dim,
                &mut result
            )
        )?;

        // SAFETY: on success the library reports `dim` shape entries and the
        // matching number of floats, valid until the next call on this booster.
        let shape = unsafe { copy_slice(shape_ptr, dim) };
        check_rank(&shape)?;
        let count = element_count(&shape)?;
        let values = unsafe { copy_slice(result, count as BstUlong) };
        tracing::trace!(?shape, kind = ?options.predict_type(), "decoded prediction");
        Prediction::from_raw(values, &shape)
    }

    /// Plain predictions through the legacy fixed-shape call.
    ///
    /// For multi-class models the values are row-major `n_rows * num_class`.
    pub fn predict_flat(&self, dmat: &DMatrix) -> Result<Vec<f32>> {
        let mut len: BstUlong = 0;
        let mut result: *const f32 = std::ptr::null();
        xgb_call!(
            sys::api()?,
            XGBoosterPredict(self.as_ptr()?, dmat.as_ptr()?, 0, 0, 0, &mut len, &mut result)
        )?;
        // SAFETY: on success `result` holds `len` floats.
        Ok(unsafe { copy_slice(result, len) })
    }

    /// Legacy predictions reshaped to `[n_rows, num_class]` using the cached
    /// class count.
    pub fn predict_flat_by_class(&self, dmat: &DMatrix) -> Result<Array2<f32>> {
        reshape_by_class(self.predict_flat(dmat)?, self.num_class)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Save to a `.json` or `.ubj` file.
    ///
    /// # Errors
    ///
    /// `Configuration` for any other extension, before touching the library.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = ModelFormat::from_path(path)?;
        let fname = path_cstring(path)?;
        xgb_call!(
            sys::api()?,
            XGBoosterSaveModel(self.as_ptr()?, fname.as_ptr())
        )?;
        tracing::debug!(path = %path.display(), %format, "saved model");
        Ok(())
    }

    /// Serialize the model to bytes.
    pub fn save_to_buffer(&self, format: ModelFormat) -> Result<Vec<u8>> {
        let config = to_cstring(&format.buffer_config())?;
        let mut len: BstUlong = 0;
        let mut data: *const c_char = std::ptr::null();
        xgb_call!(
            sys::api()?,
            XGBoosterSaveModelToBuffer(self.as_ptr()?, config.as_ptr(), &mut len, &mut data)
        )?;
        // SAFETY: on success `data` holds `len` bytes owned by the library.
        let bytes = unsafe { copy_slice(data as *const u8, len) };
        tracing::debug!(%format, len = bytes.len(), "saved model to buffer");
        Ok(bytes)
    }

    /// Full native configuration as JSON text.
    pub fn save_config(&self) -> Result<String> {
        let mut len: BstUlong = 0;
        let mut data: *const c_char = std::ptr::null();
        xgb_call!(
            sys::api()?,
            XGBoosterSaveJsonConfig(self.as_ptr()?, &mut len, &mut data)
        )?;
        // SAFETY: on success `data` holds `len` bytes of JSON text.
        let bytes = unsafe { copy_slice(data as *const u8, len) };
        String::from_utf8(bytes).map_err(|e| XgbError::Utf8(e.utf8_error()))
    }

    fn refresh_num_class(&mut self) -> Result<()> {
        let config: Value = serde_json::from_str(&self.save_config()?)?;
        self.num_class = num_class_from_config(&config);
        Ok(())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Text dump of every tree, each prefixed with `booster[i]\n`.
    pub fn dump_model(&self, fmap: Option<&FeatureMap>, with_stats: bool) -> Result<Vec<String>> {
        self.dump_model_ex(fmap, with_stats, DumpFormat::Text)
    }

    /// Dump every tree in `format`, in ensemble order.
    ///
    /// Text dumps carry the `booster[i]\n` prefix; JSON and dot dumps are
    /// returned as produced so each entry stays parseable.
    pub fn dump_model_ex(
        &self,
        fmap: Option<&FeatureMap>,
        with_stats: bool,
        format: DumpFormat,
    ) -> Result<Vec<String>> {
        // The file only has to outlive the native call.
        let fmap_file = fmap.map(FeatureMap::to_temp_file).transpose()?;
        let fmap_path = match &fmap_file {
            Some(file) => path_cstring(file.path())?,
            None => to_cstring("")?,
        };
        let dumps = self.dump_with_fmap(&fmap_path, with_stats, format)?;
        drop(fmap_file);
        Ok(dumps)
    }

    /// Dump every tree in `format`, naming features from an existing fmap
    /// file (`<index>\t<name>\t<type>` per line).
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `fmap` is not an existing file or not valid
    /// UTF-8, `NativeCall` if the library rejects its contents.
    pub fn dump_model_with_fmap_file(
        &self,
        fmap: impl AsRef<Path>,
        with_stats: bool,
        format: DumpFormat,
    ) -> Result<Vec<String>> {
        let fmap = fmap.as_ref();
        if !fmap.is_file() {
            return Err(XgbError::InvalidArgument(format!(
                "feature map {} is not a file",
                fmap.display()
            )));
        }
        self.dump_with_fmap(&path_cstring(fmap)?, with_stats, format)
    }

    fn dump_with_fmap(&self, fmap_path: &CStr, with_stats: bool, format: DumpFormat) -> Result<Vec<String>> {
        let c_format = to_cstring(format.as_str())?;

        let mut len: BstUlong = 0;
        let mut dumps: *mut *const c_char = std::ptr::null_mut();
        xgb_call!(
            sys::api()?,
            XGBoosterDumpModelEx(
                self.as_ptr()?,
                fmap_path.as_ptr(),
                c_int::from(with_stats),
                c_format.as_ptr(),
                &mut len,
                &mut dumps
            )
        )?;
        // SAFETY: on success `dumps` holds `len` NUL-terminated strings.
        let dumps = unsafe { copy_strings(dumps, len)? };

        Ok(match format {
            DumpFormat::Text => label_dumps(dumps),
            DumpFormat::Json | DumpFormat::Dot => dumps,
        })
    }

    /// Feature importance of every feature used in at least one split.
    pub fn feature_score(&self, importance: ImportanceType) -> Result<FeatureScores> {
        let config = to_cstring(&importance.score_config())?;
        let mut n_features: BstUlong = 0;
        let mut features: *mut *const c_char = std::ptr::null_mut();
        let mut dim: BstUlong = 0;
        let mut shape_ptr: *const BstUlong = std::ptr::null();
        let mut scores_ptr: *const f32 = std::ptr::null();
        xgb_call!(
            sys::api()?,
            XGBoosterFeatureScore(
                self.as_ptr()?,
                config.as_ptr(),
                &mut n_features,
                &mut features,
                &mut dim,
                &mut shape_ptr,
                &mut scores_ptr
            )
        )?;

        // SAFETY: on success all out-pointers describe library-owned arrays
        // of the reported lengths.
        let names = unsafe { copy_strings(features, n_features)? };
        let shape = unsafe { copy_slice(shape_ptr, dim) };
        let count = element_count(&shape)?;
        let scores = unsafe { copy_slice(scores_ptr, count as BstUlong) };
        FeatureScores::from_native(names, &shape, scores)
    }

    /// Number of features the model was trained on.
    pub fn num_features(&self) -> Result<usize> {
        let mut out: BstUlong = 0;
        xgb_call!(sys::api()?, XGBoosterGetNumFeature(self.as_ptr()?, &mut out))?;
        Ok(out as usize)
    }

    /// Number of completed boosting rounds.
    pub fn boosted_rounds(&self) -> Result<usize> {
        let mut out: c_int = 0;
        xgb_call!(sys::api()?, XGBoosterBoostedRounds(self.as_ptr()?, &mut out))?;
        Ok(out.max(0) as usize)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Release the native booster now. Later calls return `Disposed`.
    pub fn free(&mut self) -> Result<()> {
        self.handle.free()
    }

    /// True after [`free`](Self::free).
    pub fn is_freed(&self) -> bool {
        self.handle.is_invalid()
    }

    fn as_ptr(&self) -> Result<BoosterHandle> {
        self.handle.as_ptr()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn path_cstring(path: &Path) -> Result<CString> {
    let s = path.to_str().ok_or_else(|| {
        XgbError::InvalidArgument(format!("path {} is not valid UTF-8", path.display()))
    })?;
    to_cstring(s)
}

/// Class count stored in a native config, at least 1.
///
/// The library stores it as a string; `"0"` means a single output.
fn num_class_from_config(config: &Value) -> usize {
    let n = match config.pointer(NUM_CLASS_POINTER) {
        Some(Value::String(s)) => s.parse::<usize>().unwrap_or(0),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as usize,
        _ => 0,
    };
    n.max(1)
}

fn reshape_by_class(flat: Vec<f32>, num_class: usize) -> Result<Array2<f32>> {
    let num_class = num_class.max(1);
    if flat.len() % num_class != 0 {
        return Err(XgbError::Shape(format!(
            "{} predictions cannot be split into {num_class} classes",
            flat.len()
        )));
    }
    let n_rows = flat.len() / num_class;
    Array2::from_shape_vec((n_rows, num_class), flat).map_err(|e| XgbError::Shape(e.to_string()))
}

fn label_dumps(dumps: Vec<String>) -> Vec<String> {
    dumps
        .into_iter()
        .enumerate()
        .map(|(i, tree)| format!("booster[{i}]\n{tree}"))
        .collect()
}
