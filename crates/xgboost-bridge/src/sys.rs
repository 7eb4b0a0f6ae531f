//! Native XGBoost entry points.
//!
//! The library is opened at runtime with `libloading`, so the crate builds and
//! links without XGBoost present. A missing library or symbol surfaces as
//! [`XgbError::Platform`] the first time a native object is created.
//!
//! Resolution order for the library file:
//!
//! 1. An explicit path given through [`LibraryConfig`] and [`init`].
//! 2. `XGBOOST_LIB_PATH`: full path to the shared library.
//! 3. `XGBOOST_LIB_DIR`: directory containing the platform library file.
//! 4. The platform library name (`libxgboost.so`, `libxgboost.dylib`,
//!    `xgboost.dll`), looked up by the system loader.
//!
//! The library is loaded once and stays loaded for the life of the process.

use std::ffi::{c_char, c_int, c_void};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use bon::Builder;
use libloading::Library;

use crate::error::{Result, XgbError};

/// Native unsigned length type (`bst_ulong`).
pub type BstUlong = u64;
/// Opaque native matrix handle.
pub type DMatrixHandle = *mut c_void;
/// Opaque native booster handle.
pub type BoosterHandle = *mut c_void;

/// Environment variable holding the full path of the shared library.
pub const LIB_PATH_ENV: &str = "XGBOOST_LIB_PATH";
/// Environment variable holding the directory of the shared library.
pub const LIB_DIR_ENV: &str = "XGBOOST_LIB_DIR";

// =============================================================================
// Entry Points
// =============================================================================

macro_rules! native_api {
    ($(
        $(#[$meta:meta])*
        fn $name:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty;
    )*) => {
        /// Function table resolved from the native library.
        ///
        /// Field names match the C symbols. The owning [`Library`] is kept
        /// alongside so the pointers stay valid.
        #[allow(non_snake_case)]
        pub struct NativeApi {
            _library: Library,
            $(
                $(#[$meta])*
                pub $name: unsafe extern "C" fn($($arg: $ty),*) -> $ret,
            )*
        }

        impl NativeApi {
            /// Resolve every entry point from `library`.
            #[allow(non_snake_case)]
            fn resolve(library: Library, path: &Path) -> Result<Self> {
                $(
                    // SAFETY: the signature matches the XGBoost C API declaration.
                    let $name = unsafe {
                        *library
                            .get::<unsafe extern "C" fn($($ty),*) -> $ret>(
                                concat!(stringify!($name), "\0").as_bytes(),
                            )
                            .map_err(|e| XgbError::Platform {
                                path: path.display().to_string(),
                                message: format!("missing symbol {}: {e}", stringify!($name)),
                            })?
                    };
                )*
                Ok(Self { _library: library, $($name,)* })
            }
        }
    };
}

native_api! {
    /// `const char *XGBGetLastError()`
    fn XGBGetLastError() -> *const c_char;
    /// `void XGBoostVersion(int *major, int *minor, int *patch)`
    fn XGBoostVersion(major: *mut c_int, minor: *mut c_int, patch: *mut c_int) -> ();

    fn XGDMatrixCreateFromMat(
        data: *const f32,
        nrow: BstUlong,
        ncol: BstUlong,
        missing: f32,
        out: *mut DMatrixHandle,
    ) -> c_int;
    fn XGDMatrixFree(handle: DMatrixHandle) -> c_int;
    fn XGDMatrixNumRow(handle: DMatrixHandle, out: *mut BstUlong) -> c_int;
    fn XGDMatrixNumCol(handle: DMatrixHandle, out: *mut BstUlong) -> c_int;
    fn XGDMatrixGetFloatInfo(
        handle: DMatrixHandle,
        field: *const c_char,
        out_len: *mut BstUlong,
        out_dptr: *mut *const f32,
    ) -> c_int;
    fn XGDMatrixSetFloatInfo(
        handle: DMatrixHandle,
        field: *const c_char,
        array: *const f32,
        len: BstUlong,
    ) -> c_int;
    fn XGDMatrixGetStrFeatureInfo(
        handle: DMatrixHandle,
        field: *const c_char,
        size: *mut BstUlong,
        out_features: *mut *mut *const c_char,
    ) -> c_int;
    fn XGDMatrixSetStrFeatureInfo(
        handle: DMatrixHandle,
        field: *const c_char,
        features: *mut *const c_char,
        size: BstUlong,
    ) -> c_int;

    fn XGBoosterCreate(dmats: *const DMatrixHandle, len: BstUlong, out: *mut BoosterHandle) -> c_int;
    fn XGBoosterFree(handle: BoosterHandle) -> c_int;
    fn XGBoosterSetParam(handle: BoosterHandle, name: *const c_char, value: *const c_char) -> c_int;
    fn XGBoosterUpdateOneIter(handle: BoosterHandle, iter: c_int, dtrain: DMatrixHandle) -> c_int;
    /// Legacy fixed-shape prediction. `training` only matters for DART.
    fn XGBoosterPredict(
        handle: BoosterHandle,
        dmat: DMatrixHandle,
        option_mask: c_int,
        ntree_limit: u32,
        training: c_int,
        out_len: *mut BstUlong,
        out_result: *mut *const f32,
    ) -> c_int;
    fn XGBoosterPredictFromDMatrix(
        handle: BoosterHandle,
        dmat: DMatrixHandle,
        config: *const c_char,
        out_shape: *mut *const BstUlong,
        out_dim: *mut BstUlong,
        out_result: *mut *const f32,
    ) -> c_int;
    fn XGBoosterSaveModel(handle: BoosterHandle, fname: *const c_char) -> c_int;
    fn XGBoosterLoadModel(handle: BoosterHandle, fname: *const c_char) -> c_int;
    fn XGBoosterSaveModelToBuffer(
        handle: BoosterHandle,
        config: *const c_char,
        out_len: *mut BstUlong,
        out_dptr: *mut *const c_char,
    ) -> c_int;
    fn XGBoosterLoadModelFromBuffer(handle: BoosterHandle, buf: *const c_void, len: BstUlong) -> c_int;
    fn XGBoosterDumpModelEx(
        handle: BoosterHandle,
        fmap: *const c_char,
        with_stats: c_int,
        format: *const c_char,
        out_len: *mut BstUlong,
        out_dump_array: *mut *mut *const c_char,
    ) -> c_int;
    fn XGBoosterFeatureScore(
        handle: BoosterHandle,
        config: *const c_char,
        out_n_features: *mut BstUlong,
        out_features: *mut *mut *const c_char,
        out_dim: *mut BstUlong,
        out_shape: *mut *const BstUlong,
        out_scores: *mut *const f32,
    ) -> c_int;
    fn XGBoosterBoostedRounds(handle: BoosterHandle, out: *mut c_int) -> c_int;
    fn XGBoosterGetNumFeature(handle: BoosterHandle, out: *mut BstUlong) -> c_int;
    fn XGBoosterSaveJsonConfig(
        handle: BoosterHandle,
        out_len: *mut BstUlong,
        out_str: *mut *const c_char,
    ) -> c_int;
}

// SAFETY: the table holds plain function pointers and the library handle,
// both of which may be shared between threads.
unsafe impl Send for NativeApi {}
unsafe impl Sync for NativeApi {}

// =============================================================================
// Library Configuration
// =============================================================================

/// Where to find the native library.
///
/// # Example
///
/// ```no_run
/// use xgboost_bridge::sys::{self, LibraryConfig};
///
/// let config = LibraryConfig::builder()
///     .path("/opt/xgboost/lib/libxgboost.so")
///     .build();
/// sys::init(&config).unwrap();
/// ```
#[derive(Debug, Clone, Default, Builder)]
pub struct LibraryConfig {
    /// Explicit library file. Takes precedence over the environment.
    #[builder(into)]
    pub path: Option<PathBuf>,

    /// Directory to search for the platform library file.
    #[builder(into)]
    pub dir: Option<PathBuf>,
}

impl LibraryConfig {
    /// Configuration taken from `XGBOOST_LIB_PATH` / `XGBOOST_LIB_DIR`.
    pub fn from_env() -> Self {
        Self {
            path: std::env::var_os(LIB_PATH_ENV).map(PathBuf::from),
            dir: std::env::var_os(LIB_DIR_ENV).map(PathBuf::from),
        }
    }

    /// Library files to try, in order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let file_name = libloading::library_filename("xgboost");
        let mut candidates = Vec::with_capacity(3);
        if let Some(path) = &self.path {
            candidates.push(path.clone());
        }
        if let Some(dir) = &self.dir {
            candidates.push(dir.join(&file_name));
        }
        candidates.push(PathBuf::from(file_name));
        candidates
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Failed load, kept so repeated lookups report the same cause.
#[derive(Debug, Clone)]
struct LoadFailure {
    path: String,
    message: String,
}

static API: OnceLock<std::result::Result<NativeApi, LoadFailure>> = OnceLock::new();

/// Load the native library using `config`, once per process.
///
/// If the library was already loaded (or a load already failed), that
/// outcome is returned and `config` is ignored.
pub fn init(config: &LibraryConfig) -> Result<&'static NativeApi> {
    API.get_or_init(|| {
        load(config).map_err(|e| match e {
            XgbError::Platform { path, message } => LoadFailure { path, message },
            other => LoadFailure {
                path: String::new(),
                message: other.to_string(),
            },
        })
    })
    .as_ref()
    .map_err(|f| XgbError::Platform {
        path: f.path.clone(),
        message: f.message.clone(),
    })
}

/// The process-wide function table, loading from the environment on first use.
pub fn api() -> Result<&'static NativeApi> {
    init(&LibraryConfig::from_env())
}

/// Open the first loadable candidate from `config` and resolve its symbols.
///
/// This does not touch the process-wide table; it is mainly useful for
/// checking a library file before calling [`init`].
pub fn load(config: &LibraryConfig) -> Result<NativeApi> {
    let mut last_error = None;
    for candidate in config.candidates() {
        // SAFETY: loading XGBoost runs its static initialisers, which have no
        // preconditions on the host process.
        match unsafe { Library::new(&candidate) } {
            Ok(library) => {
                let api = NativeApi::resolve(library, &candidate)?;
                let (major, minor, patch) = version_of(&api);
                tracing::debug!(
                    path = %candidate.display(),
                    version = %format!("{major}.{minor}.{patch}"),
                    "loaded native XGBoost library"
                );
                return Ok(api);
            }
            Err(e) => {
                tracing::trace!(path = %candidate.display(), error = %e, "library candidate rejected");
                last_error = Some(XgbError::Platform {
                    path: candidate.display().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
    Err(last_error.unwrap_or_else(|| XgbError::Platform {
        path: String::new(),
        message: "no library candidates".to_string(),
    }))
}

/// Version of the loaded native library as `(major, minor, patch)`.
pub fn version() -> Result<(i32, i32, i32)> {
    Ok(version_of(api()?))
}

fn version_of(api: &NativeApi) -> (i32, i32, i32) {
    let (mut major, mut minor, mut patch) = (0, 0, 0);
    // SAFETY: the three out-pointers are valid for writes.
    unsafe { (api.XGBoostVersion)(&mut major, &mut minor, &mut patch) };
    (major, minor, patch)
}
