//! Model persistence and introspection types.
//!
//! Formats and option enums that cross the native boundary as short strings,
//! plus the decoded forms of feature importance and the feature map used to
//! annotate model dumps.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use tempfile::NamedTempFile;

use crate::dmatrix::FeatureType;
use crate::error::{Result, XgbError};

// =============================================================================
// ModelFormat
// =============================================================================

/// Serialized model format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelFormat {
    /// Text JSON.
    #[default]
    Json,
    /// Universal Binary JSON.
    Ubj,
}

impl ModelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Ubj => "ubj",
        }
    }

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// Format implied by a file extension.
    ///
    /// # Errors
    ///
    /// `Configuration` for a missing or unknown extension. The native library
    /// would otherwise fall back to a deprecated binary format.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                XgbError::Configuration(format!(
                    "model path {} has no extension; use .json or .ubj",
                    path.display()
                ))
            })?;
        ext.to_ascii_lowercase().parse().map_err(|_| {
            XgbError::Configuration(format!(
                "unsupported model extension .{ext} in {}; use .json or .ubj",
                path.display()
            ))
        })
    }

    /// Config for `XGBoosterSaveModelToBuffer`.
    pub(crate) fn buffer_config(&self) -> String {
        serde_json::json!({ "format": self.as_str() }).to_string()
    }
}

impl FromStr for ModelFormat {
    type Err = XgbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "ubj" => Ok(Self::Ubj),
            other => Err(XgbError::Configuration(format!(
                "unknown model format '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// DumpFormat
// =============================================================================

/// Output format of a model dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpFormat {
    #[default]
    Text,
    Json,
    /// Graphviz.
    Dot,
}

impl DumpFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Dot => "dot",
        }
    }
}

// =============================================================================
// Feature Importance
// =============================================================================

/// How feature importance is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImportanceType {
    /// Number of splits on the feature.
    #[default]
    Weight,
    /// Average gain of splits on the feature.
    Gain,
    /// Average coverage of splits on the feature.
    Cover,
    TotalGain,
    TotalCover,
}

impl ImportanceType {
    pub const ALL: [Self; 5] = [
        Self::Weight,
        Self::Gain,
        Self::Cover,
        Self::TotalGain,
        Self::TotalCover,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weight => "weight",
            Self::Gain => "gain",
            Self::Cover => "cover",
            Self::TotalGain => "total_gain",
            Self::TotalCover => "total_cover",
        }
    }

    /// Config for `XGBoosterFeatureScore`.
    pub(crate) fn score_config(&self) -> String {
        serde_json::json!({
            "importance_type": self.as_str(),
            "feature_map": "",
        })
        .to_string()
    }
}

impl FromStr for ImportanceType {
    type Err = XgbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| XgbError::Configuration(format!("unknown importance type '{s}'")))
    }
}

impl fmt::Display for ImportanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Importance of one feature.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureScore {
    Scalar(f32),
    /// One score per output group (multi-class linear models).
    PerClass(Vec<f32>),
}

impl FeatureScore {
    /// The scalar score, or the sum over classes.
    pub fn total(&self) -> f32 {
        match self {
            Self::Scalar(v) => *v,
            Self::PerClass(v) => v.iter().sum(),
        }
    }
}

/// Feature name to importance, in the order the library reports them.
///
/// Features never used in a split are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureScores(IndexMap<String, FeatureScore>);

impl FeatureScores {
    /// Assemble from the native output arrays.
    ///
    /// `shape` is `[n_features]` for scalar scores or
    /// `[n_features, n_groups]` for per-class scores.
    pub(crate) fn from_native(names: Vec<String>, shape: &[u64], scores: Vec<f32>) -> Result<Self> {
        let n = names.len();
        let per_feature = match *shape {
            [len] if len as usize == n => 1,
            [len, groups] if len as usize == n => groups as usize,
            _ => {
                return Err(XgbError::Shape(format!(
                    "feature score shape {shape:?} does not match {n} feature names"
                )))
            }
        };
        let expected = n.checked_mul(per_feature).ok_or_else(|| XgbError::Overflow {
            dims: shape.to_vec(),
        })?;
        if scores.len() != expected {
            return Err(XgbError::Shape(format!(
                "feature score shape {shape:?} needs {expected} values, got {}",
                scores.len()
            )));
        }

        let map = if shape.len() == 1 {
            names
                .into_iter()
                .zip(scores)
                .map(|(name, s)| (name, FeatureScore::Scalar(s)))
                .collect()
        } else if per_feature == 0 {
            names
                .into_iter()
                .map(|name| (name, FeatureScore::PerClass(Vec::new())))
                .collect()
        } else {
            names
                .into_iter()
                .zip(scores.chunks(per_feature))
                .map(|(name, chunk)| (name, FeatureScore::PerClass(chunk.to_vec())))
                .collect()
        };
        Ok(Self(map))
    }

    pub fn get(&self, name: &str) -> Option<&FeatureScore> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureScore)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_inner(self) -> IndexMap<String, FeatureScore> {
        self.0
    }
}

impl IntoIterator for FeatureScores {
    type Item = (String, FeatureScore);
    type IntoIter = indexmap::map::IntoIter<String, FeatureScore>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// =============================================================================
// FeatureMap
// =============================================================================

/// Feature names and types used to label model dumps.
///
/// Serialized in the native feature-map format, one `index<TAB>name<TAB>type`
/// line per feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMap {
    features: Vec<(String, FeatureType)>,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// All features quantitative.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        names
            .iter()
            .map(|n| (n.as_ref().to_string(), FeatureType::Quantitative))
            .collect()
    }

    pub fn push(&mut self, name: impl Into<String>, feature_type: FeatureType) {
        self.features.push((name.into(), feature_type));
    }

    pub fn with(mut self, name: impl Into<String>, feature_type: FeatureType) -> Self {
        self.push(name, feature_type);
        self
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Write the feature-map text.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if a name contains whitespace, which the native
    /// parser uses as the field separator.
    pub fn write_to<W: Write>(&self, mut out: W) -> Result<()> {
        for (i, (name, feature_type)) in self.features.iter().enumerate() {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(XgbError::InvalidArgument(format!(
                    "feature map name {name:?} must be non-empty without whitespace"
                )));
            }
            writeln!(out, "{i}\t{name}\t{feature_type}")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Write to a temporary file that is removed when the guard drops.
    pub(crate) fn to_temp_file(&self) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("xgb-fmap-")
            .suffix(".txt")
            .tempfile()?;
        self.write_to(file.as_file_mut())?;
        Ok(file)
    }
}

impl<S: Into<String>> FromIterator<(S, FeatureType)> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = (S, FeatureType)>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().map(|(n, t)| (n.into(), t)).collect(),
        }
    }
}
