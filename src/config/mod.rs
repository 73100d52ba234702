//! Project configuration: root detection, logical path resolution and the
//! YAML documents driving each pipeline stage.
//!
//! A [`Settings`] value is constructed once at process start and passed to
//! every stage; there is no global configuration singleton.

mod schema;

pub use schema::{ColumnSpec, Dtype, Role, SchemaConfig, SemanticType};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable overriding project-root auto-detection
/// (useful for notebooks, tests and CI).
pub const PROJECT_ROOT_ENV: &str = "HMDA_PROJECT_ROOT";

/// Hard configuration failures. Missing keys never fall back to defaults.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("paths.yaml is missing key: '{0}'")]
    MissingPathKey(String),
}

/// Parsed `cleaning.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct CleaningConfig {
    /// Null-like tokens matched case-insensitively during the null-like scan.
    pub null_like: Vec<String>,
    /// Fraction of rows sampled per column for the null-like scan.
    pub sample_frac: f64,
    /// Sentinel strings marking exemption (trimmed, case-folded comparison).
    pub exempt_sentinels: Vec<String>,
    /// Columns that carry the exemption sentinel.
    pub exempt_columns: Vec<String>,
    pub action_taken: ActionTakenCodes,
}

/// action_taken codes defining the modeling population and the target label.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionTakenCodes {
    pub approved: Vec<i64>,
    pub denied: Vec<i64>,
}

/// Parsed `feature_engineering.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureEngineeringConfig {
    /// Slot-column prefix -> label -> raw codes. Codes may repeat across
    /// labels; a row can match several labels at once.
    pub multi_hot: BTreeMap<String, CodeMap>,
    /// Base column -> label -> raw codes for one-hot encoding.
    pub one_hot: BTreeMap<String, CodeMap>,
}

/// Mapping from a semantic label to the raw integer codes it covers.
pub type CodeMap = BTreeMap<String, Vec<i64>>;

/// Parsed `eda.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct EdaConfig {
    pub skew_threshold: f64,
    pub kurtosis_threshold: f64,
    pub outlier_threshold: f64,
}

#[derive(Deserialize)]
struct CleaningDoc {
    cleaning: CleaningConfig,
}

#[derive(Deserialize)]
struct FeatureEngineeringDoc {
    feature_engineering: FeatureEngineeringConfig,
}

#[derive(Deserialize)]
struct EdaDoc {
    eda: EdaConfig,
}

/// All configuration documents, loaded once.
#[derive(Debug, Clone)]
pub struct Settings {
    root: PathBuf,
    paths: BTreeMap<String, PathBuf>,
    pub schema: SchemaConfig,
    pub cleaning: CleaningConfig,
    pub features: FeatureEngineeringConfig,
    pub eda: EdaConfig,
}

impl Settings {
    /// Load all configuration documents from the auto-detected project root.
    pub fn load() -> Result<Self> {
        Self::from_root(find_project_root(None))
    }

    /// Load all configuration documents from an explicit project root.
    pub fn from_root(root: PathBuf) -> Result<Self> {
        let configs = root.join("configs");
        let paths: BTreeMap<String, PathBuf> = load_yaml(&configs.join("paths.yaml"))?;
        let schema: SchemaConfig = load_yaml(&configs.join("schema.yaml"))?;
        let cleaning: CleaningDoc = load_yaml(&configs.join("cleaning.yaml"))?;
        let features: FeatureEngineeringDoc =
            load_yaml(&configs.join("feature_engineering.yaml"))?;
        let eda: EdaDoc = load_yaml(&configs.join("eda.yaml"))?;

        Ok(Self {
            root,
            paths,
            schema,
            cleaning: cleaning.cleaning,
            features: features.feature_engineering,
            eda: eda.eda,
        })
    }

    /// The project root all relative paths resolve against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a logical key from `paths.yaml`.
    /// A missing key is a hard failure, never a default.
    pub fn path(&self, key: &str) -> Result<PathBuf> {
        let rel = self
            .paths
            .get(key)
            .ok_or_else(|| ConfigError::MissingPathKey(key.to_string()))?;
        Ok(self.root.join(rel))
    }
}

/// Locate the project root: the env override if set, otherwise the first
/// ancestor of `start` (or the current directory) containing `.git`,
/// `Cargo.toml` or a `configs` directory. Falls back to `start` itself.
pub fn find_project_root(start: Option<&Path>) -> PathBuf {
    if let Ok(env_root) = std::env::var(PROJECT_ROOT_ENV) {
        return PathBuf::from(env_root);
    }

    let start = start
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let mut candidate = start.as_path();
    loop {
        if candidate.join(".git").exists()
            || candidate.join("Cargo.toml").exists()
            || candidate.join("configs").exists()
        {
            return candidate.to_path_buf();
        }
        match candidate.parent() {
            Some(parent) => candidate = parent,
            None => return start,
        }
    }
}

/// Parse a YAML document into `T`. Malformed documents and missing files
/// surface as hard failures to the caller.
fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config document: {}", path.display()))?;
    serde_yaml::from_str(&contents)
        .with_context(|| format!("Malformed config document: {}", path.display()))
}
