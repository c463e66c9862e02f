//! Versioned model artifact store
//!
//! Layout under the model directory:
//!
//! ```text
//! ACTIVE                          id of the published version
//! versions/<id>/rf_pm25_model.bin bincode ModelBundle
//! versions/<id>/rf_pm25_model.hash hex blake3 of the bundle bytes
//! versions/<id>/metrics.json
//! versions/<id>/metadata.json
//! ```
//!
//! A version directory is assembled in a staging directory and renamed into
//! place; `ACTIVE` is replaced through a synced temp file. A failure at any
//! point leaves the previous `ACTIVE` pointing at an intact version.

use crate::config::TrainingParams;
use crate::errors::{ForecastError, Result};
use crate::pipeline::ModelBundle;
use crate::serialization::{canonical_json_bytes, merge_objects};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

pub const ACTIVE_FILE: &str = "ACTIVE";
pub const VERSIONS_DIR: &str = "versions";
pub const BUNDLE_FILE: &str = "rf_pm25_model.bin";
pub const HASH_FILE: &str = "rf_pm25_model.hash";
pub const METRICS_FILE: &str = "metrics.json";
pub const METADATA_FILE: &str = "metadata.json";

pub const MODEL_FAMILY: &str = "RandomForestRegressor";
pub const MODEL_LIBRARY: &str = "aircast";
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

const VERSION_PREFIX: &str = "rf_pm25_";

/// Held-out and cross-validated scores of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub n_train: usize,
    pub n_test: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_folds: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_mae_mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_rmse_mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_r2_mean: Option<f64>,
}

/// Audit record written next to every bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_type: String,
    pub library: String,
    pub format_version: u32,
    /// Filled in by [`ArtifactStore::publish`].
    #[serde(default)]
    pub model_version: String,
    pub features: Vec<String>,
    pub encoded_features: Vec<String>,
    pub target: String,
    pub params: TrainingParams,
    pub n_rows: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub created_at: String,
}

impl ModelMetadata {
    pub fn for_bundle(bundle: &ModelBundle, params: &TrainingParams, metrics: &TrainingMetrics) -> Self {
        Self {
            model_type: MODEL_FAMILY.to_string(),
            library: MODEL_LIBRARY.to_string(),
            format_version: BUNDLE_FORMAT_VERSION,
            model_version: String::new(),
            features: bundle.feature_columns.clone(),
            encoded_features: bundle.pipeline.preprocessor.output_names(),
            target: bundle.target.clone(),
            params: params.clone(),
            n_rows: metrics.n_train + metrics.n_test,
            n_train: metrics.n_train,
            n_test: metrics.n_test,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Result of a publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedVersion {
    pub id: String,
    pub path: PathBuf,
    /// True when an identical bundle was already stored and only `ACTIVE` moved.
    pub reused: bool,
}

/// The currently active bundle
#[derive(Debug, Clone)]
pub struct LoadedBundle {
    pub version: String,
    pub bundle: ModelBundle,
}

/// Version id derived from the bundle bytes.
pub fn version_id(bundle_bytes: &[u8]) -> String {
    format!("{VERSION_PREFIX}{}", &content_hash(bundle_bytes)[..12])
}

/// Hex blake3 digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

/// Write `bytes` to `path` through a synced temp file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent)?;

    let mut temp = NamedTempFile::new_in(&parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| ForecastError::Io(e.error))?;
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Model directory handle
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version_dir(&self, id: &str) -> PathBuf {
        self.root.join(VERSIONS_DIR).join(id)
    }

    fn active_path(&self) -> PathBuf {
        self.root.join(ACTIVE_FILE)
    }

    /// Id recorded in `ACTIVE`, if any.
    pub fn active_version(&self) -> Result<Option<String>> {
        let path = self.active_path();
        if !path.exists() {
            return Ok(None);
        }
        let id = fs::read_to_string(&path)?.trim().to_string();
        Ok((!id.is_empty()).then_some(id))
    }

    /// Publish a new version and make it active.
    #[instrument(skip(self, bundle, metrics, metadata), fields(root = %self.root.display()))]
    pub fn publish(
        &self,
        bundle: &ModelBundle,
        metrics: &TrainingMetrics,
        metadata: &ModelMetadata,
    ) -> Result<PublishedVersion> {
        let bytes = bincode::serialize(bundle)?;
        let hash = content_hash(&bytes);
        let id = version_id(&bytes);
        let target = self.version_dir(&id);

        let versions = self.root.join(VERSIONS_DIR);
        fs::create_dir_all(&versions)?;

        let reused = self.is_intact(&id, &hash);
        if reused {
            info!("Bundle {} already stored, re-pointing {}", id, ACTIVE_FILE);
        } else {
            if target.is_dir() {
                warn!("Replacing damaged version directory {}", target.display());
                fs::remove_dir_all(&target)?;
            } else if target.exists() {
                return Err(ForecastError::Io(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a version directory", target.display()),
                )));
            }

            let mut metadata = metadata.clone();
            metadata.model_version = id.clone();

            let staging = tempfile::Builder::new()
                .prefix(".staging-")
                .tempdir_in(&self.root)?;
            write_synced(&staging.path().join(BUNDLE_FILE), &bytes)?;
            write_synced(&staging.path().join(HASH_FILE), hash.as_bytes())?;
            write_synced(
                &staging.path().join(METRICS_FILE),
                &canonical_json_bytes(metrics)?,
            )?;
            write_synced(
                &staging.path().join(METADATA_FILE),
                &canonical_json_bytes(&metadata)?,
            )?;

            fs::rename(staging.path(), &target)?;
            debug!("Staged version moved to {}", target.display());
        }

        write_atomic(&self.active_path(), id.as_bytes())?;
        info!("Published model version {} ({} bytes)", id, bytes.len());

        Ok(PublishedVersion {
            id,
            path: target,
            reused,
        })
    }

    /// True when every file of version `id` is present and both the recorded
    /// hash and the bundle bytes on disk match `hash`.
    fn is_intact(&self, id: &str, hash: &str) -> bool {
        let dir = self.version_dir(id);
        if self.stored_hash(id).as_deref() != Some(hash) {
            return false;
        }
        if !dir.join(METRICS_FILE).is_file() || !dir.join(METADATA_FILE).is_file() {
            return false;
        }
        fs::read(dir.join(BUNDLE_FILE)).map_or(false, |bytes| content_hash(&bytes) == hash)
    }

    fn stored_hash(&self, id: &str) -> Option<String> {
        fs::read_to_string(self.version_dir(id).join(HASH_FILE))
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// Load and verify the active bundle.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn load_active(&self) -> Result<LoadedBundle> {
        let version = self.active_version()?.ok_or_else(|| {
            ForecastError::ModelNotTrained(format!(
                "no active model under {}",
                self.root.display()
            ))
        })?;
        let bundle = self.load_version(&version)?;
        Ok(LoadedBundle { version, bundle })
    }

    pub fn load_version(&self, id: &str) -> Result<ModelBundle> {
        let dir = self.version_dir(id);
        let bundle_path = dir.join(BUNDLE_FILE);
        if !bundle_path.exists() {
            return Err(ForecastError::ModelNotTrained(format!(
                "bundle {} is missing",
                bundle_path.display()
            )));
        }

        let bytes = fs::read(&bundle_path)?;
        let expected = self.stored_hash(id).ok_or_else(|| {
            ForecastError::ModelNotTrained(format!("version {id} has no recorded hash"))
        })?;
        let actual = content_hash(&bytes);
        if actual != expected {
            return Err(ForecastError::ModelNotTrained(format!(
                "corrupt artifact: version {id} hash {actual} does not match recorded {expected}"
            )));
        }

        let bundle: ModelBundle = bincode::deserialize(&bytes).map_err(|e| {
            ForecastError::ModelNotTrained(format!("version {id} does not decode: {e}"))
        })?;
        bundle.validate()?;

        debug!(
            "Loaded version {} ({} trees, {} columns)",
            id,
            bundle.pipeline.forest.num_trees(),
            bundle.feature_columns.len()
        );
        Ok(bundle)
    }

    pub fn read_metrics(&self, id: &str) -> Result<Value> {
        let content = fs::read_to_string(self.version_dir(id).join(METRICS_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn read_metadata(&self, id: &str) -> Result<ModelMetadata> {
        let content = fs::read_to_string(self.version_dir(id).join(METADATA_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Merge `extra` into a version's `metrics.json`, keeping existing keys.
    pub fn merge_metrics(&self, id: &str, extra: &Value) -> Result<Value> {
        let dir = self.version_dir(id);
        if !dir.is_dir() {
            return Err(ForecastError::ModelNotTrained(format!(
                "version {id} does not exist"
            )));
        }
        let current = match self.read_metrics(id) {
            Ok(value) => value,
            Err(ForecastError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Value::Object(Default::default())
            }
            Err(e) => return Err(e),
        };
        let merged = merge_objects(current, extra.clone());
        write_atomic(&dir.join(METRICS_FILE), &canonical_json_bytes(&merged)?)?;
        Ok(merged)
    }

    /// Published version ids, sorted.
    pub fn list_versions(&self) -> Result<Vec<String>> {
        let dir = self.root.join(VERSIONS_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(VERSION_PREFIX) {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
