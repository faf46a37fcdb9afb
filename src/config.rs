//! Configuration module for the preprocessing pipeline.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `EC_` and use double underscores
//! to separate nested levels:
//! - `EC_PARALLEL_THREADS=8` sets `parallel_threads`
//! - `EC_NEIGHBORS__MAX_K=50` sets `neighbors.max_k`
//! - `EC_OUTPUT__PRECISION=3` sets `output.precision`
//! - `EC_PROJECTION__UMAP__N_NEIGHBORS=30` sets `projection.umap.n_neighbors`

use crate::error::{PipelineError, PipelineResult};
use crate::neighbors::{DistanceMetric, MultiMetricComputer};
use crate::projection::{ProjectionConfig, ProjectionEngine};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the settings file, searched upward from the working directory.
pub const CONFIG_DIR: &str = ".embcmp";
pub const CONFIG_FILE: &str = "settings.toml";

/// Largest precision for which `10^precision` scaling stays exact in f64.
pub const MAX_PRECISION: u32 = 15;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Worker threads for neighbor search and projections
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    /// Seed for stochastic projections
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub neighbors: NeighborsConfig,

    #[serde(default)]
    pub projection: ProjectionConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub input: InputConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NeighborsConfig {
    /// Neighbors kept per object and metric
    #[serde(default = "default_max_k")]
    pub max_k: usize,

    /// Metrics to compute, in output order
    #[serde(default = "default_metrics")]
    pub metrics: Vec<DistanceMetric>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OutputConfig {
    /// Decimal places kept for every emitted float
    #[serde(default = "default_precision")]
    pub precision: u32,

    /// Include the raw embedding vector in each record
    #[serde(default = "default_true")]
    pub include_embedding: bool,

    /// Pretty-print the JSON output
    #[serde(default = "default_false")]
    pub pretty: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct InputConfig {
    /// Separator between vector components in the embeddings file
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_seed() -> u64 {
    42
}
fn default_max_k() -> usize {
    250
}
fn default_metrics() -> Vec<DistanceMetric> {
    vec![DistanceMetric::Cosine, DistanceMetric::Euclidean]
}
fn default_precision() -> u32 {
    5
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_delimiter() -> String {
    "\t".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            parallel_threads: default_parallel_threads(),
            seed: default_seed(),
            neighbors: NeighborsConfig::default(),
            projection: ProjectionConfig::default(),
            output: OutputConfig::default(),
            input: InputConfig::default(),
        }
    }
}

impl Default for NeighborsConfig {
    fn default() -> Self {
        Self {
            max_k: default_max_k(),
            metrics: default_metrics(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            precision: default_precision(),
            include_embedding: true,
            pretty: false,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .embcmp directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still layering defaults and environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores stay
            .merge(Env::prefixed("EC_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for the .embcmp directory
    /// Searches from current directory up to root
    pub fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Checks the configuration surface before any computation runs.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.parallel_threads == 0 {
            return Err(config_error("parallel_threads must be at least 1"));
        }
        if self.output.precision > MAX_PRECISION {
            return Err(config_error(format!(
                "output.precision must be at most {MAX_PRECISION}, got {}",
                self.output.precision
            )));
        }
        if self.input.delimiter.is_empty() {
            return Err(config_error("input.delimiter must not be empty"));
        }

        let pca = &self.projection.pca;
        if pca.max_iterations == 0 || !positive(pca.tolerance) {
            return Err(config_error(
                "projection.pca needs max_iterations >= 1 and tolerance > 0",
            ));
        }

        let umap = &self.projection.umap;
        if umap.n_neighbors < 2 {
            return Err(config_error("projection.umap.n_neighbors must be at least 2"));
        }
        if !positive(umap.spread) || !non_negative(umap.min_dist) || umap.min_dist > umap.spread {
            return Err(config_error(
                "projection.umap needs spread > 0 and 0 <= min_dist <= spread",
            ));
        }
        if umap.n_epochs == 0 || !positive(umap.learning_rate) {
            return Err(config_error(
                "projection.umap needs n_epochs >= 1 and learning_rate > 0",
            ));
        }

        let tsne = &self.projection.tsne;
        if !positive(tsne.perplexity) || !positive(tsne.learning_rate) {
            return Err(config_error(
                "projection.tsne needs perplexity > 0 and learning_rate > 0",
            ));
        }
        if tsne.n_iterations == 0 || !non_negative(tsne.early_exaggeration - 1.0) {
            return Err(config_error(
                "projection.tsne needs n_iterations >= 1 and early_exaggeration >= 1",
            ));
        }

        // Metric and method lists carry their own input-shape checks
        MultiMetricComputer::new(self.neighbors.metrics.clone(), self.neighbors.max_k)?;
        ProjectionEngine::from_config(&self.projection, self.seed)?;
        Ok(())
    }

    /// Create a default settings file with helpful comments under `root`
    pub fn init_config_file(
        root: impl AsRef<Path>,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# embcmp configuration file

# Version of the configuration schema
version = 1

# Worker threads for neighbor search and projections (defaults to CPU count)
# parallel_threads = {}

# Seed for the stochastic projections (umap, tsne)
seed = 42

[neighbors]
# Neighbors kept per object; must be smaller than the number of embeddings
max_k = 250

# Distance metrics, in output order
# Supported: cosine, euclidean, manhattan, chebyshev
metrics = ["cosine", "euclidean"]

[projection]
# 2D projections to compute, in output order
# Supported: pca, umap, tsne
methods = ["pca"]

[projection.pca]
center = true
scale = false
max_iterations = 300
tolerance = 1e-10

[projection.umap]
n_neighbors = 15
min_dist = 0.1
spread = 1.0
n_epochs = 200
learning_rate = 1.0
negative_sample_rate = 5

[projection.tsne]
# Capped at (N - 1) / 3 for small inputs
perplexity = 30.0
n_iterations = 1000
learning_rate = 200.0
early_exaggeration = 12.0
exaggeration_iterations = 250

[output]
# Decimal places kept for every emitted float (0 to {MAX_PRECISION})
precision = 5

# Include the raw embedding vector in each record
include_embedding = true

# Pretty-print the JSON output
pretty = false

[input]
# Separator between vector components in the embeddings file
delimiter = "\t"
"#,
            num_cpus::get()
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}

/// False for NaN.
fn positive(value: f64) -> bool {
    value > 0.0
}

fn non_negative(value: f64) -> bool {
    value >= 0.0
}

fn config_error(reason: impl Into<String>) -> PipelineError {
    PipelineError::Config {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionMethod;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.seed, 42);
        assert!(settings.parallel_threads > 0);
        assert_eq!(settings.neighbors.max_k, 250);
        assert_eq!(
            settings.neighbors.metrics,
            vec![DistanceMetric::Cosine, DistanceMetric::Euclidean]
        );
        assert_eq!(settings.projection.methods, vec![ProjectionMethod::Pca]);
        assert_eq!(settings.output.precision, 5);
        assert!(settings.output.include_embedding);
        assert_eq!(settings.input.delimiter, "\t");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2
seed = 7

[neighbors]
max_k = 10
metrics = ["euclidean", "manhattan"]

[projection]
methods = ["umap", "pca"]

[projection.umap]
n_neighbors = 30

[output]
precision = 3
include_embedding = false
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.seed, 7);
        assert_eq!(settings.neighbors.max_k, 10);
        assert_eq!(
            settings.neighbors.metrics,
            vec![DistanceMetric::Euclidean, DistanceMetric::Manhattan]
        );
        assert_eq!(
            settings.projection.methods,
            vec![ProjectionMethod::Umap, ProjectionMethod::Pca]
        );
        assert_eq!(settings.projection.umap.n_neighbors, 30);
        // Unspecified umap fields keep their defaults
        assert_eq!(settings.projection.umap.n_epochs, 200);
        assert_eq!(settings.output.precision, 3);
        assert!(!settings.output.include_embedding);
    }

    #[test]
    fn test_rendered_settings_load_back() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.parallel_threads = 2;
        settings.neighbors.metrics = vec![DistanceMetric::Chebyshev];
        settings.projection.tsne.perplexity = 12.5;

        // What `embcmp config` prints is itself a valid settings file
        fs::write(&config_path, toml::to_string_pretty(&settings).unwrap()).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.parallel_threads, 2);
        assert_eq!(loaded.neighbors.metrics, vec![DistanceMetric::Chebyshev]);
        assert_eq!(loaded.projection.tsne.perplexity, 12.5);
        assert_eq!(loaded.output, settings.output);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[output]\nprecision = 2\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.output.precision, 2);

        // Default values should still be present
        assert_eq!(settings.neighbors.max_k, 250);
        assert_eq!(settings.projection.pca, crate::projection::PcaConfig::default());
        assert!(settings.output.include_embedding);
    }

    #[test]
    fn test_init_template_matches_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
        assert_eq!(path, temp_dir.path().join(".embcmp").join("settings.toml"));

        let raw = fs::read_to_string(&path).unwrap();
        let parsed: Settings = toml::from_str(&raw).unwrap();
        assert_eq!(parsed, Settings::default());

        // Refuses to overwrite without force
        assert!(Settings::init_config_file(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.output.precision = 16;
        assert!(matches!(settings.validate(), Err(PipelineError::Config { .. })));

        let mut settings = Settings::default();
        settings.neighbors.max_k = 0;
        assert!(matches!(
            settings.validate(),
            Err(PipelineError::InvalidMaxK { .. })
        ));

        let mut settings = Settings::default();
        settings.neighbors.metrics = vec![DistanceMetric::Cosine, DistanceMetric::Cosine];
        assert!(matches!(
            settings.validate(),
            Err(PipelineError::InvalidInput { .. })
        ));

        let mut settings = Settings::default();
        settings.projection.methods.clear();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.projection.umap.min_dist = 2.0;
        assert!(matches!(settings.validate(), Err(PipelineError::Config { .. })));

        let mut settings = Settings::default();
        settings.parallel_threads = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unknown_metric_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[neighbors]\nmetrics = [\"hamming\"]\n").unwrap();
        assert!(Settings::load_from(&config_path).is_err());
    }

    #[test]
    fn test_layered_config() {
        let temp_dir = TempDir::new().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        // Create config directory
        let config_dir = temp_dir.path().join(".embcmp");
        fs::create_dir_all(&config_dir).unwrap();

        let toml_content = r#"
seed = 9

[neighbors]
max_k = 8

[output]
precision = 4
"#;
        fs::write(config_dir.join("settings.toml"), toml_content).unwrap();

        // Set environment variables that should override config file
        unsafe {
            std::env::set_var("EC_PROJECTION__UMAP__NEGATIVE_SAMPLE_RATE", "7");
            std::env::set_var("EC_PROJECTION__TSNE__EXAGGERATION_ITERATIONS", "100");
        }

        let settings = Settings::load().unwrap();

        // Environment variable should override config file
        assert_eq!(settings.projection.umap.negative_sample_rate, 7);
        // Config file value should be used when no env var
        assert_eq!(settings.neighbors.max_k, 8);
        assert_eq!(settings.output.precision, 4);
        assert_eq!(settings.seed, 9);
        // Env var adds new value not in config
        assert_eq!(settings.projection.tsne.exaggeration_iterations, 100);

        // Clean up
        unsafe {
            std::env::remove_var("EC_PROJECTION__UMAP__NEGATIVE_SAMPLE_RATE");
            std::env::remove_var("EC_PROJECTION__TSNE__EXAGGERATION_ITERATIONS");
        }
        std::env::set_current_dir(original_dir).unwrap();
    }
}
