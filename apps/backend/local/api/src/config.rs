use std::env;
use std::path::PathBuf;

use histofuse::ArtifactPaths;
use histofuse::model_provider::BackboneConfig;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub artifacts: ArtifactPaths,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let artifact_dir =
            env::var("HISTOFUSE_ARTIFACT_DIR").unwrap_or_else(|_| "artifacts".to_string());
        let defaults = ArtifactPaths::in_dir(&artifact_dir);

        let mut backbone =
            BackboneConfig::new(path_var("HISTOFUSE_BACKBONE", defaults.backbone.path)?);
        backbone.resolution = optional_parse("HISTOFUSE_BACKBONE_RESOLUTION")?;
        backbone.embedding_dim = optional_parse("HISTOFUSE_EMBEDDING_DIM")?;

        Ok(Config {
            port: env::var("HISTOFUSE_PORT")
                .or_else(|_| env::var("PORT"))
                .unwrap_or_else(|_| "8501".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("HISTOFUSE_PORT".to_string()))?,
            artifacts: ArtifactPaths {
                labels: path_var("HISTOFUSE_LABELS", defaults.labels)?,
                feature_columns: path_var("HISTOFUSE_FEATURE_COLUMNS", defaults.feature_columns)?,
                head_weights: path_var("HISTOFUSE_HEAD_WEIGHTS", defaults.head_weights)?,
                backbone,
            },
        })
    }
}

fn path_var(name: &str, default: PathBuf) -> Result<PathBuf, ConfigError> {
    match env::var(name) {
        Ok(v) if v.trim().is_empty() => Err(ConfigError::InvalidValue(name.to_string())),
        Ok(v) => Ok(PathBuf::from(v)),
        Err(_) => Ok(default),
    }
}

fn optional_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(None),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(var) => write!(f, "Invalid value for: {}", var),
        }
    }
}

impl std::error::Error for ConfigError {}
