use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MODELS_DIR: &str = "models";
pub const DEFAULT_MODEL_FILE: &str = "pawscan_final.pt";
pub const DEFAULT_LABELS_FILE: &str = "labels.txt";
pub const DEFAULT_INFERENCE_CONFIG: &str = "config/inference.yaml";
pub const DEFAULT_IMAGE_SIZE: u32 = 224;
pub const DEFAULT_MAX_FILE_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Process-level settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub inference_config_path: PathBuf,
    pub host: String,
    pub port: u16,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves settings through `lookup`, falling back to the defaults under the models dir.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let models_dir = PathBuf::from(
            lookup("MODELS_DIR").unwrap_or_else(|| DEFAULT_MODELS_DIR.to_string()),
        );
        let model_path = lookup("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| models_dir.join(DEFAULT_MODEL_FILE));
        let labels_path = lookup("LABELS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| models_dir.join(DEFAULT_LABELS_FILE));
        let inference_config_path = lookup("INFERENCE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INFERENCE_CONFIG));
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a valid port: {}", raw)))?,
            None => 8000,
        };

        Ok(Self {
            model_path,
            labels_path,
            inference_config_path,
            host,
            port,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InferenceConfig {
    pub version: f32,
    pub image: ImageConfig,
    pub model: ModelConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageConfig {
    /// `[height, width]` fed to the classifier.
    pub size: Vec<u32>,
    pub channels: u32,
    pub preprocessing: PreprocessingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub resize_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub device: String,
    pub apply_softmax: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_bytes: usize,
    /// Files accepted per request. Unlimited when unset.
    pub max_files: Option<usize>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            version: 1.0,
            image: ImageConfig::default(),
            model: ModelConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            size: vec![DEFAULT_IMAGE_SIZE, DEFAULT_IMAGE_SIZE],
            channels: 3,
            preprocessing: PreprocessingConfig::default(),
        }
    }
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            resize_method: "catmull_rom".to_string(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            device: "auto".to_string(),
            apply_softmax: false,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_files: None,
        }
    }
}

/// Where the classifier runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
    Auto,
    Cpu,
    Cuda,
}

impl InferenceConfig {
    /// Loads the YAML file at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!(
                "No inference config at {}, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&config_str).map_err(|e| match e {
            ConfigError::Yaml { source, .. } => ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_yaml_str(config_str: &str) -> Result<Self, ConfigError> {
        let config: InferenceConfig =
            serde_yaml::from_str(config_str).map_err(|source| ConfigError::Yaml {
                path: PathBuf::new(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.image.size.as_slice() {
            [h, w] if *h > 0 && *w > 0 => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "image.size must be [height, width] with positive entries, got {:?}",
                    other
                )));
            }
        }
        if self.image.channels != 3 {
            return Err(ConfigError::Invalid(format!(
                "image.channels must be 3, got {}",
                self.image.channels
            )));
        }
        if self.upload.max_file_bytes == 0 {
            return Err(ConfigError::Invalid(
                "upload.max_file_bytes must be positive".to_string(),
            ));
        }
        if self.upload.max_files == Some(0) {
            return Err(ConfigError::Invalid(
                "upload.max_files must be positive when set".to_string(),
            ));
        }
        self.resize_filter()?;
        self.device()?;
        Ok(())
    }

    /// `(height, width)` of the classifier input.
    pub fn target_size(&self) -> (u32, u32) {
        match self.image.size.as_slice() {
            [h, w] => (*h, *w),
            _ => (DEFAULT_IMAGE_SIZE, DEFAULT_IMAGE_SIZE),
        }
    }

    pub fn resize_filter(&self) -> Result<FilterType, ConfigError> {
        match self.image.preprocessing.resize_method.as_str() {
            "nearest" => Ok(FilterType::Nearest),
            "triangle" | "bilinear" => Ok(FilterType::Triangle),
            "catmull_rom" | "bicubic" => Ok(FilterType::CatmullRom),
            "gaussian" => Ok(FilterType::Gaussian),
            "lanczos3" => Ok(FilterType::Lanczos3),
            other => Err(ConfigError::Invalid(format!(
                "unknown image.preprocessing.resize_method: {}",
                other
            ))),
        }
    }

    pub fn device(&self) -> Result<DevicePreference, ConfigError> {
        match self.model.device.as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" => Ok(DevicePreference::Cuda),
            other => Err(ConfigError::Invalid(format!(
                "unknown model.device: {}",
                other
            ))),
        }
    }
}
