use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orientation::OrientationMode;

pub const DEFAULT_CONFIG_FILE: &str = "fortune_cam.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub reveal: RevealConfig,
    pub service: ServiceConfig,
    pub camera: CameraConfig,
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub jpeg_quality: u8,
    /// Orientation the manual orientation source starts in.
    pub initial_orientation: OrientationSetting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationSetting {
    Portrait,
    Landscape,
    /// No orientation query at all; capture stays landscape.
    Unavailable,
}

impl OrientationSetting {
    pub fn mode(&self) -> Option<OrientationMode> {
        match self {
            OrientationSetting::Portrait => Some(OrientationMode::Portrait),
            OrientationSetting::Landscape => Some(OrientationMode::Landscape),
            OrientationSetting::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealConfig {
    pub cadence_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraKind {
    TestPattern,
    File,
    Libcamera,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub kind: CameraKind,
    pub width: u32,
    pub height: u32,
    /// Time the test pattern reports no frames after opening.
    pub warmup_ms: u64,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub config_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                jpeg_quality: 90,
                initial_orientation: OrientationSetting::Landscape,
            },
            reveal: RevealConfig { cadence_ms: 160 },
            service: ServiceConfig {
                endpoint: "http://127.0.0.1:3000/api/analyze".to_string(),
                timeout_secs: 60,
            },
            camera: CameraConfig {
                kind: CameraKind::TestPattern,
                width: 1280,
                height: 960,
                warmup_ms: 500,
                file: None,
            },
            paths: PathConfig {
                config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            log::info!("Config file not found, creating default configuration");
            let default_config = Self::default();
            default_config.save()?;
            Ok(default_config)
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| "Failed to parse configuration file")?;
        config.validate()?;

        log::info!("Configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to_file(&self.paths.config_file)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
            }
        }

        std::fs::write(path.as_ref(), contents)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        log::info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(anyhow::anyhow!("Invalid JPEG quality: {}", self.capture.jpeg_quality));
        }

        if self.service.endpoint.trim().is_empty() {
            return Err(anyhow::anyhow!("Analysis service endpoint is empty"));
        }

        if self.service.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Invalid service timeout"));
        }

        match self.camera.kind {
            CameraKind::File if self.camera.file.is_none() => {
                return Err(anyhow::anyhow!("Camera kind 'file' needs camera.file"));
            }
            CameraKind::TestPattern | CameraKind::Libcamera
                if self.camera.width == 0 || self.camera.height == 0 =>
            {
                return Err(anyhow::anyhow!(
                    "Invalid camera dimensions: {}x{}",
                    self.camera.width,
                    self.camera.height
                ));
            }
            _ => {}
        }

        Ok(())
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.reveal.cadence_ms)
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service.timeout_secs)
    }

    pub fn camera_warmup(&self) -> Duration {
        Duration::from_millis(self.camera.warmup_ms)
    }
}

// Configuration builder for easier setup
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.capture.jpeg_quality = quality;
        self
    }

    pub fn initial_orientation(mut self, orientation: OrientationSetting) -> Self {
        self.config.capture.initial_orientation = orientation;
        self
    }

    pub fn cadence_ms(mut self, cadence_ms: u64) -> Self {
        self.config.reveal.cadence_ms = cadence_ms;
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.service.endpoint = endpoint.into();
        self
    }

    pub fn camera_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.camera.kind = CameraKind::File;
        self.config.camera.file = Some(path.into());
        self
    }

    pub fn libcamera(mut self, width: u32, height: u32) -> Self {
        self.config.camera.kind = CameraKind::Libcamera;
        self.config.camera.width = width;
        self.config.camera.height = height;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
