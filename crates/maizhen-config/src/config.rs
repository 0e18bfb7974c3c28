//! 配置管理
//!
//! 分层加载配置（内置默认值 → TOML文件 → 环境变量），并在更新前校验

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};
use anyhow::{Result, Context};
use tracing::{info, error};
use config::{Config, Environment, File};

/// 环境变量前缀，如 `MAIZHEN_API__BASE_URL`
pub const ENV_PREFIX: &str = "MAIZHEN";

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<MaizhenConfig>>,
    /// 配置文件路径
    config_path: Option<PathBuf>,
    /// 配置验证器
    validator: ConfigValidator,
}

/// 脉诊系统完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaizhenConfig {
    /// 后端接口配置
    pub api: ApiConfig,
    /// 本地存储配置
    pub storage: StorageConfig,
    /// 脉象九宫格配置
    pub pulse: PulseConfig,
    /// 处方标注配置
    pub annotator: AnnotatorConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 后端接口配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// 接口根地址
    pub base_url: String,
}

/// 本地存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 会话、偏好与草稿的存放目录
    pub data_dir: PathBuf,
}

/// 脉象九宫格配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseConfig {
    /// 相似病历搜索的防抖时长（毫秒）
    pub debounce_ms: u64,
}

/// 处方标注配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    /// 图片大小上限（字节）
    pub max_image_bytes: usize,
    /// 允许的图片类型
    pub allowed_mime_types: Vec<String>,
    /// 画框提交的最小宽高（百分比）
    pub min_box_size: f64,
    /// 旋转后JPEG重编码质量
    pub rotate_jpeg_quality: u8,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 日志格式：compact / pretty / json
    pub format: String,
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&MaizhenConfig) -> Result<()>,
}

impl ConfigManager {
    /// 创建新的配置管理器，`config_path` 为空时只使用默认值与环境变量
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Self::load_config(config_path)?;
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: config_path.map(Path::to_path_buf),
            validator,
        })
    }

    /// 使用给定配置创建（不读取文件）
    pub fn from_config(config: MaizhenConfig) -> Result<Self> {
        let validator = ConfigValidator::new();
        validator.validate(&config)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: None,
            validator,
        })
    }

    /// 分层加载配置
    fn load_config(config_path: Option<&Path>) -> Result<MaizhenConfig> {
        let defaults = Config::try_from(&MaizhenConfig::default())
            .context("Failed to build default configuration")?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to load configuration sources")?;

        let config: MaizhenConfig = settings.try_deserialize()
            .context("Failed to deserialize configuration")?;

        match config_path {
            Some(path) => info!("Configuration loaded from: {}", path.display()),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    /// 获取配置
    pub async fn get_config(&self) -> MaizhenConfig {
        let config = self.config.read().await;
        config.clone()
    }

    /// 更新配置
    pub async fn update_config(&self, new_config: MaizhenConfig) -> Result<()> {
        // 验证新配置
        self.validator.validate(&new_config)?;

        {
            let mut config = self.config.write().await;
            *config = new_config;
        }

        self.save_config().await?;

        info!("Configuration updated successfully");
        Ok(())
    }

    /// 保存配置到文件（无文件路径时跳过）
    async fn save_config(&self) -> Result<()> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };

        let config = self.config.read().await;
        let config_str = toml::to_string_pretty(&*config)
            .context("Failed to serialize configuration")?;

        tokio::fs::write(path, config_str).await
            .context("Failed to write configuration file")?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// 重新加载配置
    pub async fn reload_config(&self) -> Result<()> {
        let new_config = Self::load_config(self.config_path.as_deref())?;
        self.validator.validate(&new_config)?;
        let mut config = self.config.write().await;
        *config = new_config;
        Ok(())
    }
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "api.base_url",
                validator: |config| {
                    if config.api.base_url.trim().is_empty() {
                        Err(anyhow::anyhow!("API base url cannot be empty"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "pulse.debounce_ms",
                validator: |config| {
                    if config.pulse.debounce_ms == 0 {
                        Err(anyhow::anyhow!("Debounce delay cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "annotator.max_image_bytes",
                validator: |config| {
                    if config.annotator.max_image_bytes == 0 {
                        Err(anyhow::anyhow!("Image size limit cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "annotator.min_box_size",
                validator: |config| {
                    let size = config.annotator.min_box_size;
                    if size > 0.0 && size < 100.0 {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("Minimum box size must be within (0, 100), got {}", size))
                    }
                },
            },
            ValidationRule {
                field_path: "annotator.rotate_jpeg_quality",
                validator: |config| {
                    let quality = config.annotator.rotate_jpeg_quality;
                    if (1..=100).contains(&quality) {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("JPEG quality must be within 1..=100, got {}", quality))
                    }
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &MaizhenConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("Invalid {}: {}", rule.field_path, e));
            }
        }
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/local"),
        }
    }
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self { debounce_ms: 1500 }
    }
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024, // 10MB
            allowed_mime_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
                "image/bmp".to_string(),
            ],
            min_box_size: 1.5,
            rotate_jpeg_quality: 92,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}
