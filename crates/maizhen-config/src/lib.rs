//! # 脉诊配置模块
//!
//! 提供分层配置加载、配置校验以及日志初始化

pub mod config;
pub mod logging;

pub use config::{
    AnnotatorConfig, ApiConfig, ConfigManager, ConfigValidator, LoggingConfig, MaizhenConfig,
    PulseConfig, StorageConfig,
};
pub use logging::{init_logging, LogFormat};
