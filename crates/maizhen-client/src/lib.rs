//! # 脉诊后端客户端
//!
//! 提供访问后端REST接口的能力，包括：
//! - 带Bearer令牌的认证请求，401时自动清除会话
//! - 病历、患者、相似病历搜索接口
//! - AI分析报告接口
//! - 处方识别与标注保存（multipart上传）

pub mod api;
pub mod client;
pub mod session;

pub use api::{AnalysisApi, PrescriptionApi, RecordApi};
pub use client::{extract_error_message, ApiClient};
pub use session::{CredentialStore, MemoryCredentials};
