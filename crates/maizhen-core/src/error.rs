//! 错误定义模块

use thiserror::Error;

/// 脉诊系统统一错误类型
#[derive(Error, Debug)]
pub enum MaizhenError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("服务器错误 ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("登录已失效，请重新登录")]
    Unauthorized,

    #[error("请求已取消")]
    Cancelled,

    #[error("图片处理错误: {0}")]
    Image(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },
}

impl MaizhenError {
    /// 被新请求取代的加载，调用方应静默忽略
    pub fn is_silent(&self) -> bool {
        matches!(self, MaizhenError::Cancelled)
    }

    /// 会话已被清除，需要重新登录
    pub fn requires_login(&self) -> bool {
        matches!(self, MaizhenError::Unauthorized)
    }
}

/// 脉诊系统统一结果类型
pub type Result<T> = std::result::Result<T, MaizhenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(MaizhenError::Cancelled.is_silent());
        assert!(!MaizhenError::Cancelled.requires_login());
        assert!(MaizhenError::Unauthorized.requires_login());
        assert!(!MaizhenError::Validation("请输入患者姓名".to_string()).is_silent());
    }

    #[test]
    fn test_server_error_display() {
        let err = MaizhenError::Server {
            status: 403,
            message: "无权删除他人创建的记录".to_string(),
        };
        assert_eq!(err.to_string(), "服务器错误 (403): 无权删除他人创建的记录");
    }
}
