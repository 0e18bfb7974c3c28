//! 会话凭据
//!
//! 客户端只需要两件事：读取当前令牌，以及在401时清除会话

use std::sync::RwLock;

/// 会话凭据存储
pub trait CredentialStore: Send + Sync {
    /// 当前的访问令牌
    fn token(&self) -> Option<String>;

    /// 清除令牌与身份信息
    fn clear(&self);
}

/// 内存中的凭据，用于命令行和测试
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    token: RwLock<Option<String>>,
}

impl MemoryCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(token.into());
    }
}

impl CredentialStore for MemoryCredentials {
    fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn clear(&self) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }
}
