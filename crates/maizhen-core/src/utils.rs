//! 通用工具函数

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// 药物条目与标注框共用的唯一标识
///
/// 创建时分配且不再复用。反序列化时无法识别的旧格式ID（如时间戳数字）
/// 会被替换为新ID。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EntryId(Uuid);

impl EntryId {
    /// 生成新的唯一标识
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(raw
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(EntryId)
            .unwrap_or_default())
    }
}

/// 将任意JSON标量转为字符串，null视为空串
pub fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 宽松的字符串反序列化：接受字符串、数字、布尔或null
///
/// OCR服务返回的年龄、电话等字段可能是数字。
pub fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(value_to_string(&raw))
}

/// 按字符截断（不会切断多字节字符）
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// 去除首尾空白后是否为空
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
