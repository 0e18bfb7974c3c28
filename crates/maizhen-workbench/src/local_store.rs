//! 本地持久化状态
//!
//! 在数据目录下以JSON文件保存：
//! - `session.json`：访问令牌与当前身份
//! - `preferences.json`：上次使用的执业模式、标签页与带教老师
//! - `draft.json`：自动保存的病历草稿
//!
//! 文件损坏时按不存在处理并记录警告。

use maizhen_client::CredentialStore;
use maizhen_core::{PracticeMode, Result, ShadowingTab, UserIdentity};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::assembler::RecordForm;

const SESSION_FILE: &str = "session.json";
const PREFERENCES_FILE: &str = "preferences.json";
const DRAFT_FILE: &str = "draft.json";

/// 登录会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: String,
    pub user: UserIdentity,
}

/// 界面偏好
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub practice_mode: PracticeMode,
    #[serde(default)]
    pub shadowing_tab: ShadowingTab,
    #[serde(default)]
    pub teacher: String,
}

/// 本地存储
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// 打开数据目录，不存在时创建
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Option<T> {
        let path = self.dir.join(file);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring corrupt {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value)?;
        std::fs::write(self.dir.join(file), content)?;
        Ok(())
    }

    fn remove(&self, file: &str) -> Result<()> {
        match std::fs::remove_file(self.dir.join(file)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    // ---- 会话 ----

    pub fn load_session(&self) -> Option<SessionData> {
        self.read_json(SESSION_FILE)
    }

    pub fn save_session(&self, session: &SessionData) -> Result<()> {
        self.write_json(SESSION_FILE, session)
    }

    pub fn clear_session(&self) -> Result<()> {
        self.remove(SESSION_FILE)
    }

    // ---- 偏好 ----

    pub fn load_preferences(&self) -> Preferences {
        self.read_json(PREFERENCES_FILE).unwrap_or_default()
    }

    pub fn save_preferences(&self, preferences: &Preferences) -> Result<()> {
        self.write_json(PREFERENCES_FILE, preferences)
    }

    // ---- 草稿 ----

    pub fn load_draft(&self) -> Option<RecordForm> {
        self.read_json(DRAFT_FILE)
    }

    pub fn save_draft(&self, draft: &RecordForm) -> Result<()> {
        self.write_json(DRAFT_FILE, draft)
    }

    pub fn clear_draft(&self) -> Result<()> {
        debug!("Clearing local draft");
        self.remove(DRAFT_FILE)
    }
}

impl CredentialStore for LocalStore {
    fn token(&self) -> Option<String> {
        self.load_session().map(|s| s.access_token)
    }

    fn clear(&self) {
        if let Err(e) = self.clear_session() {
            warn!("Failed to clear session: {}", e);
        }
    }
}
