//! # 脉诊工作台模块
//!
//! 提供病历录入的会话控制，包括：
//! - 病历组装：合并主表单与处方标注的数据，保存前校验
//! - 工作台：新建、加载、保存、删除病历与AI分析
//! - 加载取消：快速切换患者或病历时丢弃过期的响应
//! - 本地存储：会话凭据、界面偏好与自动保存的草稿

pub mod assembler;
pub mod loads;
pub mod local_store;
pub mod workbench;

// 重新导出主要类型
pub use assembler::{assemble, merge_medicines, overlay_patient_draft, RecordForm};
pub use loads::{LoadFamily, LoadGate, LoadTicket};
pub use local_store::{LocalStore, Preferences, SessionData};
pub use workbench::{PendingSimilarity, Workbench};
