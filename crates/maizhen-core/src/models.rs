//! 核心数据模型定义

use serde::{Deserialize, Serialize};

use crate::pulse::PulseGrid;
use crate::utils::{lenient_string, EntryId};

/// 单味药物
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    #[serde(default)]
    pub id: EntryId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub dosage: String, // 剂量，约定为数字，单位g
}

impl Medicine {
    pub fn new(name: impl Into<String>, dosage: impl Into<String>) -> Self {
        Self {
            id: EntryId::new(),
            name: name.into(),
            dosage: dosage.into(),
        }
    }

    /// 空白药物条目（编辑中）
    pub fn blank() -> Self {
        Self::new("", "")
    }
}

/// 患者基本信息（主表单）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gender: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub age: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: String,
}

impl PatientInfo {
    /// 默认性别
    pub const DEFAULT_GENDER: &'static str = "男";
}

impl Default for PatientInfo {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            gender: Self::DEFAULT_GENDER.to_string(),
            age: String::new(),
            phone: String::new(),
        }
    }
}

/// 处方识别得到的患者信息草稿
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientInfoDraft {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gender: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub age: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub diagnosis: String, // 诊断/主诉
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub experience: String, // 跟诊心得
}

/// 病历内容
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub complaint: String, // 主诉
    #[serde(default)]
    pub medicines: Vec<Medicine>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub prescription: String, // 旧版处方文本
    #[serde(default, deserialize_with = "lenient_string")]
    pub note: String,
}

/// AI分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisResult {
    /// Markdown 报告
    Report { report: String },
    /// 结构化点评
    Structured {
        #[serde(default)]
        consistency_comment: String,
        #[serde(default)]
        prescription_comment: String,
        #[serde(default)]
        suggestion: String,
    },
}

/// 执业模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PracticeMode {
    /// 个人病历记录
    #[default]
    Personal,
    /// 跟诊模式
    Shadowing,
}

/// 跟诊模式下的标签页
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowingTab {
    /// 病历录入
    #[default]
    Record,
    /// 处方识别
    Prescription,
}

/// 保存时组装的病历
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub patient_info: PatientInfo,
    pub medical_record: MedicalRecord,
    pub pulse_grid: PulseGrid,
    pub ai_analysis: Option<AnalysisResult>,
    pub mode: PracticeMode,
    pub teacher: String,
}

/// 病历访问权限
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPermissions {
    #[serde(default = "default_true")]
    pub can_edit: bool,
    #[serde(default = "default_true")]
    pub can_delete: bool,
    #[serde(default = "default_true")]
    pub is_owner: bool,
    #[serde(default)]
    pub owner_name: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for RecordPermissions {
    fn default() -> Self {
        Self {
            can_edit: true,
            can_delete: true,
            is_owner: true,
            owner_name: None,
        }
    }
}

/// 旧接口把AI分析放在 raw_input 下
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawInput {
    #[serde(default)]
    pub ai_analysis: Option<AnalysisResult>,
}

/// 查询单条病历的响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordDetail {
    #[serde(default)]
    pub patient_info: Option<PatientInfo>,
    #[serde(default)]
    pub medical_record: Option<MedicalRecord>,
    #[serde(default)]
    pub pulse_grid: Option<PulseGrid>,
    #[serde(default)]
    pub ai_analysis: Option<AnalysisResult>,
    #[serde(default)]
    pub raw_input: Option<RawInput>,
    #[serde(default)]
    pub permissions: Option<RecordPermissions>,
}

impl RecordDetail {
    /// AI分析，兼容顶层与 raw_input 两种位置
    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.ai_analysis
            .as_ref()
            .or_else(|| self.raw_input.as_ref().and_then(|r| r.ai_analysis.as_ref()))
    }
}

/// 保存病历的响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveReceipt {
    #[serde(default)]
    pub record_id: Option<i64>,
    #[serde(default)]
    pub patient_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// 相似病历
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarRecord {
    pub record_id: i64,
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub visit_date: String,
    #[serde(default)]
    pub pulse_grid: PulseGrid,
    #[serde(default)]
    pub matches: Vec<String>, // 命中的格子键名
    #[serde(default, deserialize_with = "lenient_string")]
    pub complaint: String,
}

/// AI分析请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub pulse_grid: PulseGrid,
    pub medical_record: MedicalRecord,
    pub patient_info: PatientInfo,
}

/// 上传的图片
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// 处方识别响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResponse {
    #[serde(default)]
    pub patient_info: PatientInfoDraft,
    #[serde(default)]
    pub mock: bool,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// 标注框及其药物，保存标注时的单项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineBoxRecord {
    pub id: EntryId,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub seq: usize, // 从1开始的序号
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dosage: String,
}

/// 保存标注的JSON载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationPayload {
    pub patient_info: PatientInfoDraft,
    pub experience: String,
    pub medicine_boxes: Vec<MedicineBoxRecord>,
}

/// 当前登录身份
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub username: String,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub account_type: Option<String>,
}
