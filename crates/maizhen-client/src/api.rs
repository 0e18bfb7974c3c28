//! 后端服务接口
//!
//! 工作台、九宫格与处方标注只依赖这些trait，便于替换实现

use async_trait::async_trait;
use maizhen_core::{
    AnalysisRequest, AnalysisResult, AnnotationPayload, ImageUpload, PatientInfo, PulseGrid,
    RecognitionResponse, RecordDetail, RecordDraft, Result, SaveReceipt, SimilarRecord,
};

/// 患者与病历服务
#[async_trait]
pub trait RecordApi: Send + Sync {
    /// 查询患者基本信息
    async fn get_patient(&self, patient_id: i64) -> Result<PatientInfo>;

    /// 查询单条病历
    async fn get_record(&self, record_id: i64) -> Result<RecordDetail>;

    /// 保存病历
    async fn save_record(&self, draft: &RecordDraft) -> Result<SaveReceipt>;

    /// 删除病历
    async fn delete_record(&self, record_id: i64) -> Result<()>;

    /// 回写AI分析结果
    async fn update_analysis(&self, record_id: i64, analysis: &AnalysisResult) -> Result<()>;

    /// 按脉象九宫格搜索相似病历
    async fn search_similar(&self, grid: &PulseGrid) -> Result<Vec<SimilarRecord>>;
}

/// AI分析服务
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// 生成分析报告
    async fn generate_report(&self, request: &AnalysisRequest) -> Result<AnalysisResult>;
}

/// 处方识别与标注服务
#[async_trait]
pub trait PrescriptionApi: Send + Sync {
    /// 识别处方图片中的患者信息
    async fn recognize(&self, image: &ImageUpload) -> Result<RecognitionResponse>;

    /// 保存图片与人工标注
    async fn save_annotation(&self, image: &ImageUpload, annotations: &AnnotationPayload) -> Result<()>;
}
