//! # 处方录入模块
//!
//! 提供处方相关的录入能力，包括：
//! - 药物列表与处方文本的互相转换（兼容旧版单行格式）
//! - 药物卡片编辑器：增删改、拖拽排序、Tab 连续录入
//! - 处方图片标注：画框、移动、旋转与识别患者信息

pub mod annotator;
pub mod codec;
pub mod editor;
pub mod geometry;
pub mod raster;

// 重新导出主要类型
pub use annotator::{
    AnnotationSource, BoxMedicine, PatientField, PrescriptionAnnotator, RecognitionRequest,
};
pub use codec::{medicines_to_text, text_to_medicines};
pub use editor::{Focus, MedicineEditor, MedicineField, TabOutcome};
pub use geometry::{AnnotationBox, Point, Rect, SurfaceRect};
pub use raster::{ImageLease, ImageRegistry};
