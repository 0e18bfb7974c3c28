//! 病历组装
//!
//! 保存时把主表单与处方标注器的数据合并为一份病历：
//! 1. 标注器有数据时，其非空的姓名、性别、年龄覆盖主表单，诊断覆盖主诉，
//!    心得覆盖备注；空字段不覆盖。
//! 2. 药物取并集：主表单的条目保持原位，标注器中药名未出现过的条目追加在后。
//! 3. 合并后姓名为空则拒绝保存。
//! 4. 由合并后的药物列表生成旧版处方文本。

use maizhen_core::utils::is_blank;
use maizhen_core::{
    AnalysisResult, EntryId, MaizhenError, MedicalRecord, Medicine, PatientInfo,
    PatientInfoDraft, PracticeMode, PulseGrid, RecordDraft, Result,
};
use maizhen_prescription::{medicines_to_text, AnnotationSource};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 主表单的当前内容，也是本地草稿的格式
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordForm {
    #[serde(default)]
    pub patient_info: PatientInfo,
    #[serde(default)]
    pub medical_record: MedicalRecord,
    #[serde(default)]
    pub pulse_grid: PulseGrid,
    #[serde(default)]
    pub ai_analysis: Option<AnalysisResult>,
}

impl RecordForm {
    /// 姓名、主诉、九宫格至少有一项有内容时才值得保存草稿
    pub fn is_worth_saving(&self) -> bool {
        !is_blank(&self.patient_info.name)
            || !is_blank(&self.medical_record.complaint)
            || !self.pulse_grid.is_empty()
    }
}

fn overlay(target: &mut String, value: &str) {
    if !is_blank(value) {
        *target = value.to_string();
    }
}

/// 用标注器的患者信息覆盖主表单（非空字段优先）
pub fn overlay_patient_draft(
    patient_info: &mut PatientInfo,
    medical_record: &mut MedicalRecord,
    draft: &PatientInfoDraft,
) {
    overlay(&mut patient_info.name, &draft.name);
    overlay(&mut patient_info.gender, &draft.gender);
    overlay(&mut patient_info.age, &draft.age);
    overlay(&mut medical_record.complaint, &draft.diagnosis);
    overlay(&mut medical_record.note, &draft.experience);
}

/// 药物并集，主表单顺序不变，只追加主表单中没有的药名
///
/// 填入处方后主表单与标注器共享条目ID；主表单中已有的ID不再追加，
/// 否则改过药名的条目会以同一ID重复出现。
pub fn merge_medicines(main: &[Medicine], supplement: &[Medicine]) -> Vec<Medicine> {
    let names: HashSet<&str> = main.iter().map(|m| m.name.as_str()).collect();
    let ids: HashSet<EntryId> = main.iter().map(|m| m.id).collect();
    let mut merged = main.to_vec();
    merged.extend(
        supplement
            .iter()
            .filter(|m| !names.contains(m.name.as_str()) && !ids.contains(&m.id))
            .cloned(),
    );
    merged
}

/// 组装待保存的病历
///
/// 只读取当前状态，不修改任何东西；校验失败时返回 `Validation`。
pub fn assemble(
    form: &RecordForm,
    annotator: Option<&dyn AnnotationSource>,
    mode: PracticeMode,
    teacher: &str,
) -> Result<RecordDraft> {
    let mut patient_info = form.patient_info.clone();
    let mut medical_record = form.medical_record.clone();

    if let Some(source) = annotator {
        if source.has_data() {
            overlay_patient_draft(&mut patient_info, &mut medical_record, &source.patient_info());
        }
        medical_record.medicines = merge_medicines(&medical_record.medicines, &source.medicines());
    }

    if is_blank(&patient_info.name) {
        return Err(MaizhenError::Validation("请输入患者姓名".to_string()));
    }

    medical_record.prescription = medicines_to_text(&medical_record.medicines);

    Ok(RecordDraft {
        patient_info,
        medical_record,
        pulse_grid: form.pulse_grid.clone(),
        ai_analysis: form.ai_analysis.clone(),
        mode,
        teacher: teacher.to_string(),
    })
}
